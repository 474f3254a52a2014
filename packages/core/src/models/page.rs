//! Page records as seen by the block storage core
//!
//! Page CRUD and sharing live outside this crate. The core only needs enough
//! of a page to apply queued page updates and to mirror pages locally.

use crate::models::Block;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: String,
    pub workspace_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default)]
    pub parent_page_id: Option<String>,
    #[serde(default)]
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_by: String,
}

impl Page {
    pub fn new(
        id: impl Into<String>,
        workspace_id: impl Into<String>,
        title: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        let user_id = user_id.into();
        Self {
            id: id.into(),
            workspace_id: workspace_id.into(),
            title: title.into(),
            icon: None,
            cover: None,
            parent_page_id: None,
            is_archived: false,
            created_at: now,
            updated_at: now,
            created_by: user_id.clone(),
            updated_by: user_id,
        }
    }
}

/// Partial page update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_archived: Option<bool>,
}

impl PageUpdate {
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.icon.is_none()
            && self.cover.is_none()
            && self.is_archived.is_none()
    }
}

/// Local mirror of a page and its position-ordered blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedPage {
    pub page: Page,
    #[serde(default)]
    pub blocks: Vec<Block>,
    pub cached_at: DateTime<Utc>,
}

impl CachedPage {
    pub fn new(page: Page, blocks: Vec<Block>) -> Self {
        Self {
            page,
            blocks,
            cached_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.page.id
    }

    pub fn workspace_id(&self) -> &str {
        &self.page.workspace_id
    }
}
