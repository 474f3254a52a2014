//! Block Data Structures
//!
//! A `Block` is a single content node in a page's tree. Blocks reference their
//! page and (optionally) a parent block; siblings are ordered by `position`,
//! a fractional-index key compared byte-wise.
//!
//! # Examples
//!
//! ```rust
//! use pagespace_core::models::{Block, BlockType, RichTextNode};
//!
//! let block = Block::new(
//!     BlockType::Paragraph,
//!     "page-1".to_string(),
//!     None,
//!     "a0".to_string(),
//!     RichTextNode::from_plain("Hello"),
//!     "user-1".to_string(),
//! );
//! assert_eq!(block.plain_text, "Hello");
//! assert_eq!(block.version, 1);
//! ```

use crate::models::RichTextNode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

fn default_version() -> i64 {
    1
}

/// Closed set of block content kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockType {
    Paragraph,
    Heading1,
    Heading2,
    Heading3,
    BulletedList,
    NumberedList,
    Todo,
    Toggle,
    Quote,
    Callout,
    Code,
    Divider,
    Table,
    Database,
    Image,
    File,
    Video,
    Embed,
    Equation,
    Bookmark,
}

impl BlockType {
    /// Wire name of this block type
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockType::Paragraph => "paragraph",
            BlockType::Heading1 => "heading1",
            BlockType::Heading2 => "heading2",
            BlockType::Heading3 => "heading3",
            BlockType::BulletedList => "bulleted-list",
            BlockType::NumberedList => "numbered-list",
            BlockType::Todo => "todo",
            BlockType::Toggle => "toggle",
            BlockType::Quote => "quote",
            BlockType::Callout => "callout",
            BlockType::Code => "code",
            BlockType::Divider => "divider",
            BlockType::Table => "table",
            BlockType::Database => "database",
            BlockType::Image => "image",
            BlockType::File => "file",
            BlockType::Video => "video",
            BlockType::Embed => "embed",
            BlockType::Equation => "equation",
            BlockType::Bookmark => "bookmark",
        }
    }

    /// Media blocks keep their payload in `properties.url`
    pub fn is_media(&self) -> bool {
        matches!(
            self,
            BlockType::Image | BlockType::File | BlockType::Video | BlockType::Embed
        )
    }
}

/// Kind-specific block attributes
///
/// Known attributes are typed; anything else lands in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockProperties {
    /// Todo checked state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,

    /// Toggle collapse state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collapsed: Option<bool>,

    /// Code block language
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Media / embed / bookmark URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    /// Callout icon
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BlockProperties {
    /// Merge `updates` into this bag; set fields in `updates` win
    pub fn merge(&mut self, updates: BlockProperties) {
        if updates.checked.is_some() {
            self.checked = updates.checked;
        }
        if updates.collapsed.is_some() {
            self.collapsed = updates.collapsed;
        }
        if updates.language.is_some() {
            self.language = updates.language;
        }
        if updates.url.is_some() {
            self.url = updates.url;
        }
        if updates.caption.is_some() {
            self.caption = updates.caption;
        }
        if updates.color.is_some() {
            self.color = updates.color;
        }
        if updates.icon.is_some() {
            self.icon = updates.icon;
        }
        self.extra.extend(updates.extra);
    }
}

/// A content node in a page's block tree.
///
/// # Fields
///
/// - `id`: client-generated identifier
/// - `parent_id`: owning block, `None` for page-root blocks
/// - `position`: fractional-index key; siblings sort by byte comparison
/// - `version`: incremented on every content or property write
/// - `plain_text`: derived from `content` on every content write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub id: String,

    #[serde(rename = "type")]
    pub block_type: BlockType,

    pub content: RichTextNode,

    #[serde(default)]
    pub plain_text: String,

    #[serde(default)]
    pub parent_id: Option<String>,

    pub page_id: String,

    pub position: String,

    #[serde(default = "default_version")]
    pub version: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_by: String,

    #[serde(default)]
    pub properties: BlockProperties,
}

impl Block {
    /// Create a new block with a random id and `version = 1`
    pub fn new(
        block_type: BlockType,
        page_id: String,
        parent_id: Option<String>,
        position: String,
        content: RichTextNode,
        user_id: String,
    ) -> Self {
        Self::new_with_id(
            Uuid::new_v4().to_string(),
            block_type,
            page_id,
            parent_id,
            position,
            content,
            user_id,
        )
    }

    /// Create a new block with a caller-provided id
    pub fn new_with_id(
        id: String,
        block_type: BlockType,
        page_id: String,
        parent_id: Option<String>,
        position: String,
        content: RichTextNode,
        user_id: String,
    ) -> Self {
        let now = Utc::now();
        let plain_text = content.plain_text();
        Self {
            id,
            block_type,
            content,
            plain_text,
            parent_id,
            page_id,
            position,
            version: 1,
            created_at: now,
            updated_at: now,
            created_by: user_id.clone(),
            updated_by: user_id,
            properties: BlockProperties::default(),
        }
    }

    /// Builder-style properties setter
    pub fn with_properties(mut self, properties: BlockProperties) -> Self {
        self.properties = properties;
        self
    }

    /// Replace content and recompute `plain_text`
    pub fn set_content(&mut self, content: RichTextNode) {
        self.plain_text = content.plain_text();
        self.content = content;
    }

    /// Whether this block sits directly under the page
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Parameters for creating a block
///
/// When `position` is `None` the block is appended after the current last
/// sibling of `(page_id, parent_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBlockParams {
    /// Client-provided id; generated when absent
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub block_type: BlockType,
    pub page_id: String,
    pub user_id: String,
    pub content: RichTextNode,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub properties: BlockProperties,
}

impl CreateBlockParams {
    /// Parameters for a root-level block appended at the end of the page
    pub fn new(
        block_type: BlockType,
        page_id: impl Into<String>,
        user_id: impl Into<String>,
        content: RichTextNode,
    ) -> Self {
        Self {
            id: None,
            block_type,
            page_id: page_id.into(),
            user_id: user_id.into(),
            content,
            parent_id: None,
            position: None,
            properties: BlockProperties::default(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_position(mut self, position: impl Into<String>) -> Self {
        self.position = Some(position.into());
        self
    }

    pub fn with_properties(mut self, properties: BlockProperties) -> Self {
        self.properties = properties;
        self
    }
}

/// Partial block update
///
/// Only provided fields change. `properties` is merged key-by-key.
/// `expected_version`, when set, makes the write fail if the stored block has
/// moved on since the caller read it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockUpdate {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub block_type: Option<BlockType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<RichTextNode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BlockProperties>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<i64>,
}

impl BlockUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content(mut self, content: RichTextNode) -> Self {
        self.content = Some(content);
        self
    }

    pub fn with_properties(mut self, properties: BlockProperties) -> Self {
        self.properties = Some(properties);
        self
    }

    pub fn with_block_type(mut self, block_type: BlockType) -> Self {
        self.block_type = Some(block_type);
        self
    }

    pub fn with_expected_version(mut self, version: i64) -> Self {
        self.expected_version = Some(version);
        self
    }

    /// Check if update contains any changes
    pub fn is_empty(&self) -> bool {
        self.block_type.is_none() && self.content.is_none() && self.properties.is_none()
    }

    /// Apply this update to `block`, bumping provenance and version
    pub fn apply(self, block: &mut Block, user_id: &str) {
        if let Some(block_type) = self.block_type {
            block.block_type = block_type;
        }
        if let Some(content) = self.content {
            block.set_content(content);
        }
        if let Some(properties) = self.properties {
            block.properties.merge(properties);
        }
        block.version += 1;
        block.updated_at = Utc::now();
        block.updated_by = user_id.to_string();
    }
}

/// Result of a delete operation
///
/// Deleting a missing block succeeds with `existed = false`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    /// Whether the target block existed before deletion
    pub existed: bool,

    /// Number of block records removed, target included
    pub deleted_count: usize,
}

impl DeleteResult {
    pub fn deleted(count: usize) -> Self {
        Self {
            existed: true,
            deleted_count: count,
        }
    }

    pub fn not_found() -> Self {
        Self {
            existed: false,
            deleted_count: 0,
        }
    }
}
