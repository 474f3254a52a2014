//! Rich-text document tree stored in a block's `content`
//!
//! The shape mirrors the editor's document model: every node has a `type`,
//! leaves carry `text` and inline `marks`, containers carry nested `content`.
//! Only `plain_text()` is interpreted here; everything else is opaque.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Node types that break a line inside inline content
const HARD_BREAK: &str = "hardBreak";

/// Inline style mark (bold, italic, link, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mark {
    #[serde(rename = "type")]
    pub mark_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<Map<String, Value>>,
}

/// A node of the recursive rich-text document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RichTextNode {
    #[serde(rename = "type")]
    pub node_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<RichTextNode>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marks: Option<Vec<Mark>>,
}

impl RichTextNode {
    /// Empty `doc` root
    pub fn doc(content: Vec<RichTextNode>) -> Self {
        Self {
            node_type: "doc".to_string(),
            attrs: None,
            content: Some(content),
            text: None,
            marks: None,
        }
    }

    /// `paragraph` container holding the given inline nodes
    pub fn paragraph(content: Vec<RichTextNode>) -> Self {
        Self {
            node_type: "paragraph".to_string(),
            attrs: None,
            content: Some(content),
            text: None,
            marks: None,
        }
    }

    /// Unstyled text leaf
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            node_type: "text".to_string(),
            attrs: None,
            content: None,
            text: Some(text.into()),
            marks: None,
        }
    }

    /// Convenience: `doc > paragraph > text`
    pub fn from_plain(text: impl Into<String>) -> Self {
        Self::doc(vec![Self::paragraph(vec![Self::text(text)])])
    }

    /// Attach inline marks to this node
    pub fn with_marks(mut self, marks: Vec<Mark>) -> Self {
        self.marks = Some(marks);
        self
    }

    fn is_inline(&self) -> bool {
        self.text.is_some() || self.node_type == HARD_BREAK
    }

    /// Flattened text used for indexing
    ///
    /// Text leaves are concatenated depth-first, hard breaks become newlines and
    /// sibling block-level children are separated by a newline.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        self.write_plain_text(&mut out);
        out
    }

    fn write_plain_text(&self, out: &mut String) {
        if let Some(text) = &self.text {
            out.push_str(text);
            return;
        }
        if self.node_type == HARD_BREAK {
            out.push('\n');
            return;
        }

        let Some(children) = &self.content else {
            return;
        };

        let mut previous_was_block = false;
        for child in children {
            let is_block = !child.is_inline();
            if is_block && previous_was_block {
                out.push('\n');
            }
            child.write_plain_text(out);
            previous_was_block = is_block;
        }
    }
}

impl Default for RichTextNode {
    fn default() -> Self {
        Self::doc(Vec::new())
    }
}
