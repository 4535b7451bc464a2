//! Plain-text flattening of documents for previews and search.
//!
//! Extraction is lossy and only ever used for display and matching. Only
//! top-level paragraphs contribute text; headings, lists, tables and the like
//! are skipped to keep previews cheap.
use serde_json::Value;

use crate::{Document, Node, NodeKind};

/// Returned when a document has no block sequence at all.
pub const NO_CONTENT_MISSING: &str = "No content...";

/// Returned when a document has blocks but no paragraph text.
pub const NO_CONTENT: &str = "No content";

/// Default preview length, in characters.
pub const DEFAULT_PREVIEW_LENGTH: usize = 150;

const ELLIPSIS: &str = "...";

/// Flattens the paragraph text of `document` into a single line.
pub fn extract_text(document: &Document) -> String {
    let blocks = match document.blocks() {
        Some(blocks) if !blocks.is_empty() => blocks,
        _ => return NO_CONTENT_MISSING.to_string(),
    };

    if let [only] = blocks {
        if is_paragraph(only) && paragraph_children(only).is_empty() {
            return String::new();
        }
    }

    let text = blocks
        .iter()
        .filter(|block| is_paragraph(block))
        .map(paragraph_text)
        .collect::<Vec<_>>()
        .join(" ");

    if text.trim().is_empty() {
        NO_CONTENT.to_string()
    } else {
        text
    }
}

fn is_paragraph(node: &Node) -> bool {
    node.type_name() == Some(NodeKind::Paragraph.as_str())
}

/// Children of a paragraph, whether it decoded cleanly or was kept opaque.
fn paragraph_children(paragraph: &Node) -> Vec<Node> {
    match paragraph {
        Node::Opaque(value) => value
            .get("content")
            .and_then(Value::as_array)
            .map(|children| children.iter().cloned().map(Node::from_value).collect())
            .unwrap_or_default(),
        _ => paragraph.children().to_vec(),
    }
}

fn paragraph_text(paragraph: &Node) -> String {
    paragraph_children(paragraph)
        .iter()
        .filter_map(Node::as_text)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Anything a preview can be built from.
#[derive(Debug, Clone)]
pub enum PreviewSource {
    Text(String),
    Blocks(Vec<Node>),
    Document(Document),
}

impl PreviewSource {
    /// Normalizes an arbitrary JSON shape: strings are text, arrays are bare
    /// block sequences, objects are documents, anything else is empty.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(text) => PreviewSource::Text(text),
            Value::Array(items) => {
                PreviewSource::Blocks(items.into_iter().map(Node::from_value).collect())
            }
            Value::Object(_) => PreviewSource::Document(Document::from_value(value)),
            _ => PreviewSource::Text(String::new()),
        }
    }

    fn into_text(self) -> String {
        match self {
            PreviewSource::Text(text) => text,
            PreviewSource::Blocks(blocks) => extract_text(&Document::from_blocks(blocks)),
            PreviewSource::Document(document) if document.blocks().is_some() => {
                extract_text(&document)
            }
            PreviewSource::Document(_) => String::new(),
        }
    }
}

impl From<&str> for PreviewSource {
    fn from(text: &str) -> Self {
        PreviewSource::Text(text.to_string())
    }
}

impl From<String> for PreviewSource {
    fn from(text: String) -> Self {
        PreviewSource::Text(text)
    }
}

impl From<Vec<Node>> for PreviewSource {
    fn from(blocks: Vec<Node>) -> Self {
        PreviewSource::Blocks(blocks)
    }
}

impl From<&Document> for PreviewSource {
    fn from(document: &Document) -> Self {
        PreviewSource::Document(document.clone())
    }
}

impl From<Value> for PreviewSource {
    fn from(value: Value) -> Self {
        PreviewSource::from_value(value)
    }
}

/// Builds a preview of at most `max_len` characters plus an ellipsis.
pub fn truncate_preview(source: impl Into<PreviewSource>, max_len: usize) -> String {
    let text = source.into().into_text();

    if text.trim().is_empty() {
        return NO_CONTENT.to_string();
    }

    match text.char_indices().nth(max_len) {
        None => text,
        Some((cut, _)) => format!("{}{}", &text[..cut], ELLIPSIS),
    }
}
