//! Rich-text document model.
//!
//! A note's body is a tree rooted at a `"doc"` node. Known node kinds are
//! decoded into [`ElementNode`] and [`TextNode`]; anything else (an unknown
//! kind, or a known kind whose shape is off) is kept as [`Node::Opaque`] and
//! written back exactly as it was read. Decoding never fails: a newer editor
//! can add block kinds without older builds dropping them.
use std::collections::BTreeSet;

use serde::{ser::SerializeMap, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Type tag of the document root.
pub const DOC_TYPE: &str = "doc";

/// Type tag of text leaves.
pub const TEXT_TYPE: &str = "text";

/// Registry of element kinds the application understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    Paragraph,
    Heading,
    Blockquote,
    BulletList,
    OrderedList,
    ListItem,
    TaskList,
    TaskItem,
    Table,
    TableRow,
    TableCell,
    TableHeader,
    CodeBlock,
    HorizontalRule,
    HardBreak,
    Image,
    MathBlock,
    MermaidBlock,
    NoteLabel,
    BlackCallout,
    BlueCallout,
    GreenCallout,
    PurpleCallout,
    RedCallout,
    YellowCallout,
}

impl NodeKind {
    pub const ALL: [NodeKind; 25] = [
        NodeKind::Paragraph,
        NodeKind::Heading,
        NodeKind::Blockquote,
        NodeKind::BulletList,
        NodeKind::OrderedList,
        NodeKind::ListItem,
        NodeKind::TaskList,
        NodeKind::TaskItem,
        NodeKind::Table,
        NodeKind::TableRow,
        NodeKind::TableCell,
        NodeKind::TableHeader,
        NodeKind::CodeBlock,
        NodeKind::HorizontalRule,
        NodeKind::HardBreak,
        NodeKind::Image,
        NodeKind::MathBlock,
        NodeKind::MermaidBlock,
        NodeKind::NoteLabel,
        NodeKind::BlackCallout,
        NodeKind::BlueCallout,
        NodeKind::GreenCallout,
        NodeKind::PurpleCallout,
        NodeKind::RedCallout,
        NodeKind::YellowCallout,
    ];

    /// The editor's type tag for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Paragraph => "paragraph",
            NodeKind::Heading => "heading",
            NodeKind::Blockquote => "blockquote",
            NodeKind::BulletList => "bulletList",
            NodeKind::OrderedList => "orderedList",
            NodeKind::ListItem => "listItem",
            NodeKind::TaskList => "taskList",
            NodeKind::TaskItem => "taskItem",
            NodeKind::Table => "table",
            NodeKind::TableRow => "tableRow",
            NodeKind::TableCell => "tableCell",
            NodeKind::TableHeader => "tableHeader",
            NodeKind::CodeBlock => "codeBlock",
            NodeKind::HorizontalRule => "horizontalRule",
            NodeKind::HardBreak => "hardBreak",
            NodeKind::Image => "image",
            NodeKind::MathBlock => "mathBlock",
            NodeKind::MermaidBlock => "mermaidBlock",
            NodeKind::NoteLabel => "noteLabel",
            NodeKind::BlackCallout => "blackCallout",
            NodeKind::BlueCallout => "blueCallout",
            NodeKind::GreenCallout => "greenCallout",
            NodeKind::PurpleCallout => "purpleCallout",
            NodeKind::RedCallout => "redCallout",
            NodeKind::YellowCallout => "yellowCallout",
        }
    }

    pub fn from_name(name: &str) -> Option<NodeKind> {
        NodeKind::ALL.iter().copied().find(|kind| kind.as_str() == name)
    }

    pub fn is_callout(&self) -> bool {
        matches!(
            self,
            NodeKind::BlackCallout
                | NodeKind::BlueCallout
                | NodeKind::GreenCallout
                | NodeKind::PurpleCallout
                | NodeKind::RedCallout
                | NodeKind::YellowCallout
        )
    }
}

/// Formatting annotation on a text leaf (bold, link, highlight, ...).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mark {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attrs: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Mark {
    pub fn new(kind: impl Into<String>) -> Self {
        Mark {
            kind: kind.into(),
            attrs: None,
            extra: Map::new(),
        }
    }

    pub fn link(href: impl Into<String>) -> Self {
        let mut attrs = Map::new();
        attrs.insert("href".to_string(), Value::String(href.into()));
        Mark {
            kind: "link".to_string(),
            attrs: Some(attrs),
            extra: Map::new(),
        }
    }

    fn from_value(value: &Value) -> Option<Mark> {
        let mut map = value.as_object()?.clone();
        let kind = match map.remove("type") {
            Some(Value::String(kind)) => kind,
            _ => return None,
        };
        let attrs = take_object(&mut map, "attrs")?;
        Some(Mark {
            kind,
            attrs,
            extra: map,
        })
    }
}

/// A known, non-text node: block containers and inline atoms alike.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementNode {
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attrs: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<Node>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marks: Option<Vec<Mark>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ElementNode {
    pub fn new(kind: NodeKind) -> Self {
        ElementNode {
            kind,
            attrs: None,
            content: None,
            marks: None,
            extra: Map::new(),
        }
    }

    pub fn with_content(mut self, content: Vec<Node>) -> Self {
        self.content = Some(content);
        self
    }

    pub fn with_attr(mut self, key: &str, value: Value) -> Self {
        self.attrs
            .get_or_insert_with(Map::new)
            .insert(key.to_string(), value);
        self
    }

    /// True when the node has no children at all.
    pub fn is_empty(&self) -> bool {
        self.content.as_ref().map_or(true, |children| children.is_empty())
    }

    fn from_map(kind: NodeKind, mut map: Map<String, Value>) -> Option<ElementNode> {
        let attrs = take_object(&mut map, "attrs")?;
        let content = match map.remove("content") {
            None => None,
            Some(Value::Array(items)) => Some(items.into_iter().map(Node::from_value).collect()),
            Some(_) => return None,
        };
        let marks = take_marks(&mut map)?;
        Some(ElementNode {
            kind,
            attrs,
            content,
            marks,
            extra: map,
        })
    }
}

/// A text leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct TextNode {
    pub text: String,
    pub marks: Option<Vec<Mark>>,
    pub extra: Map<String, Value>,
}

impl TextNode {
    pub fn new(text: impl Into<String>) -> Self {
        TextNode {
            text: text.into(),
            marks: None,
            extra: Map::new(),
        }
    }

    pub fn with_mark(mut self, mark: Mark) -> Self {
        self.marks.get_or_insert_with(Vec::new).push(mark);
        self
    }

    fn from_map(mut map: Map<String, Value>) -> Option<TextNode> {
        let text = match map.remove("text") {
            Some(Value::String(text)) => text,
            _ => return None,
        };
        let marks = take_marks(&mut map)?;
        Some(TextNode {
            text,
            marks,
            extra: map,
        })
    }
}

impl Serialize for TextNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("type", TEXT_TYPE)?;
        map.serialize_entry("text", &self.text)?;
        if let Some(marks) = &self.marks {
            map.serialize_entry("marks", marks)?;
        }
        for (key, value) in &self.extra {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// One node of the document tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Node {
    Element(ElementNode),
    Text(TextNode),
    /// Unrecognized or malformed node, kept verbatim.
    Opaque(Value),
}

impl Node {
    pub fn text(text: impl Into<String>) -> Node {
        Node::Text(TextNode::new(text))
    }

    /// A paragraph holding a single text leaf, or no children for empty text.
    pub fn paragraph(text: &str) -> Node {
        let element = ElementNode::new(NodeKind::Paragraph);
        if text.is_empty() {
            Node::Element(element)
        } else {
            Node::Element(element.with_content(vec![Node::text(text)]))
        }
    }

    /// Decodes a JSON value, falling back to [`Node::Opaque`].
    pub fn from_value(value: Value) -> Node {
        let decoded = match &value {
            Value::Object(map) => match map.get("type").and_then(Value::as_str) {
                Some(TEXT_TYPE) => TextNode::from_map(map.clone()).map(Node::Text),
                Some(name) => NodeKind::from_name(name).and_then(|kind| {
                    let mut fields = map.clone();
                    fields.remove("type");
                    ElementNode::from_map(kind, fields).map(Node::Element)
                }),
                None => None,
            },
            _ => None,
        };
        decoded.unwrap_or(Node::Opaque(value))
    }

    /// The node's type tag, when it has one.
    pub fn type_name(&self) -> Option<&str> {
        match self {
            Node::Element(element) => Some(element.kind.as_str()),
            Node::Text(_) => Some(TEXT_TYPE),
            Node::Opaque(value) => value.get("type").and_then(Value::as_str),
        }
    }

    pub fn kind(&self) -> Option<NodeKind> {
        match self {
            Node::Element(element) => Some(element.kind),
            _ => None,
        }
    }

    /// Text of a `"text"` leaf, including leaves kept opaque because of odd
    /// marks or extra fields.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Node::Text(text) => Some(&text.text),
            Node::Opaque(value) if self.type_name() == Some(TEXT_TYPE) => {
                value.get("text").and_then(Value::as_str)
            }
            _ => None,
        }
    }

    pub fn children(&self) -> &[Node] {
        match self {
            Node::Element(ElementNode {
                content: Some(children),
                ..
            }) => children,
            _ => &[],
        }
    }

    fn collect_unknown(&self, found: &mut BTreeSet<String>) {
        match self {
            Node::Opaque(value) => {
                let name = value
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("<untyped>");
                found.insert(name.to_string());
            }
            Node::Element(element) => {
                for child in element.content.iter().flatten() {
                    child.collect_unknown(found);
                }
            }
            Node::Text(_) => {}
        }
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Node::from_value)
    }
}

/// The rich-text body of a note.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Root type tag when it is a string (`"doc"` for well-formed documents).
    kind: Option<String>,
    /// Top-level blocks, when `content` is a sequence.
    pub content: Option<Vec<Node>>,
    /// Any other root keys, including a non-sequence `content`.
    extra: Map<String, Value>,
    /// Roots that are not JSON objects at all.
    verbatim: Option<Value>,
}

impl Default for Document {
    fn default() -> Self {
        Document::empty()
    }
}

impl Document {
    /// `{ "type": "doc", "content": [] }`
    pub fn empty() -> Self {
        Document::from_blocks(Vec::new())
    }

    pub fn from_blocks(blocks: Vec<Node>) -> Self {
        Document {
            kind: Some(DOC_TYPE.to_string()),
            content: Some(blocks),
            extra: Map::new(),
            verbatim: None,
        }
    }

    /// One paragraph per line of `text`.
    pub fn from_plain_text(text: &str) -> Self {
        if text.is_empty() {
            return Document::empty();
        }
        Document::from_blocks(text.lines().map(Node::paragraph).collect())
    }

    /// Decodes any JSON value into a document without failing.
    pub fn from_value(value: Value) -> Self {
        let mut map = match value {
            Value::Object(map) => map,
            other => {
                return Document {
                    kind: None,
                    content: None,
                    extra: Map::new(),
                    verbatim: Some(other),
                }
            }
        };

        let kind = match map.remove("type") {
            Some(Value::String(kind)) => Some(kind),
            Some(other) => {
                map.insert("type".to_string(), other);
                None
            }
            None => None,
        };

        let content = match map.remove("content") {
            Some(Value::Array(items)) => Some(items.into_iter().map(Node::from_value).collect()),
            Some(other) => {
                map.insert("content".to_string(), other);
                None
            }
            None => None,
        };

        Document {
            kind,
            content,
            extra: map,
            verbatim: None,
        }
    }

    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    /// Top-level blocks, or `None` when the root carries no block sequence.
    pub fn blocks(&self) -> Option<&[Node]> {
        self.content.as_deref()
    }

    pub fn push_block(&mut self, block: Node) {
        self.content.get_or_insert_with(Vec::new).push(block);
    }

    /// Root is `"doc"` and every descendant has a registered type.
    ///
    /// Advisory only: invalid documents are still stored and exported.
    pub fn is_valid(&self) -> bool {
        self.verbatim.is_none()
            && self.kind.as_deref() == Some(DOC_TYPE)
            && self.unknown_node_types().is_empty()
    }

    /// Distinct type tags of nodes kept opaquely.
    pub fn unknown_node_types(&self) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        for node in self.content.iter().flatten() {
            node.collect_unknown(&mut found);
        }
        found
    }
}

/// Free-function form of [`Document::is_valid`].
pub fn is_valid_document(document: &Document) -> bool {
    document.is_valid()
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if let Some(value) = &self.verbatim {
            return value.serialize(serializer);
        }
        let mut map = serializer.serialize_map(None)?;
        if let Some(kind) = &self.kind {
            map.serialize_entry("type", kind)?;
        }
        if let Some(content) = &self.content {
            map.serialize_entry("content", content)?;
        }
        for (key, value) in &self.extra {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Document::from_value)
    }
}

// `None` means the key held something other than an object.
fn take_object(
    map: &mut Map<String, Value>,
    key: &str,
) -> Option<Option<Map<String, Value>>> {
    match map.remove(key) {
        None => Some(None),
        Some(Value::Object(inner)) => Some(Some(inner)),
        Some(other) => {
            map.insert(key.to_string(), other);
            None
        }
    }
}

fn take_marks(map: &mut Map<String, Value>) -> Option<Option<Vec<Mark>>> {
    match map.remove("marks") {
        None => Some(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(Mark::from_value)
            .collect::<Option<Vec<_>>>()
            .map(Some),
        Some(_) => None,
    }
}
