//! Record layout: an ordered tree of fields and groups.

use crate::schema::node::DataNode;
use crate::schema::SchemaError;
use crate::types::PixelFormat;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// What a composite group represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GroupKind {
    #[default]
    Record,
    Image { format: PixelFormat },
}

/// Named composite of schema nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    #[serde(default)]
    pub kind: GroupKind,
    pub children: Vec<SchemaNode>,
}

impl Group {
    pub fn new(name: impl Into<String>, kind: GroupKind) -> Self {
        Self {
            name: name.into(),
            kind,
            children: Vec::new(),
        }
    }

    pub fn with(mut self, child: impl Into<SchemaNode>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Depth-first lookup of a leaf by name.
    pub fn field(&self, name: &str) -> Option<&DataNode> {
        self.children.iter().find_map(|c| c.field(name))
    }
}

/// A schema tree node: a primitive field or a composite group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum SchemaNode {
    Field(DataNode),
    Group(Group),
}

impl From<DataNode> for SchemaNode {
    fn from(node: DataNode) -> Self {
        SchemaNode::Field(node)
    }
}

impl From<Group> for SchemaNode {
    fn from(group: Group) -> Self {
        SchemaNode::Group(group)
    }
}

impl SchemaNode {
    pub fn name(&self) -> &str {
        match self {
            SchemaNode::Field(n) => n.name(),
            SchemaNode::Group(g) => &g.name,
        }
    }

    /// Slot bytes occupied by this node and everything below it.
    pub fn byte_size(&self) -> usize {
        match self {
            SchemaNode::Field(n) => n.slot_size(),
            SchemaNode::Group(g) => g.children.iter().map(SchemaNode::byte_size).sum(),
        }
    }

    pub fn as_field(&self) -> Option<&DataNode> {
        match self {
            SchemaNode::Field(n) => Some(n),
            SchemaNode::Group(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<&Group> {
        match self {
            SchemaNode::Group(g) => Some(g),
            SchemaNode::Field(_) => None,
        }
    }

    /// Depth-first lookup of a leaf by name.
    pub fn field(&self, name: &str) -> Option<&DataNode> {
        match self {
            SchemaNode::Field(n) if n.name() == name => Some(n),
            SchemaNode::Field(_) => None,
            SchemaNode::Group(g) => g.field(name),
        }
    }

    fn bind(&mut self, offset: &mut usize) {
        match self {
            SchemaNode::Field(n) => {
                n.bind(*offset);
                *offset += n.slot_size();
            }
            SchemaNode::Group(g) => {
                for child in &mut g.children {
                    child.bind(offset);
                }
            }
        }
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a DataNode>) {
        match self {
            SchemaNode::Field(n) => out.push(n),
            SchemaNode::Group(g) => g.children.iter().for_each(|c| c.collect_fields(out)),
        }
    }
}

/// Ordered schema of one record, optionally with a companion header.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Message {
    items: Vec<SchemaNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    header: Option<Box<Message>>,
    #[serde(skip)]
    size: OnceLock<usize>,
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items && self.header == other.header
    }
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Message::add_item`].
    pub fn with(mut self, node: impl Into<SchemaNode>) -> Self {
        self.add_item(node);
        self
    }

    pub fn with_header(mut self, header: Message) -> Self {
        self.set_header(header);
        self
    }

    pub fn add_item(&mut self, node: impl Into<SchemaNode>) {
        self.items.push(node.into());
        self.size = OnceLock::new();
    }

    pub fn set_header(&mut self, header: Message) {
        self.header = Some(Box::new(header));
    }

    pub fn header(&self) -> Option<&Message> {
        self.header.as_deref()
    }

    /// Total payload bytes (queued leaves only), computed once.
    pub fn size(&self) -> usize {
        *self
            .size
            .get_or_init(|| self.items.iter().map(SchemaNode::byte_size).sum())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self, index: usize) -> Result<&SchemaNode, SchemaError> {
        self.items.get(index).ok_or(SchemaError::OutOfRange {
            index,
            len: self.items.len(),
        })
    }

    pub fn items(&self) -> impl Iterator<Item = &SchemaNode> {
        self.items.iter()
    }

    /// Depth-first lookup of a leaf by name.
    pub fn field(&self, name: &str) -> Option<&DataNode> {
        self.items.iter().find_map(|n| n.field(name))
    }

    /// Like [`Message::field`], but reports a missing name as an error.
    pub fn require_field(&self, name: &str) -> Result<&DataNode, SchemaError> {
        self.field(name)
            .ok_or_else(|| SchemaError::NotFound(name.to_string()))
    }

    /// All leaves in layout order.
    pub fn fields(&self) -> Vec<&DataNode> {
        let mut out = Vec::new();
        for item in &self.items {
            item.collect_fields(&mut out);
        }
        out
    }

    /// Assign slot regions to every queued leaf, header included.
    pub(crate) fn bind_layout(&mut self) {
        let mut offset = 0;
        for item in &mut self.items {
            item.bind(&mut offset);
        }
        if let Some(header) = self.header.as_deref_mut() {
            header.bind_layout();
        }
    }

    pub fn is_bound(&self) -> bool {
        self.fields()
            .iter()
            .filter(|n| n.is_queued())
            .all(|n| n.is_bound())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ElementType;

    fn sample() -> Message {
        Message::new()
            .with(DataNode::scalar::<f64>("value"))
            .with(
                Group::new("pose", GroupKind::Record)
                    .with(DataNode::new("position", ElementType::F32, &[3]))
                    .with(DataNode::scalar::<u32>("label").unqueued()),
            )
            .with(DataNode::scalar::<i32>("tick"))
    }

    #[test]
    fn test_size_counts_queued_leaves() {
        let msg = sample();
        assert_eq!(msg.size(), 8 + 12 + 4);
        assert_eq!(msg.len(), 3);
    }

    #[test]
    fn test_add_item_invalidates_cached_size() {
        let mut msg = Message::new().with(DataNode::scalar::<u8>("a"));
        assert_eq!(msg.size(), 1);
        msg.add_item(DataNode::scalar::<u64>("b"));
        assert_eq!(msg.size(), 9);
    }

    #[test]
    fn test_item_out_of_range() {
        let msg = sample();
        assert!(msg.item(2).is_ok());
        let err = msg.item(3).unwrap_err();
        assert_eq!(err.to_string(), "Schema item 3 out of range (3 items)");
    }

    #[test]
    fn test_bind_layout_assigns_offsets() {
        let mut msg = sample();
        msg.bind_layout();
        assert!(msg.is_bound());
        assert_eq!(msg.field("value").unwrap().region().unwrap().offset, 0);
        assert_eq!(msg.field("position").unwrap().region().unwrap().offset, 8);
        assert_eq!(msg.field("tick").unwrap().region().unwrap().offset, 20);
        assert!(msg.field("label").unwrap().region().is_none());
    }

    #[test]
    fn test_clone_is_deep() {
        let mut original = sample();
        let copy = original.clone();
        original.add_item(DataNode::scalar::<u8>("extra"));
        assert_eq!(copy.len(), 3);
        assert_eq!(original.len(), 4);
    }

    #[test]
    fn test_header_is_separate() {
        let msg = sample().with_header(Message::new().with(DataNode::scalar::<u64>("stamp")));
        assert_eq!(msg.size(), 24);
        assert_eq!(msg.header().unwrap().size(), 8);
    }

    #[test]
    fn test_serde_round_trip() {
        let msg = sample().with_header(Message::new().with(DataNode::scalar::<u64>("stamp")));
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
        assert_eq!(back.size(), msg.size());
    }
}
