//! Leaf schema field.
//!
//! A `DataNode` is a named, typed, shaped field. Queue-resident nodes own no
//! storage: once a queue is created from their schema they carry a bound
//! [`Region`] inside every slot. Unqueued nodes keep their value locally and
//! contribute nothing to the slot size.

use crate::types::{Element, ElementType};
use serde::{Deserialize, Serialize};

/// Byte range of a node inside a queue slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    pub offset: usize,
    pub len: usize,
}

impl Region {
    #[inline]
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.len
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataNode {
    name: String,
    element_type: ElementType,
    #[serde(default)]
    shape: Vec<usize>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    description: String,
    #[serde(default = "default_queued")]
    queued: bool,
    /// Local value for unqueued nodes.
    #[serde(skip)]
    local: Vec<u8>,
    #[serde(skip)]
    region: Option<Region>,
}

fn default_queued() -> bool {
    true
}

impl PartialEq for DataNode {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.element_type == other.element_type
            && self.shape == other.shape
            && self.description == other.description
            && self.queued == other.queued
    }
}

impl DataNode {
    /// Create a queued field. An empty shape is a scalar.
    pub fn new(name: impl Into<String>, element_type: ElementType, shape: &[usize]) -> Self {
        Self {
            name: name.into(),
            element_type,
            shape: shape.to_vec(),
            description: String::new(),
            queued: true,
            local: Vec::new(),
            region: None,
        }
    }

    /// Create a queued scalar field for a Rust primitive.
    pub fn scalar<T: Element>(name: impl Into<String>) -> Self {
        Self::new(name, T::TYPE, &[])
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Mark this node as unqueued: it keeps a local value and occupies no slot bytes.
    pub fn unqueued(mut self) -> Self {
        self.queued = false;
        self.local = vec![0; self.byte_size()];
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_queued(&self) -> bool {
        self.queued
    }

    /// Number of elements (product of the shape, 1 for scalars).
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn byte_size(&self) -> usize {
        self.element_count() * self.element_type.size_bytes()
    }

    /// Slot bytes this node occupies: zero for unqueued nodes.
    pub(crate) fn slot_size(&self) -> usize {
        if self.queued {
            self.byte_size()
        } else {
            0
        }
    }

    pub fn region(&self) -> Option<Region> {
        self.region
    }

    pub fn is_bound(&self) -> bool {
        self.region.is_some()
    }

    pub(crate) fn bind(&mut self, offset: usize) {
        if self.queued {
            self.region = Some(Region {
                offset,
                len: self.byte_size(),
            });
        }
    }

    #[inline]
    fn bound_region(&self) -> Region {
        match self.region {
            Some(region) => region,
            None => panic!("schema node '{}' is not bound to queue storage", self.name),
        }
    }

    /// Copy `byte_size` bytes from `src` into this node's region of `slot`.
    ///
    /// # Panics
    /// Panics if the node is unbound or `src` is shorter than `byte_size`.
    pub fn write(&self, slot: &mut [u8], src: &[u8]) {
        let region = self.bound_region();
        assert!(
            src.len() >= region.len,
            "node '{}' needs {} bytes, got {}",
            self.name,
            region.len,
            src.len()
        );
        slot[region.range()].copy_from_slice(&src[..region.len]);
    }

    /// Copy `byte_size` bytes out of this node's region of `slot` into `dst`.
    ///
    /// # Panics
    /// Panics if the node is unbound or `dst` is shorter than `byte_size`.
    pub fn read(&self, slot: &[u8], dst: &mut [u8]) {
        let region = self.bound_region();
        assert!(
            dst.len() >= region.len,
            "node '{}' needs {} bytes, got {}",
            self.name,
            region.len,
            dst.len()
        );
        dst[..region.len].copy_from_slice(&slot[region.range()]);
    }

    /// Borrow this node's bytes inside a slot.
    pub fn bytes<'s>(&self, slot: &'s [u8]) -> &'s [u8] {
        &slot[self.bound_region().range()]
    }

    pub fn bytes_mut<'s>(&self, slot: &'s mut [u8]) -> &'s mut [u8] {
        &mut slot[self.bound_region().range()]
    }

    /// Store element `index` as `T`. The element type must match `T`.
    pub fn set<T: Element>(&self, slot: &mut [u8], index: usize, value: T) {
        let at = self.element_offset::<T>(index);
        value.encode(&mut slot[at..at + T::TYPE.size_bytes()]);
    }

    /// Load element `index` as `T`. The element type must match `T`.
    pub fn get<T: Element>(&self, slot: &[u8], index: usize) -> T {
        let at = self.element_offset::<T>(index);
        T::decode(&slot[at..at + T::TYPE.size_bytes()])
    }

    fn element_offset<T: Element>(&self, index: usize) -> usize {
        assert_eq!(
            self.element_type,
            T::TYPE,
            "node '{}' holds {}, accessed as {}",
            self.name,
            self.element_type,
            T::TYPE
        );
        assert!(
            index < self.element_count(),
            "index {} out of bounds for node '{}'",
            index,
            self.name
        );
        self.bound_region().offset + index * T::TYPE.size_bytes()
    }

    /// Local value of an unqueued node.
    pub fn local(&self) -> &[u8] {
        &self.local
    }

    pub fn set_local(&mut self, src: &[u8]) {
        let len = self.byte_size();
        self.local.resize(len, 0);
        let n = src.len().min(len);
        self.local[..n].copy_from_slice(&src[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_size_from_shape() {
        let node = DataNode::new("matrix", ElementType::F32, &[3, 4]);
        assert_eq!(node.element_count(), 12);
        assert_eq!(node.byte_size(), 48);

        let scalar = DataNode::scalar::<u16>("count");
        assert_eq!(scalar.byte_size(), 2);
    }

    #[test]
    fn test_write_read_bound_node() {
        let mut node = DataNode::scalar::<i32>("value");
        node.bind(4);
        let mut slot = vec![0u8; 8];
        node.write(&mut slot, &7i32.to_le_bytes());
        assert_eq!(&slot[4..8], &7i32.to_le_bytes());

        let mut out = [0u8; 4];
        node.read(&slot, &mut out);
        assert_eq!(i32::from_le_bytes(out), 7);
        assert_eq!(node.get::<i32>(&slot, 0), 7);
    }

    #[test]
    fn test_typed_array_access() {
        let mut node = DataNode::new("samples", ElementType::U16, &[4]);
        node.bind(0);
        let mut slot = vec![0u8; node.byte_size()];
        for i in 0..4 {
            node.set(&mut slot, i, (i * 10) as u16);
        }
        assert_eq!(node.get::<u16>(&slot, 3), 30);
    }

    #[test]
    #[should_panic(expected = "not bound")]
    fn test_unbound_write_panics() {
        let node = DataNode::scalar::<u8>("flag");
        let mut slot = [0u8; 1];
        node.write(&mut slot, &[1]);
    }

    #[test]
    #[should_panic(expected = "accessed as")]
    fn test_type_mismatch_panics() {
        let mut node = DataNode::scalar::<f32>("gain");
        node.bind(0);
        let slot = [0u8; 4];
        let _ = node.get::<i32>(&slot, 0);
    }

    #[test]
    fn test_unqueued_node_keeps_local_value() {
        let mut node = DataNode::scalar::<u32>("rate").unqueued();
        assert_eq!(node.slot_size(), 0);
        node.set_local(&100u32.to_le_bytes());
        assert_eq!(node.local(), &100u32.to_le_bytes());
        node.bind(0);
        assert!(!node.is_bound());
    }
}
