//! Image groups.
//!
//! An image expands to `width`, `height`, `channels`, `format`,
//! `encoded_size` and a `pixels` buffer sized for the largest frame.
//! [`ImageFields`] resolves the bound leaves once so a filter can fill a
//! slot without name lookups in its job loop.

use crate::schema::message::{Group, GroupKind, Message, SchemaNode};
use crate::schema::node::DataNode;
use crate::schema::SchemaError;
use crate::types::{ElementType, PixelFormat};

/// Build an image group for frames up to `width` x `height`.
pub fn image_group(name: impl Into<String>, width: u32, height: u32, format: PixelFormat) -> Group {
    let capacity = width as usize * height as usize * format.channels();
    Group::new(name, GroupKind::Image { format })
        .with(DataNode::scalar::<u32>("width"))
        .with(DataNode::scalar::<u32>("height"))
        .with(DataNode::scalar::<u32>("channels"))
        .with(DataNode::scalar::<u32>("format"))
        .with(DataNode::scalar::<u32>("encoded_size").with_description("bytes used in pixels"))
        .with(DataNode::new("pixels", ElementType::U8, &[capacity]))
}

/// Bound leaves of an image group.
#[derive(Debug, Clone)]
pub struct ImageFields {
    pub format: PixelFormat,
    width: DataNode,
    height: DataNode,
    channels: DataNode,
    format_code: DataNode,
    encoded_size: DataNode,
    pixels: DataNode,
}

/// Decoded image metadata read from a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub format: Option<PixelFormat>,
    pub encoded_size: u32,
}

impl ImageFields {
    /// Resolve the image group called `name` in a bound schema.
    pub fn resolve(schema: &Message, name: &str) -> Result<Self, SchemaError> {
        let group = schema
            .items()
            .filter_map(SchemaNode::as_group)
            .find(|g| g.name == name)
            .ok_or_else(|| SchemaError::NotFound(name.to_string()))?;
        let GroupKind::Image { format } = group.kind else {
            return Err(SchemaError::InvalidShape(format!(
                "group '{}' is not an image",
                name
            )));
        };
        let leaf = |field: &str| {
            group
                .field(field)
                .cloned()
                .ok_or_else(|| SchemaError::NotFound(format!("{}.{}", name, field)))
        };
        Ok(Self {
            format,
            width: leaf("width")?,
            height: leaf("height")?,
            channels: leaf("channels")?,
            format_code: leaf("format")?,
            encoded_size: leaf("encoded_size")?,
            pixels: leaf("pixels")?,
        })
    }

    /// Largest frame the pixel buffer can hold.
    pub fn capacity(&self) -> usize {
        self.pixels.byte_size()
    }

    /// Write one frame into `slot`; `pixels` may be shorter than the buffer.
    pub fn write_frame(
        &self,
        slot: &mut [u8],
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<(), SchemaError> {
        if pixels.len() > self.capacity() {
            return Err(SchemaError::InvalidShape(format!(
                "frame of {} bytes exceeds image capacity {}",
                pixels.len(),
                self.capacity()
            )));
        }
        self.width.set(slot, 0, width);
        self.height.set(slot, 0, height);
        self.channels.set(slot, 0, self.format.channels() as u32);
        self.format_code.set(slot, 0, self.format.code());
        self.encoded_size.set(slot, 0, pixels.len() as u32);
        self.pixels.bytes_mut(slot)[..pixels.len()].copy_from_slice(pixels);
        Ok(())
    }

    pub fn info(&self, slot: &[u8]) -> ImageInfo {
        ImageInfo {
            width: self.width.get(slot, 0),
            height: self.height.get(slot, 0),
            channels: self.channels.get(slot, 0),
            format: PixelFormat::from_code(self.format_code.get(slot, 0)),
            encoded_size: self.encoded_size.get(slot, 0),
        }
    }

    /// The used part of the pixel buffer.
    pub fn pixels<'s>(&self, slot: &'s [u8]) -> &'s [u8] {
        let used = (self.encoded_size.get::<u32>(slot, 0) as usize).min(self.capacity());
        &self.pixels.bytes(slot)[..used]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_group_size() {
        let group = image_group("camera", 4, 2, PixelFormat::Rgb8);
        let node = SchemaNode::Group(group);
        assert_eq!(node.byte_size(), 5 * 4 + 4 * 2 * 3);
    }

    #[test]
    fn test_write_and_read_frame() {
        let mut schema = Message::new()
            .with(DataNode::scalar::<u64>("stamp"))
            .with(image_group("camera", 2, 2, PixelFormat::Gray8));
        schema.bind_layout();

        let fields = ImageFields::resolve(&schema, "camera").unwrap();
        let mut slot = vec![0u8; schema.size()];
        fields.write_frame(&mut slot, 2, 2, &[1, 2, 3, 4]).unwrap();

        let info = fields.info(&slot);
        assert_eq!(info.width, 2);
        assert_eq!(info.channels, 1);
        assert_eq!(info.format, Some(PixelFormat::Gray8));
        assert_eq!(fields.pixels(&slot), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut schema = Message::new().with(image_group("camera", 1, 1, PixelFormat::Gray8));
        schema.bind_layout();
        let fields = ImageFields::resolve(&schema, "camera").unwrap();
        let mut slot = vec![0u8; schema.size()];
        assert!(fields.write_frame(&mut slot, 2, 1, &[0, 0]).is_err());
    }

    #[test]
    fn test_resolve_missing_group() {
        let mut schema = Message::new().with(DataNode::scalar::<u8>("x"));
        schema.bind_layout();
        assert!(matches!(
            ImageFields::resolve(&schema, "camera"),
            Err(SchemaError::NotFound(_))
        ));
    }
}
