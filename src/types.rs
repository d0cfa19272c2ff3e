//! Core element types for dataflow-rs
//!
//! This module contains the primitive types a schema field can hold and the
//! byte-level codec used to move typed values in and out of queue slots.
//!
//! # Main Types
//!
//! - [`ElementType`] - Enum of supported element types (u8, i16, f32, etc.)
//! - [`Element`] - Trait implemented by Rust primitives that map onto an [`ElementType`]
//! - [`PixelFormat`] - Pixel layouts understood by image groups
//!
//! All multi-byte values are stored little-endian inside a slot.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Represents the type of a single schema element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    /// 8-bit unsigned integer
    #[default]
    U8,
    /// 8-bit signed integer
    I8,
    /// 8-bit character (raw byte)
    Char,
    /// 16-bit unsigned integer
    U16,
    /// 16-bit signed integer
    I16,
    /// 32-bit unsigned integer
    U32,
    /// 32-bit signed integer
    I32,
    /// 64-bit unsigned integer
    U64,
    /// 64-bit signed integer
    I64,
    /// 32-bit floating point
    F32,
    /// 64-bit floating point
    F64,
    /// Boolean value stored as one byte
    Bool,
}

impl ElementType {
    /// Returns the size in bytes of one element of this type
    pub fn size_bytes(&self) -> usize {
        match self {
            ElementType::U8 | ElementType::I8 | ElementType::Char | ElementType::Bool => 1,
            ElementType::U16 | ElementType::I16 => 2,
            ElementType::U32 | ElementType::I32 | ElementType::F32 => 4,
            ElementType::U64 | ElementType::I64 | ElementType::F64 => 8,
        }
    }

    /// Returns true for signed integer and floating point types
    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            ElementType::I8
                | ElementType::I16
                | ElementType::I32
                | ElementType::I64
                | ElementType::F32
                | ElementType::F64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, ElementType::F32 | ElementType::F64)
    }

    /// Decode one element into a f64, mainly for inspection and logging.
    pub fn parse_to_f64(&self, bytes: &[u8]) -> Option<f64> {
        if bytes.len() < self.size_bytes() {
            return None;
        }

        Some(match self {
            ElementType::U8 | ElementType::Char => bytes[0] as f64,
            ElementType::I8 => bytes[0] as i8 as f64,
            ElementType::Bool => {
                if bytes[0] != 0 {
                    1.0
                } else {
                    0.0
                }
            }
            ElementType::U16 => u16::decode(bytes) as f64,
            ElementType::I16 => i16::decode(bytes) as f64,
            ElementType::U32 => u32::decode(bytes) as f64,
            ElementType::I32 => i32::decode(bytes) as f64,
            ElementType::F32 => f32::decode(bytes) as f64,
            ElementType::U64 => u64::decode(bytes) as f64,
            ElementType::I64 => i64::decode(bytes) as f64,
            ElementType::F64 => f64::decode(bytes),
        })
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ElementType::U8 => "u8",
            ElementType::I8 => "i8",
            ElementType::Char => "char",
            ElementType::U16 => "u16",
            ElementType::I16 => "i16",
            ElementType::U32 => "u32",
            ElementType::I32 => "i32",
            ElementType::U64 => "u64",
            ElementType::I64 => "i64",
            ElementType::F32 => "f32",
            ElementType::F64 => "f64",
            ElementType::Bool => "bool",
        };
        f.write_str(name)
    }
}

impl FromStr for ElementType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "u8" | "uint8" => Ok(ElementType::U8),
            "i8" | "int8" => Ok(ElementType::I8),
            "char" => Ok(ElementType::Char),
            "u16" | "uint16" => Ok(ElementType::U16),
            "i16" | "int16" => Ok(ElementType::I16),
            "u32" | "uint32" => Ok(ElementType::U32),
            "i32" | "int32" => Ok(ElementType::I32),
            "u64" | "uint64" => Ok(ElementType::U64),
            "i64" | "int64" => Ok(ElementType::I64),
            "f32" | "float" => Ok(ElementType::F32),
            "f64" | "double" => Ok(ElementType::F64),
            "bool" => Ok(ElementType::Bool),
            other => Err(format!("unknown element type '{}'", other)),
        }
    }
}

/// A Rust primitive that can be stored in a schema field.
///
/// `encode`/`decode` operate on exactly `TYPE.size_bytes()` bytes; callers
/// slice the buffer first.
pub trait Element: Copy + Send + 'static {
    const TYPE: ElementType;

    fn encode(self, out: &mut [u8]);

    fn decode(bytes: &[u8]) -> Self;
}

macro_rules! impl_element {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl Element for $ty {
                const TYPE: ElementType = ElementType::$variant;

                #[inline]
                fn encode(self, out: &mut [u8]) {
                    out[..std::mem::size_of::<$ty>()].copy_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn decode(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..std::mem::size_of::<$ty>()]);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_element! {
    u8 => U8,
    i8 => I8,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    u64 => U64,
    i64 => I64,
    f32 => F32,
    f64 => F64,
}

impl Element for bool {
    const TYPE: ElementType = ElementType::Bool;

    #[inline]
    fn encode(self, out: &mut [u8]) {
        out[0] = self as u8;
    }

    #[inline]
    fn decode(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

/// Pixel layouts carried by image groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    #[default]
    Gray8,
    Rgb8,
    Bgr8,
    Rgba8,
    /// Packed YUV 4:2:2
    Yuyv,
    /// Compressed frame; the pixel buffer holds encoded bytes
    Jpeg,
}

impl PixelFormat {
    /// Number of bytes per pixel in the uncompressed layout
    pub fn channels(&self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Yuyv => 2,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
            PixelFormat::Rgba8 => 4,
            // Worst case for an encoded frame is the raw RGB size
            PixelFormat::Jpeg => 3,
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, PixelFormat::Jpeg)
    }

    /// Stable numeric code written into the `format` field of an image group
    pub fn code(&self) -> u32 {
        match self {
            PixelFormat::Gray8 => 0,
            PixelFormat::Rgb8 => 1,
            PixelFormat::Bgr8 => 2,
            PixelFormat::Rgba8 => 3,
            PixelFormat::Yuyv => 4,
            PixelFormat::Jpeg => 5,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => PixelFormat::Gray8,
            1 => PixelFormat::Rgb8,
            2 => PixelFormat::Bgr8,
            3 => PixelFormat::Rgba8,
            4 => PixelFormat::Yuyv,
            5 => PixelFormat::Jpeg,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_type_sizes() {
        assert_eq!(ElementType::U8.size_bytes(), 1);
        assert_eq!(ElementType::Char.size_bytes(), 1);
        assert_eq!(ElementType::I16.size_bytes(), 2);
        assert_eq!(ElementType::F32.size_bytes(), 4);
        assert_eq!(ElementType::I64.size_bytes(), 8);
        assert_eq!(ElementType::Bool.size_bytes(), 1);
    }

    #[test]
    fn test_element_type_parse() {
        assert_eq!("double".parse::<ElementType>().unwrap(), ElementType::F64);
        assert_eq!("I32".parse::<ElementType>().unwrap(), ElementType::I32);
        assert!("complex".parse::<ElementType>().is_err());
    }

    #[test]
    fn test_element_encode_decode() {
        let mut buf = [0u8; 8];
        (-1234i32).encode(&mut buf);
        assert_eq!(i32::decode(&buf), -1234);
        assert_eq!(ElementType::I32.parse_to_f64(&buf), Some(-1234.0));

        2.5f64.encode(&mut buf);
        assert_eq!(f64::decode(&buf), 2.5);

        true.encode(&mut buf);
        assert!(bool::decode(&buf));
    }

    #[test]
    fn test_parse_to_f64_short_buffer() {
        assert_eq!(ElementType::U32.parse_to_f64(&[1, 2]), None);
    }

    #[test]
    fn test_pixel_format_codes() {
        for format in [
            PixelFormat::Gray8,
            PixelFormat::Rgb8,
            PixelFormat::Bgr8,
            PixelFormat::Rgba8,
            PixelFormat::Yuyv,
            PixelFormat::Jpeg,
        ] {
            assert_eq!(PixelFormat::from_code(format.code()), Some(format));
        }
        assert_eq!(PixelFormat::from_code(99), None);
        assert_eq!(PixelFormat::Rgba8.channels(), 4);
    }
}
