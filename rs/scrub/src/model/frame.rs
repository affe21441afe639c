use std::sync::Arc;

use bytes::Bytes;

use crate::Timestamp;

/// Pixel layout of a decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum PixelFormat {
	/// RGBA packed, 8 bits per channel
	Rgba,
}

/// A single plane of pixel data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
	pub data: Bytes,

	/// Number of bytes between rows (may include padding).
	pub stride: usize,
}

/// Raw pixel data produced by a decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
	pub format: PixelFormat,
	pub width: u32,
	pub height: u32,
	pub planes: Vec<Plane>,
}

/// A decoder output before it has been assigned a frame index.
#[derive(Debug, Clone)]
pub struct RawFrame {
	pub timestamp: Timestamp,
	pub image: Image,
}

/// A decoded frame, keyed by its index in the stream.
///
/// Cloning is cheap; the pixel data is shared.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
	pub index: u64,
	pub timestamp: Timestamp,
	pub image: Arc<Image>,
}

impl DecodedFrame {
	/// Returns true if both frames share the same decoded image.
	pub fn is_clone(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.image, &other.image)
	}
}
