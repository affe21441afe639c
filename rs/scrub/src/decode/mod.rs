//! The decoder primitive driven by the engine.
//!
//! A [Decoder] is stateful: predictive codecs need every sample from the last sync sample
//! onwards, in order, before they can produce the next frame.
//! The engine never calls a decoder from more than one thread at a time, but it does call it
//! from a blocking worker thread, so decode may take as long as it needs.
//!
//! # Backends
//!
//! - `ffmpeg` (feature): software decoding via FFmpeg, producing RGBA images.
//!
//! Anything else (hardware decoders, WebCodecs) can implement the trait directly.

use crate::{DecoderConfig, RawFrame, Sample};

#[cfg(feature = "ffmpeg")]
mod ffmpeg;

#[cfg(test)]
pub(crate) mod script;

#[cfg(feature = "ffmpeg")]
pub use ffmpeg::FfmpegDecoder;

/// Errors that can occur during decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum DecodeError {
	#[error("unsupported codec: {0}")]
	Unsupported(String),

	#[error("failed to initialize decoder: {0}")]
	Init(String),

	#[error("failed to decode sample: {0}")]
	Decode(String),

	#[error("invalid sample data: {0}")]
	InvalidData(String),

	/// The decoder did not produce a frame for a sample it consumed.
	#[error("no frame produced")]
	Missing,
}

/// A stateful video decoder.
pub trait Decoder: Send + 'static {
	/// Prepare the decoder for the stream, failing if the codec is unsupported.
	fn configure(&mut self, config: &DecoderConfig) -> Result<(), DecodeError>;

	/// Decode a sample, returning any frames that became available.
	///
	/// Codecs with internal delay may return nothing until later samples or a flush.
	fn decode(&mut self, sample: &Sample) -> Result<Vec<RawFrame>, DecodeError>;

	/// Return every buffered frame and reset the decoder.
	///
	/// The next sample decoded after a flush must be a sync sample.
	fn flush(&mut self) -> Result<Vec<RawFrame>, DecodeError>;
}

impl<D: Decoder + ?Sized> Decoder for Box<D> {
	fn configure(&mut self, config: &DecoderConfig) -> Result<(), DecodeError> {
		(**self).configure(config)
	}

	fn decode(&mut self, sample: &Sample) -> Result<Vec<RawFrame>, DecodeError> {
		(**self).decode(sample)
	}

	fn flush(&mut self) -> Result<Vec<RawFrame>, DecodeError> {
		(**self).flush()
	}
}
