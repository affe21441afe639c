//! # scrub: frame-accurate seeking for compressed video
//!
//! `scrub` returns the exact decoded frame shown at any time in a video, reusing earlier
//! decode work whenever possible.
//!
//! ## Overview
//!
//! - **Engine**: The handle used to seek; each seek resolves to a [DecodedFrame].
//! - **Coordinator**: Decodes the minimum chain of samples from the nearest sync sample.
//! - **Frame Store**: Caches decoded frames by index, optionally bounded.
//! - **Decoder**: A pluggable, stateful decoder, see [decode].
//!
//! A newer seek supersedes any seek that has not resolved yet, which then fails with
//! [SeekError::Superseded]. Work already queued for the superseded seek still completes and is cached.
//!
//! ```ignore
//! let engine = scrub::open("video.mp4", scrub::decode::FfmpegDecoder::new(), Default::default()).await?;
//! let frame = engine.seek(1.5).await?;
//! ```
mod binder;
mod coordinator;
mod engine;
mod error;
mod log;
mod metadata;
mod model;
mod store;

pub mod decode;

#[cfg(feature = "fetch")]
mod fetch;
#[cfg(feature = "mp4")]
pub mod mp4;

#[cfg(test)]
mod fixture;

pub use engine::*;
pub use error::*;
pub use log::*;
pub use metadata::{FrameClock, StreamMetadata, Track, TrackKind};
pub use model::*;
pub use store::Retention;

#[cfg(feature = "fetch")]
pub use fetch::*;
#[cfg(feature = "mp4")]
pub use mp4::DemuxError;

/// Fetch an MP4 file or URL and start an engine for its first video track.
#[cfg(all(feature = "fetch", feature = "mp4"))]
pub async fn open<D: decode::Decoder>(source: &str, decoder: D, config: EngineConfig) -> Result<Engine> {
	let data = fetch(source).await?;
	let tracks = mp4::demux(&data)?;

	Ok(Engine::open(tracks, decoder, config)?)
}
