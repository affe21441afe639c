use crate::decode::DecodeError;

/// Errors that abort engine initialization.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum InitError {
	#[error("no video track found")]
	NoVideoTrack,

	#[error("video track has no samples")]
	EmptyTrack,

	#[error("invalid frame rate: {0}")]
	InvalidFrameRate(f64),

	/// Samples must be ordered by index, starting at zero.
	#[error("sample {0} out of order")]
	OutOfOrder(u64),

	#[error("decoder config unsupported: {0}")]
	DecoderConfigUnsupported(DecodeError),

	/// The engine spawns tasks, so it must be created within a Tokio runtime.
	#[error("no tokio runtime")]
	Runtime,
}

/// Errors that reject a single seek.
///
/// These never affect the frame store or later seeks.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum SeekError {
	/// A later seek replaced this one before it resolved.
	#[error("superseded by a later seek")]
	Superseded,

	#[error("frame {index} out of range ({total} frames)")]
	OutOfRange { index: u64, total: u64 },

	#[error("invalid seek time: {0}")]
	InvalidTime(f64),

	/// A sample in the dependency chain of the target failed to decode.
	#[error("sample {index} failed to decode: {error}")]
	Decode { index: u64, error: DecodeError },

	/// The decoder failed to drain.
	#[error("flush failed: {0}")]
	Flush(DecodeError),

	#[error("engine closed")]
	Closed,
}

/// Any error produced while opening a source.
#[cfg(all(feature = "fetch", feature = "mp4"))]
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
	#[error("fetch error: {0}")]
	Fetch(#[from] crate::FetchError),

	#[error("demux error: {0}")]
	Demux(#[from] crate::DemuxError),

	#[error("init error: {0}")]
	Init(#[from] InitError),
}

#[cfg(all(feature = "fetch", feature = "mp4"))]
pub type Result<T> = std::result::Result<T, Error>;
