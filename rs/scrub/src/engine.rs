use std::future::Future;
use std::num::NonZeroUsize;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::{mpsc, oneshot};

use crate::binder::Binder;
use crate::coordinator::{Command, Coordinator};
use crate::decode::Decoder;
use crate::metadata::SampleTable;
use crate::store::FrameStore;
use crate::{
	DecodedFrame, DecoderConfig, FrameClock, InitError, Retention, Sample, SeekError, StreamMetadata, Track,
};

/// Tuning for an [Engine].
#[derive(Clone, Debug, Default, clap::Args, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
#[non_exhaustive]
pub struct EngineConfig {
	/// Keep at most this many decoded frames, evicting the least recently used.
	///
	/// Every decoded frame is kept when unset.
	#[serde(skip_serializing_if = "Option::is_none")]
	#[arg(id = "cache-frames", long = "cache-frames", env = "SCRUB_CACHE_FRAMES")]
	pub cache_frames: Option<NonZeroUsize>,

	/// Hold up to this many decoded frames to restore presentation order.
	///
	/// Only needed when the decoder emits frames out of order.
	#[arg(
		id = "reorder-depth",
		long = "reorder-depth",
		env = "SCRUB_REORDER_DEPTH",
		default_value_t = 0
	)]
	pub reorder_depth: usize,
}

impl EngineConfig {
	pub fn retention(&self) -> Retention {
		match self.cache_frames {
			Some(capacity) => Retention::Lru(capacity),
			None => Retention::Unbounded,
		}
	}
}

/// Counters describing the work done by an [Engine].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
	/// The number of frames in the stream.
	pub frames: u64,

	/// The number of decoded frames currently cached.
	pub cached: usize,

	pub hits: u64,
	pub misses: u64,
	pub evicted: u64,

	/// The number of samples sent to the decoder.
	pub submitted: u64,
}

/// Frame-accurate random access into a video stream.
///
/// Cloning produces another handle to the same engine.
/// The engine shuts down once every handle is dropped.
#[derive(Clone)]
pub struct Engine {
	commands: mpsc::UnboundedSender<Command>,
	metadata: Arc<StreamMetadata>,
	clock: FrameClock,
}

impl Engine {
	/// Start an engine for the given samples.
	///
	/// The decoder is configured immediately, so an unsupported codec fails here.
	/// Must be called within a Tokio runtime.
	pub fn initialize<D: Decoder>(
		samples: Vec<Sample>,
		config: DecoderConfig,
		fps: f64,
		decoder: D,
		options: EngineConfig,
	) -> Result<Self, InitError> {
		let runtime = tokio::runtime::Handle::try_current().map_err(|_| InitError::Runtime)?;

		let metadata = StreamMetadata::new(&samples, config, fps)?;
		let clock = FrameClock::new(fps);
		let table = SampleTable::new(samples, clock)?;

		let binder = Binder::new(decoder, &metadata.config, options.reorder_depth)?;
		let store = FrameStore::new(options.retention());

		tracing::info!(
			codec = %metadata.config.codec,
			width = metadata.config.coded_width,
			height = metadata.config.coded_height,
			fps,
			frames = metadata.frames,
			keyframes = metadata.keyframes,
			retention = ?options.retention(),
			"initialized"
		);

		let (commands, rx) = mpsc::unbounded_channel();
		runtime.spawn(Coordinator::new(table, store, binder).run(rx));

		Ok(Self {
			commands,
			metadata: Arc::new(metadata),
			clock,
		})
	}

	/// Start an engine for the first video track.
	pub fn open<D: Decoder>(tracks: Vec<Track>, decoder: D, options: EngineConfig) -> Result<Self, InitError> {
		let (metadata, samples) = StreamMetadata::derive(tracks)?;
		Self::initialize(samples, metadata.config, metadata.fps, decoder, options)
	}

	pub fn metadata(&self) -> &StreamMetadata {
		&self.metadata
	}

	/// Return the frame shown at the given time.
	///
	/// The request is registered immediately, not when the result is first polled.
	/// Any earlier seek that has not resolved yet fails with [SeekError::Superseded].
	pub fn seek(&self, seconds: f64) -> Seek {
		match self.clock.index(seconds) {
			Some(index) => self.seek_frame(index),
			None => Seek::error(None, SeekError::InvalidTime(seconds)),
		}
	}

	/// Return the frame at the given index.
	///
	/// Out of range requests fail without superseding the current seek.
	pub fn seek_frame(&self, index: u64) -> Seek {
		let total = self.metadata.frames;
		if index >= total {
			return Seek::error(Some(index), SeekError::OutOfRange { index, total });
		}

		let (reply, rx) = oneshot::channel();
		if self.commands.send(Command::Seek { target: index, reply }).is_err() {
			return Seek::error(Some(index), SeekError::Closed);
		}

		Seek {
			index: Some(index),
			rx,
		}
	}

	/// Decode every frame once, filling the cache.
	pub async fn preload(&self) -> Result<(), SeekError> {
		let (reply, rx) = oneshot::channel();
		self.send(Command::Preload { reply })?;
		rx.await.unwrap_or(Err(SeekError::Closed))
	}

	/// Wait until every queued sample is decoded and every buffered frame is cached.
	pub async fn flush(&self) -> Result<(), SeekError> {
		let (reply, rx) = oneshot::channel();
		self.send(Command::Flush { reply })?;
		rx.await.unwrap_or(Err(SeekError::Closed))
	}

	pub async fn stats(&self) -> Result<Stats, SeekError> {
		let (reply, rx) = oneshot::channel();
		self.send(Command::Stats { reply })?;
		rx.await.map_err(|_| SeekError::Closed)
	}

	fn send(&self, command: Command) -> Result<(), SeekError> {
		self.commands.send(command).map_err(|_| SeekError::Closed)
	}
}

/// A pending [Engine::seek], resolving to the decoded frame.
pub struct Seek {
	index: Option<u64>,
	rx: oneshot::Receiver<Result<DecodedFrame, SeekError>>,
}

impl Seek {
	fn error(index: Option<u64>, err: SeekError) -> Self {
		let (tx, rx) = oneshot::channel();
		let _ = tx.send(Err(err));
		Self { index, rx }
	}

	/// The requested frame index, if the time was valid.
	pub fn index(&self) -> Option<u64> {
		self.index
	}
}

impl Future for Seek {
	type Output = Result<DecodedFrame, SeekError>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		Pin::new(&mut self.rx)
			.poll(cx)
			.map(|result| result.unwrap_or(Err(SeekError::Closed)))
	}
}
