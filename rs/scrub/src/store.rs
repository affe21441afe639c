use std::num::NonZeroUsize;

use lru::LruCache;

use crate::DecodedFrame;

/// How many decoded frames an [crate::Engine] retains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Retention {
	/// Keep every decoded frame for the lifetime of the engine.
	#[default]
	Unbounded,

	/// Keep at most this many frames, evicting the least recently used.
	Lru(NonZeroUsize),
}

/// A sparse cache of decoded frames, keyed by frame index.
///
/// Entries are write-once: a repeated write for an index keeps the original frame.
pub(crate) struct FrameStore {
	frames: LruCache<u64, DecodedFrame>,

	hits: u64,
	misses: u64,
	evicted: u64,
}

impl FrameStore {
	pub fn new(retention: Retention) -> Self {
		let frames = match retention {
			Retention::Unbounded => LruCache::unbounded(),
			Retention::Lru(capacity) => LruCache::new(capacity),
		};

		Self {
			frames,
			hits: 0,
			misses: 0,
			evicted: 0,
		}
	}

	/// Return the frame at the index, marking it as recently used.
	pub fn get(&mut self, index: u64) -> Option<DecodedFrame> {
		match self.frames.get(&index) {
			Some(frame) => {
				self.hits += 1;
				Some(frame.clone())
			}
			None => {
				self.misses += 1;
				None
			}
		}
	}

	pub fn has(&self, index: u64) -> bool {
		self.frames.contains(&index)
	}

	/// Store a frame, returning the frame now held for its index.
	pub fn put(&mut self, frame: DecodedFrame) -> DecodedFrame {
		if let Some(existing) = self.frames.peek(&frame.index) {
			tracing::trace!(index = frame.index, "frame already stored");
			return existing.clone();
		}

		if let Some((index, _)) = self.frames.push(frame.index, frame.clone()) {
			tracing::trace!(index, "evicted frame");
			self.evicted += 1;
		}

		frame
	}

	pub fn len(&self) -> usize {
		self.frames.len()
	}

	pub fn hits(&self) -> u64 {
		self.hits
	}

	pub fn misses(&self) -> u64 {
		self.misses
	}

	pub fn evicted(&self) -> u64 {
		self.evicted
	}
}
