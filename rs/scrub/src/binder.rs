use std::collections::BTreeMap;

use tokio::sync::mpsc;

use crate::decode::{DecodeError, Decoder};
use crate::{DecoderConfig, InitError, RawFrame, Sample, SeekError, Timestamp};

enum Request {
	Decode { run: u64, sample: Sample },
	Flush,
}

/// Notifications emitted by the decode worker, in the order they happened.
///
/// `run` identifies the contiguous submission sequence a sample was part of.
#[derive(Debug)]
pub(crate) enum Event {
	/// A frame was released by the decoder.
	Frame(RawFrame),

	/// The sample was consumed by the decoder, after any frames it produced.
	Consumed { run: u64, index: u64 },

	/// The decoder rejected the sample.
	Failed { run: u64, index: u64, error: DecodeError },

	/// The sample was not decoded because an earlier reference failed.
	Skipped {
		run: u64,
		index: u64,
		cause: u64,
		error: DecodeError,
	},

	/// Every submitted sample has been decoded and every buffered frame released.
	Flushed(Result<(), DecodeError>),
}

/// Owns the decoder, running it on a blocking worker thread.
///
/// Submissions are queued and never block; results arrive via [Binder::next].
pub(crate) struct Binder {
	requests: mpsc::UnboundedSender<Request>,
	events: mpsc::UnboundedReceiver<Event>,
}

impl Binder {
	/// Configure the decoder and start the worker.
	///
	/// Must be called within a Tokio runtime.
	pub fn new<D: Decoder>(mut decoder: D, config: &DecoderConfig, reorder: usize) -> Result<Self, InitError> {
		decoder
			.configure(config)
			.map_err(InitError::DecoderConfigUnsupported)?;

		let (requests, rx) = mpsc::unbounded_channel();
		let (tx, events) = mpsc::unbounded_channel();

		let worker = Worker {
			decoder,
			events: tx,
			reorder: Reorder::new(reorder),
			poisoned: None,
		};

		tokio::task::spawn_blocking(move || worker.run(rx));

		Ok(Self { requests, events })
	}

	pub fn submit(&self, run: u64, sample: Sample) -> Result<(), SeekError> {
		self.requests
			.send(Request::Decode { run, sample })
			.map_err(|_| SeekError::Closed)
	}

	/// Drain the decoder; a [Event::Flushed] is emitted once everything queued before it is done.
	pub fn flush(&self) -> Result<(), SeekError> {
		self.requests.send(Request::Flush).map_err(|_| SeekError::Closed)
	}

	/// Returns None if the worker exited.
	pub async fn next(&mut self) -> Option<Event> {
		self.events.recv().await
	}
}

struct Poison {
	run: u64,
	cause: u64,
	error: DecodeError,
}

struct Worker<D: Decoder> {
	decoder: D,
	events: mpsc::UnboundedSender<Event>,
	reorder: Reorder,

	// Set after a failure until the next sync sample.
	poisoned: Option<Poison>,
}

impl<D: Decoder> Worker<D> {
	fn run(mut self, mut requests: mpsc::UnboundedReceiver<Request>) {
		while let Some(request) = requests.blocking_recv() {
			let ok = match request {
				Request::Decode { run, sample } => self.decode(run, sample),
				Request::Flush => self.flush(),
			};

			if !ok {
				// Nobody is listening any longer.
				break;
			}
		}

		tracing::trace!("decode worker exited");
	}

	fn decode(&mut self, run: u64, sample: Sample) -> bool {
		let index = sample.index;

		if let Some(poison) = &self.poisoned {
			if poison.run == run && !sample.sync && index != 0 {
				tracing::trace!(index, cause = poison.cause, "skipping dependent sample");

				return self.send(Event::Skipped {
					run,
					index,
					cause: poison.cause,
					error: poison.error.clone(),
				});
			}

			self.poisoned = None;
		}

		match self.decoder.decode(&sample) {
			Ok(frames) => {
				for frame in frames {
					for frame in self.reorder.push(frame) {
						if !self.send(Event::Frame(frame)) {
							return false;
						}
					}
				}

				self.send(Event::Consumed { run, index })
			}
			Err(error) => {
				tracing::warn!(index, %error, "decode failed");

				self.poisoned = Some(Poison {
					run,
					cause: index,
					error: error.clone(),
				});

				self.send(Event::Failed { run, index, error })
			}
		}
	}

	fn flush(&mut self) -> bool {
		let result = match self.decoder.flush() {
			Ok(frames) => {
				for frame in frames {
					for frame in self.reorder.push(frame) {
						if !self.send(Event::Frame(frame)) {
							return false;
						}
					}
				}

				Ok(())
			}
			Err(error) => {
				tracing::warn!(%error, "flush failed");
				Err(error)
			}
		};

		for frame in self.reorder.drain() {
			if !self.send(Event::Frame(frame)) {
				return false;
			}
		}

		// The decoder starts from scratch, so nothing depends on an earlier failure.
		self.poisoned = None;

		self.send(Event::Flushed(result))
	}

	fn send(&self, event: Event) -> bool {
		self.events.send(event).is_ok()
	}
}

/// Holds up to `depth` frames and releases them in timestamp order.
///
/// A depth of zero forwards frames as they arrive.
struct Reorder {
	depth: usize,
	held: BTreeMap<(Timestamp, u64), RawFrame>,

	// Breaks ties between identical timestamps.
	sequence: u64,
	released: Option<Timestamp>,
}

impl Reorder {
	fn new(depth: usize) -> Self {
		Self {
			depth,
			held: BTreeMap::new(),
			sequence: 0,
			released: None,
		}
	}

	fn push(&mut self, frame: RawFrame) -> Vec<RawFrame> {
		if self.depth == 0 {
			return vec![frame];
		}

		self.held.insert((frame.timestamp, self.sequence), frame);
		self.sequence += 1;

		let mut ready = Vec::new();
		while self.held.len() > self.depth {
			if let Some(frame) = self.pop() {
				ready.push(frame);
			}
		}

		ready
	}

	fn drain(&mut self) -> Vec<RawFrame> {
		let mut ready = Vec::with_capacity(self.held.len());
		while let Some(frame) = self.pop() {
			ready.push(frame);
		}

		self.released = None;
		ready
	}

	fn pop(&mut self) -> Option<RawFrame> {
		let (_, frame) = self.held.pop_first()?;

		if self.released.is_some_and(|released| frame.timestamp < released) {
			tracing::debug!(timestamp = %frame.timestamp, "frame released out of order, increase the reorder depth");
		}

		self.released = Some(frame.timestamp);
		Some(frame)
	}
}
