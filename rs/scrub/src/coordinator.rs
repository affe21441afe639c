//! The task that owns all decode state.
//!
//! Every request from an [crate::Engine] handle and every event from the decode worker is
//! processed here, one at a time. Because only this task submits samples, and it enqueues an
//! entire dependency chain before looking at the next request, submissions can never interleave.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::binder::{Binder, Event};
use crate::decode::DecodeError;
use crate::metadata::SampleTable;
use crate::store::FrameStore;
use crate::{DecodedFrame, SeekError, Stats};

pub(crate) type Reply<T> = oneshot::Sender<Result<T, SeekError>>;

pub(crate) enum Command {
	/// Resolve with the frame at `target`, which has already been validated.
	Seek { target: u64, reply: Reply<DecodedFrame> },

	/// Decode every sample once.
	Preload { reply: Reply<()> },

	Flush { reply: Reply<()> },

	Stats { reply: oneshot::Sender<Stats> },
}

// The single outstanding seek.
struct Pending {
	generation: u64,
	target: u64,

	// The dependency chain is start..=target, decoded as part of `run`.
	start: u64,
	run: u64,

	reply: Reply<DecodedFrame>,

	// Set once the decoder consumed the target sample.
	reached: bool,
}

// The decoder state after the samples submitted so far.
#[derive(Debug, Clone, Copy)]
struct Cursor {
	run: u64,

	// The sync sample the run started at.
	start: u64,

	// The next sample the decoder expects.
	next: u64,
}

enum Waiter {
	Pending { generation: u64 },
	Caller(Reply<()>),
}

pub(crate) struct Coordinator {
	table: SampleTable,
	store: FrameStore,
	binder: Binder,

	pending: Option<Pending>,
	cursor: Option<Cursor>,

	// The most recent sample consumed by the decoder.
	consumed: Option<(u64, u64)>,

	// The most recent sample submitted to the decoder.
	last: Option<(u64, u64)>,

	// One entry per flush sent to the binder, in order.
	flushes: VecDeque<Waiter>,

	generation: u64,
	runs: u64,
	submitted: u64,
}

impl Coordinator {
	pub fn new(table: SampleTable, store: FrameStore, binder: Binder) -> Self {
		Self {
			table,
			store,
			binder,
			pending: None,
			cursor: None,
			consumed: None,
			last: None,
			flushes: VecDeque::new(),
			generation: 0,
			runs: 0,
			submitted: 0,
		}
	}

	pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
		loop {
			tokio::select! {
				// Handle requests first so a newer seek supersedes an older one as soon as possible.
				biased;
				command = commands.recv() => match command {
					Some(command) => self.command(command),
					None => break,
				},
				event = self.binder.next() => match event {
					Some(event) => self.event(event),
					None => {
						tracing::error!("decode worker exited");
						break;
					}
				},
			}
		}

		self.close();
	}

	fn command(&mut self, command: Command) {
		match command {
			Command::Seek { target, reply } => self.seek(target, reply),
			Command::Preload { reply } => self.preload(reply),
			Command::Flush { reply } => self.flush(Waiter::Caller(reply)),
			Command::Stats { reply } => {
				let _ = reply.send(self.stats());
			}
		}
	}

	fn seek(&mut self, target: u64, reply: Reply<DecodedFrame>) {
		let generation = self.generation;
		self.generation += 1;

		if let Some(old) = self.pending.take() {
			tracing::debug!(generation = old.generation, target = old.target, "superseded");
			let _ = old.reply.send(Err(SeekError::Superseded));
		}

		if let Some(frame) = self.store.get(target) {
			tracing::trace!(generation, target, "cached");
			let _ = reply.send(Ok(frame));
			return;
		}

		let start = self.table.sync_before(target);

		match self.plan(start, target) {
			Ok(run) => {
				self.pending = Some(Pending {
					generation,
					target,
					start,
					run,
					reply,
					reached: false,
				})
			}
			Err(err) => {
				let _ = reply.send(Err(err));
			}
		}
	}

	// Submit whatever the decoder still needs to produce `target`, returning the run it belongs to.
	fn plan(&mut self, start: u64, target: u64) -> Result<u64, SeekError> {
		if let Some(cursor) = self.cursor {
			// The decoder already consumed the sync sample for this target, and everything after it.
			if cursor.start <= start && start < cursor.next {
				if target >= cursor.next {
					tracing::debug!(run = cursor.run, start = cursor.next, target, "continuing");
					self.submit(cursor.run, cursor.next, target)?;
					return Ok(cursor.run);
				}

				let consumed = matches!(self.consumed, Some((run, index)) if run == cursor.run && index >= target);
				if !consumed {
					tracing::debug!(run = cursor.run, target, "waiting for queued sample");
					return Ok(cursor.run);
				}

				// Consumed but not stored: it was evicted or is still buffered, so decode it again.
			}
		}

		let run = self.runs;
		self.runs += 1;

		tracing::debug!(run, start, target, "decoding from sync sample");
		self.submit(run, start, target)?;

		Ok(run)
	}

	fn submit(&mut self, run: u64, start: u64, end: u64) -> Result<(), SeekError> {
		for sample in self.table.range(start, end) {
			self.binder.submit(run, sample.clone())?;
			self.submitted += 1;
		}

		self.last = Some((run, end));

		let start = match self.cursor {
			Some(cursor) if cursor.run == run => cursor.start,
			_ => start,
		};

		self.cursor = Some(Cursor {
			run,
			start,
			next: end + 1,
		});

		Ok(())
	}

	fn preload(&mut self, reply: Reply<()>) {
		let run = self.runs;
		self.runs += 1;

		let end = self.table.len() - 1;
		tracing::debug!(run, frames = self.table.len(), "preloading");

		if let Err(err) = self.submit(run, 0, end) {
			let _ = reply.send(Err(err));
			return;
		}

		self.flush(Waiter::Caller(reply));
	}

	fn flush(&mut self, waiter: Waiter) {
		// The decoder is reset by a flush, so the next run must start at a sync sample.
		self.cursor = None;

		match self.binder.flush() {
			Ok(()) => self.flushes.push_back(waiter),
			Err(err) => match waiter {
				Waiter::Caller(reply) => {
					let _ = reply.send(Err(err));
				}
				Waiter::Pending { generation } => self.reject(generation, err),
			},
		}
	}

	fn event(&mut self, event: Event) {
		match event {
			Event::Frame(raw) => {
				let index = self.table.index_of(raw.timestamp);
				tracing::trace!(index, timestamp = %raw.timestamp, "decoded");

				let frame = self.store.put(DecodedFrame {
					index,
					timestamp: raw.timestamp,
					image: Arc::new(raw.image),
				});

				if let Some(pending) = self.pending.take_if(|pending| pending.target == index) {
					tracing::debug!(generation = pending.generation, index, "resolved");
					let _ = pending.reply.send(Ok(frame));
				}
			}
			Event::Consumed { run, index } => {
				self.consumed = Some((run, index));

				if let Some(pending) = self.pending.as_mut().filter(|pending| pending.run == run) {
					pending.reached |= index >= pending.target;
				}

				self.stalled(run, index);
			}
			Event::Failed { run, index, error } => self.failed(run, index, index, error),
			Event::Skipped {
				run,
				index,
				cause,
				error,
			} => self.failed(run, index, cause, error),
			Event::Flushed(result) => self.flushed(result),
		}
	}

	// Later samples push buffered frames out of the decoder, so only flush once the queue is empty.
	fn stalled(&mut self, run: u64, index: u64) {
		if self.last != Some((run, index)) || !self.flushes.is_empty() {
			return;
		}

		let generation = match &self.pending {
			Some(pending) if pending.reached && !self.store.has(pending.target) => pending.generation,
			_ => return,
		};

		tracing::debug!(generation, index, "target consumed without output, flushing");
		self.flush(Waiter::Pending { generation });
	}

	fn flushed(&mut self, result: Result<(), DecodeError>) {
		match self.flushes.pop_front() {
			Some(Waiter::Caller(reply)) => {
				let _ = reply.send(result.map_err(SeekError::Flush));
			}
			Some(Waiter::Pending { generation }) => {
				if let Err(error) = result {
					let index = self.pending.as_ref().map(|pending| pending.target).unwrap_or_default();
					self.reject(generation, SeekError::Decode { index, error });
				}
			}
			None => tracing::warn!("unexpected flush"),
		}

		// Everything consumed before the flush was released, so a missing target never will be.
		let store = &self.store;
		if let Some(pending) = self.pending.take_if(|pending| pending.reached && !store.has(pending.target)) {
			tracing::debug!(generation = pending.generation, target = pending.target, "missing output");

			let error = SeekError::Decode {
				index: pending.target,
				error: DecodeError::Missing,
			};
			let _ = pending.reply.send(Err(error));
		}
	}

	fn failed(&mut self, run: u64, index: u64, cause: u64, error: DecodeError) {
		// The decoder state no longer matches the run.
		if self.cursor.is_some_and(|cursor| cursor.run == run) {
			self.cursor = None;
		}

		let depends = |pending: &mut Pending| pending.run == run && pending.start <= index && index <= pending.target;

		if let Some(pending) = self.pending.take_if(depends) {
			tracing::debug!(generation = pending.generation, target = pending.target, cause, "rejected");
			let _ = pending.reply.send(Err(SeekError::Decode { index: cause, error }));
		}

		self.stalled(run, index);
	}

	fn reject(&mut self, generation: u64, err: SeekError) {
		if let Some(pending) = self.pending.take_if(|pending| pending.generation == generation) {
			tracing::debug!(generation, target = pending.target, %err, "rejected");
			let _ = pending.reply.send(Err(err));
		}
	}

	fn stats(&self) -> Stats {
		Stats {
			frames: self.table.len(),
			cached: self.store.len(),
			hits: self.store.hits(),
			misses: self.store.misses(),
			evicted: self.store.evicted(),
			submitted: self.submitted,
		}
	}

	fn close(&mut self) {
		if let Some(pending) = self.pending.take() {
			let _ = pending.reply.send(Err(SeekError::Closed));
		}

		for waiter in self.flushes.drain(..) {
			if let Waiter::Caller(reply) = waiter {
				let _ = reply.send(Err(SeekError::Closed));
			}
		}
	}
}
