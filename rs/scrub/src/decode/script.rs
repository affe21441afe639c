//! A scripted decoder for tests.
//!
//! Each sample decodes to a tiny image containing its index, so tests can tell frames apart.
//! It also checks that samples arrive in a decodable order and records what it was fed.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use super::{DecodeError, Decoder};
use crate::{DecoderConfig, Image, PixelFormat, Plane, RawFrame, Sample};

#[derive(Default)]
struct State {
	submitted: Vec<u64>,
	broken: Vec<u64>,
	flushes: usize,
}

/// A handle to inspect what the decoder did, after it moved to the worker.
#[derive(Clone, Default)]
pub struct ScriptLog {
	state: Arc<Mutex<State>>,
}

impl ScriptLog {
	pub fn submitted(&self) -> Vec<u64> {
		self.state.lock().unwrap().submitted.clone()
	}

	/// Return the submitted indices since the last call.
	pub fn take(&self) -> Vec<u64> {
		std::mem::take(&mut self.state.lock().unwrap().submitted)
	}

	/// Samples that were decoded without their references.
	pub fn broken(&self) -> Vec<u64> {
		self.state.lock().unwrap().broken.clone()
	}

	pub fn flushes(&self) -> usize {
		self.state.lock().unwrap().flushes
	}
}

pub struct Script {
	log: ScriptLog,
	fail: HashSet<u64>,
	unsupported: bool,

	// Samples that decode without producing a frame.
	lose: HashSet<u64>,
	fail_flush: bool,

	// Emulates codec delay by holding this many frames.
	delay: usize,
	held: VecDeque<RawFrame>,

	// Emits frames in swapped pairs, out of presentation order.
	swap: bool,
	swapped: Option<RawFrame>,

	// The last decoded index, if the next sample may depend on it.
	reference: Option<u64>,
}

impl Script {
	pub fn new() -> (Self, ScriptLog) {
		let log = ScriptLog::default();
		let script = Self {
			log: log.clone(),
			fail: HashSet::new(),
			unsupported: false,
			lose: HashSet::new(),
			fail_flush: false,
			delay: 0,
			held: VecDeque::new(),
			swap: false,
			swapped: None,
			reference: None,
		};

		(script, log)
	}

	pub fn fail(mut self, index: u64) -> Self {
		self.fail.insert(index);
		self
	}

	pub fn unsupported(mut self) -> Self {
		self.unsupported = true;
		self
	}

	pub fn lose(mut self, index: u64) -> Self {
		self.lose.insert(index);
		self
	}

	pub fn fail_flush(mut self) -> Self {
		self.fail_flush = true;
		self
	}

	pub fn delay(mut self, frames: usize) -> Self {
		self.delay = frames;
		self
	}

	pub fn swap(mut self) -> Self {
		self.swap = true;
		self
	}

	pub fn image(index: u64) -> Image {
		Image {
			format: PixelFormat::Rgba,
			width: 2,
			height: 1,
			planes: vec![Plane {
				data: Bytes::copy_from_slice(&index.to_le_bytes()),
				stride: 8,
			}],
		}
	}
}

impl Decoder for Script {
	fn configure(&mut self, config: &DecoderConfig) -> Result<(), DecodeError> {
		if self.unsupported {
			return Err(DecodeError::Unsupported(config.codec.clone()));
		}

		Ok(())
	}

	fn decode(&mut self, sample: &Sample) -> Result<Vec<RawFrame>, DecodeError> {
		let mut state = self.log.state.lock().unwrap();
		state.submitted.push(sample.index);

		if self.fail.contains(&sample.index) {
			self.reference = None;
			return Err(DecodeError::Decode(format!("scripted failure at {}", sample.index)));
		}

		let independent = sample.sync || sample.index == 0;
		if !independent && self.reference != sample.index.checked_sub(1) {
			state.broken.push(sample.index);
		}
		self.reference = Some(sample.index);

		if self.lose.contains(&sample.index) {
			return Ok(Vec::new());
		}

		let frame = RawFrame {
			timestamp: sample.timestamp,
			image: Self::image(sample.index),
		};

		let mut output = Vec::new();
		if self.swap {
			match self.swapped.take() {
				Some(previous) => output.extend([frame, previous]),
				None => self.swapped = Some(frame),
			}
		} else {
			output.push(frame);
		}

		self.held.extend(output);

		let mut ready = Vec::new();
		while self.held.len() > self.delay {
			ready.extend(self.held.pop_front());
		}

		Ok(ready)
	}

	fn flush(&mut self) -> Result<Vec<RawFrame>, DecodeError> {
		self.log.state.lock().unwrap().flushes += 1;
		self.reference = None;

		if self.fail_flush {
			self.held.clear();
			self.swapped = None;
			return Err(DecodeError::Decode("scripted flush failure".to_string()));
		}

		let mut ready: Vec<_> = self.held.drain(..).collect();
		ready.extend(self.swapped.take());

		Ok(ready)
	}
}
