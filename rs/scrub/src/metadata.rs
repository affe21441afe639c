use std::collections::HashMap;

use bytes::Bytes;

use crate::{DecoderConfig, InitError, Sample, Timestamp};

/// The kind of media carried by a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
	Video,
	Audio,
	Other,
}

/// A track produced by a demuxer.
#[derive(Debug, Clone)]
pub struct Track {
	pub id: u32,
	pub kind: TrackKind,

	/// A WebCodecs style codec string, empty if unknown.
	pub codec: String,
	pub width: u32,
	pub height: u32,

	/// The number of units per second used by `duration`.
	pub timescale: u32,
	pub duration: u64,

	pub description: Option<Bytes>,
	pub samples: Vec<Sample>,
}

/// Properties of the video stream, derived once when the engine starts.
#[derive(Debug, Clone)]
pub struct StreamMetadata {
	pub fps: f64,

	/// The total number of frames, which is also the number of samples.
	pub frames: u64,

	/// The number of sync samples.
	pub keyframes: u64,

	/// The end of the last sample.
	pub duration: Timestamp,

	pub config: DecoderConfig,
}

impl StreamMetadata {
	/// Validate the inputs given to the engine.
	pub fn new(samples: &[Sample], config: DecoderConfig, fps: f64) -> Result<Self, InitError> {
		let last = samples.last().ok_or(InitError::EmptyTrack)?;

		if !fps.is_finite() || fps <= 0.0 {
			return Err(InitError::InvalidFrameRate(fps));
		}

		Ok(Self {
			fps,
			frames: samples.len() as u64,
			keyframes: samples.iter().filter(|sample| sample.sync).count() as u64,
			duration: last.timestamp.checked_add(last.duration).unwrap_or(Timestamp::MAX),
			config,
		})
	}

	/// Select the first video track and compute its frame rate.
	///
	/// Returns the metadata and the samples of the selected track.
	pub fn derive(tracks: Vec<Track>) -> Result<(Self, Vec<Sample>), InitError> {
		let track = tracks
			.into_iter()
			.find(|track| track.kind == TrackKind::Video)
			.ok_or(InitError::NoVideoTrack)?;

		let seconds = match (track.duration, track.timescale) {
			(0, _) | (_, 0) => {
				// Some muxers leave the track duration empty; fall back to the sample table.
				let end = track.samples.last().and_then(|sample| sample.timestamp.checked_add(sample.duration));
				end.unwrap_or_default().as_secs_f64()
			}
			(duration, timescale) => duration as f64 / timescale as f64,
		};

		let fps = track.samples.len() as f64 / seconds;
		tracing::debug!(track = track.id, codec = %track.codec, samples = track.samples.len(), seconds, fps, "selected video track");

		let config = DecoderConfig {
			codec: track.codec,
			coded_width: track.width,
			coded_height: track.height,
			description: track.description,
		};

		let metadata = Self::new(&track.samples, config, fps)?;
		Ok((metadata, track.samples))
	}
}

/// Maps presentation time to frame indices.
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
	fps: f64,
}

impl FrameClock {
	// Products within this many frames of an integer are treated as that integer.
	const SNAP: f64 = 1e-6;

	pub fn new(fps: f64) -> Self {
		Self { fps }
	}

	/// Returns `ceil(seconds * fps)`, clamped to zero.
	///
	/// Returns None for NaN; positive infinity saturates.
	pub fn index(&self, seconds: f64) -> Option<u64> {
		if seconds.is_nan() {
			return None;
		}

		let position = seconds * self.fps;
		if position <= 0.0 {
			return Some(0);
		}

		let nearest = position.round();
		let frame = match (position - nearest).abs() < Self::SNAP {
			true => nearest,
			false => position.ceil(),
		};

		// Float to int casts saturate.
		Some(frame as u64)
	}
}

/// The sample list along with the lookups the coordinator needs.
pub(crate) struct SampleTable {
	samples: Vec<Sample>,

	// Indices of sync samples, ascending.
	sync: Vec<u64>,

	by_timestamp: HashMap<Timestamp, u64>,
	clock: FrameClock,
}

impl SampleTable {
	pub fn new(samples: Vec<Sample>, clock: FrameClock) -> Result<Self, InitError> {
		let mut by_timestamp = HashMap::with_capacity(samples.len());

		for (position, sample) in samples.iter().enumerate() {
			if sample.index != position as u64 {
				return Err(InitError::OutOfOrder(sample.index));
			}

			by_timestamp.entry(sample.timestamp).or_insert(sample.index);
		}

		let sync = samples.iter().filter(|sample| sample.sync).map(|sample| sample.index).collect();

		Ok(Self {
			samples,
			sync,
			by_timestamp,
			clock,
		})
	}

	pub fn len(&self) -> u64 {
		self.samples.len() as u64
	}

	/// The samples from `start` through `end` inclusive.
	pub fn range(&self, start: u64, end: u64) -> &[Sample] {
		let end = (end as usize).min(self.samples.len().saturating_sub(1));
		self.samples.get(start as usize..=end).unwrap_or_default()
	}

	/// The nearest sync sample at or before `index`.
	///
	/// Index zero is always a valid starting point, even without the sync flag.
	pub fn sync_before(&self, index: u64) -> u64 {
		match self.sync.partition_point(|&sync| sync <= index) {
			0 => 0,
			position => self.sync[position - 1],
		}
	}

	/// The frame index for a decoded timestamp.
	///
	/// Timestamps of known samples map to the sample index, anything else uses the frame clock.
	pub fn index_of(&self, timestamp: Timestamp) -> u64 {
		match self.by_timestamp.get(&timestamp) {
			Some(index) => *index,
			None => self.clock.index(timestamp.as_secs_f64()).unwrap_or_default(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::fixture::{config, samples};

	fn track(kind: TrackKind, count: u64) -> Track {
		Track {
			id: 1,
			kind,
			codec: "avc1.64001f".to_string(),
			width: 1280,
			height: 720,
			timescale: 90_000,
			duration: count * 3000,
			description: None,
			samples: samples(count, 30),
		}
	}

	#[test]
	fn test_derive_fps() {
		let audio = track(TrackKind::Audio, 10);
		let (metadata, samples) = StreamMetadata::derive(vec![audio, track(TrackKind::Video, 90)]).unwrap();
		assert_eq!(metadata.fps, 30.0);
		assert_eq!(metadata.frames, 90);
		assert_eq!(metadata.keyframes, 3);
		assert_eq!(metadata.config.coded_width, 1280);
		assert_eq!(samples.len(), 90);
	}

	#[test]
	fn test_derive_missing_duration() {
		let video = Track {
			duration: 0,
			..track(TrackKind::Video, 60)
		};

		let (metadata, _) = StreamMetadata::derive(vec![video]).unwrap();
		assert!((metadata.fps - 30.0).abs() < 0.01, "{}", metadata.fps);
	}

	#[test]
	fn test_derive_no_video() {
		let err = StreamMetadata::derive(vec![track(TrackKind::Audio, 10)]).unwrap_err();
		assert!(matches!(err, InitError::NoVideoTrack));

		let err = StreamMetadata::derive(vec![track(TrackKind::Video, 0)]).unwrap_err();
		assert!(matches!(err, InitError::EmptyTrack));
	}

	#[test]
	fn test_invalid_fps() {
		assert!(matches!(
			StreamMetadata::new(&samples(1, 1), config(), 0.0),
			Err(InitError::InvalidFrameRate(_))
		));
		assert!(matches!(
			StreamMetadata::new(&samples(1, 1), config(), f64::NAN),
			Err(InitError::InvalidFrameRate(_))
		));
	}

	#[test]
	fn test_clock() {
		let clock = FrameClock::new(30.0);
		assert_eq!(clock.index(1.5), Some(45));
		assert_eq!(clock.index(0.0), Some(0));
		assert_eq!(clock.index(-2.0), Some(0));
		assert_eq!(clock.index(0.01), Some(1));
		assert_eq!(clock.index(f64::NAN), None);
		assert_eq!(clock.index(f64::INFINITY), Some(u64::MAX));

		// 7 / 30 * 30 is not exactly 7 in floating point.
		for frame in 0..1000 {
			assert_eq!(clock.index(frame as f64 / 30.0), Some(frame));
		}

		let ntsc = FrameClock::new(30_000.0 / 1001.0);
		for frame in 0..1000u64 {
			assert_eq!(ntsc.index(frame as f64 * 1001.0 / 30_000.0), Some(frame));
		}
	}

	#[test]
	fn test_sync_before() {
		let table = SampleTable::new(samples(90, 30), FrameClock::new(30.0)).unwrap();
		assert_eq!(table.sync_before(0), 0);
		assert_eq!(table.sync_before(29), 0);
		assert_eq!(table.sync_before(30), 30);
		assert_eq!(table.sync_before(45), 30);
		assert_eq!(table.sync_before(89), 60);
	}

	#[test]
	fn test_sync_before_without_first_keyframe() {
		let mut samples = samples(40, 30);
		samples[0].sync = false;

		let table = SampleTable::new(samples, FrameClock::new(30.0)).unwrap();
		assert_eq!(table.sync_before(10), 0);
		assert_eq!(table.sync_before(35), 30);
	}

	#[test]
	fn test_index_of() {
		let table = SampleTable::new(samples(90, 30), FrameClock::new(30.0)).unwrap();
		for sample in table.range(0, 89) {
			assert_eq!(table.index_of(sample.timestamp), sample.index);
		}

		// Unknown timestamps fall back to the clock.
		assert_eq!(table.index_of(Timestamp::from_micros(1_001_000)), 31);
		assert_eq!(table.range(88, 200).len(), 2);
	}

	#[test]
	fn test_out_of_order() {
		let mut samples = samples(3, 30);
		samples.swap(1, 2);

		assert!(matches!(
			SampleTable::new(samples, FrameClock::new(30.0)),
			Err(InitError::OutOfOrder(2))
		));
	}
}
