use bytes::Bytes;

use crate::Timestamp;

/// One compressed access unit, as produced by a demuxer.
///
/// Samples are ordered by `index`, which is also the decode dependency order.
#[derive(Clone, PartialEq, Eq)]
pub struct Sample {
	/// The position of this sample in the track, starting at zero.
	pub index: u64,

	/// The presentation timestamp.
	pub timestamp: Timestamp,

	/// How long the sample is displayed.
	pub duration: Timestamp,

	/// True if the sample can be decoded without any earlier samples.
	pub sync: bool,

	/// The encoded elementary stream data.
	pub payload: Bytes,
}

impl std::fmt::Debug for Sample {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Sample")
			.field("index", &self.index)
			.field("timestamp", &self.timestamp)
			.field("duration", &self.duration)
			.field("sync", &self.sync)
			.field("size", &self.payload.len())
			.finish()
	}
}

/// The configuration needed to initialize a decoder, derived once per stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecoderConfig {
	/// A WebCodecs style codec string, ex. `avc1.64001f`.
	pub codec: String,

	pub coded_width: u32,
	pub coded_height: u32,

	/// Out-of-band codec data, ex. the body of an avcC or hvcC box.
	pub description: Option<Bytes>,
}
