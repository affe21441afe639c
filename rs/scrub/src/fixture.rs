use bytes::Bytes;

use crate::{DecoderConfig, Sample, Timestamp};

pub fn config() -> DecoderConfig {
	DecoderConfig {
		codec: "avc1.64001f".to_string(),
		coded_width: 2,
		coded_height: 1,
		description: Some(Bytes::from_static(&[1, 0x64, 0, 0x1f])),
	}
}

/// Generate `count` samples at 30fps with a sync sample every `gop` samples.
pub fn samples(count: u64, gop: u64) -> Vec<Sample> {
	(0..count)
		.map(|index| Sample {
			index,
			timestamp: Timestamp::from_scale(index, 30).unwrap(),
			duration: Timestamp::from_scale(1, 30).unwrap(),
			sync: index % gop == 0,
			payload: Bytes::from(index.to_le_bytes().to_vec()),
		})
		.collect()
}
