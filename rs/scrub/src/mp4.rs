//! A demuxer for progressive (non-fragmented) MP4 files.
//!
//! The whole file must be in memory; samples are sliced out of it without copying.

use bytes::{Bytes, BytesMut};
use mp4_atom::{Any, Atom, DecodeMaybe, Moov, Trak};

use crate::{Sample, Timestamp, Track, TrackKind};

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum DemuxError {
	#[error("mp4 error: {0}")]
	Mp4(#[from] mp4_atom::Error),

	#[error("missing moov box")]
	MissingMoov,

	#[error("invalid track {track}: {reason}")]
	InvalidTrack { track: u32, reason: String },
}

/// Parse every track in the file, including its samples.
pub fn demux(data: &Bytes) -> Result<Vec<Track>, DemuxError> {
	let mut cursor = std::io::Cursor::new(data.as_ref());
	let mut moov = None;

	while let Some(atom) = Any::decode_maybe(&mut cursor)? {
		match atom {
			Any::Moov(atom) => moov = Some(atom),
			Any::Mdat(_) => {}
			Any::Moof(_) => tracing::warn!("fragmented mp4 is not supported, ignoring moof"),
			_ => tracing::trace!("skipping atom"),
		}
	}

	let moov: Moov = moov.ok_or(DemuxError::MissingMoov)?;
	tracks(&moov.trak, data)
}

fn tracks(traks: &[Trak], data: &Bytes) -> Result<Vec<Track>, DemuxError> {
	let mut tracks = Vec::with_capacity(traks.len());
	for trak in traks {
		match track(trak, data) {
			Ok(track) => tracks.push(track),
			// Only video tracks must parse.
			Err(err) if kind(trak) != TrackKind::Video => {
				tracing::warn!(track = trak.tkhd.track_id, %err, "skipping invalid track")
			}
			Err(err) => return Err(err),
		}
	}

	Ok(tracks)
}

fn kind(trak: &Trak) -> TrackKind {
	let handler = &trak.mdia.hdlr.handler;
	if *handler == b"vide".into() {
		TrackKind::Video
	} else if *handler == b"soun".into() {
		TrackKind::Audio
	} else {
		TrackKind::Other
	}
}

fn track(trak: &Trak, data: &Bytes) -> Result<Track, DemuxError> {
	let id = trak.tkhd.track_id;
	let invalid = |reason: &str| DemuxError::InvalidTrack {
		track: id,
		reason: reason.to_string(),
	};

	let kind = kind(trak);
	let mdhd = &trak.mdia.mdhd;
	let stbl = &trak.mdia.minf.stbl;

	let codec = match stbl.stsd.codecs.first() {
		Some(codec) => video_codec(codec)?,
		None => return Err(invalid("missing codec")),
	};

	let layout = Layout {
		decode: stbl
			.stts
			.entries
			.iter()
			.map(|entry| (entry.sample_count, entry.sample_delta))
			.collect(),
		composition: stbl
			.ctts
			.iter()
			.flat_map(|ctts| ctts.entries.iter())
			.map(|entry| (entry.sample_count, entry.sample_offset as i64))
			.collect(),
		sync: stbl.stss.as_ref().map(|stss| stss.entries.clone()),
		chunks: stbl
			.stsc
			.entries
			.iter()
			.map(|entry| (entry.first_chunk, entry.samples_per_chunk))
			.collect(),
		sizes: match &stbl.stsz.samples {
			mp4_atom::StszSamples::Identical { count, size } => vec![*size; *count as usize],
			mp4_atom::StszSamples::Different { sizes } => sizes.clone(),
		},
		offsets: match (&stbl.co64, &stbl.stco) {
			(Some(co64), _) => co64.entries.clone(),
			(None, Some(stco)) => stco.entries.iter().map(|offset| *offset as u64).collect(),
			(None, None) => return Err(invalid("missing chunk offsets")),
		},
	};

	let samples = layout.samples(mdhd.timescale as u64, data).map_err(|reason| invalid(&reason))?;

	let (codec, width, height, description) = match (kind, codec) {
		(TrackKind::Video, Some(codec)) => (codec.codec, codec.width, codec.height, codec.description),
		(TrackKind::Video, None) => return Err(invalid("unsupported video codec")),
		_ => (String::new(), 0, 0, None),
	};

	tracing::debug!(track = id, ?kind, %codec, samples = samples.len(), "parsed track");

	Ok(Track {
		id,
		kind,
		codec,
		width,
		height,
		timescale: mdhd.timescale,
		duration: mdhd.duration,
		description,
		samples,
	})
}

struct VideoCodec {
	codec: String,
	width: u32,
	height: u32,
	description: Option<Bytes>,
}

// Returns None for anything that isn't a supported video codec.
fn video_codec(codec: &mp4_atom::Codec) -> Result<Option<VideoCodec>, DemuxError> {
	let codec = match codec {
		mp4_atom::Codec::Avc1(avc1) => {
			let avcc = &avc1.avcc;

			let mut description = BytesMut::new();
			avcc.encode_body(&mut description)?;

			VideoCodec {
				codec: format!(
					"avc1.{:02x}{:02x}{:02x}",
					avcc.avc_profile_indication, avcc.profile_compatibility, avcc.avc_level_indication
				),
				width: avc1.visual.width as _,
				height: avc1.visual.height as _,
				description: Some(description.freeze()),
			}
		}
		mp4_atom::Codec::Hev1(hev1) => h265("hev1", &hev1.hvcc, &hev1.visual)?,
		mp4_atom::Codec::Hvc1(hvc1) => h265("hvc1", &hvc1.hvcc, &hvc1.visual)?,
		mp4_atom::Codec::Vp08(vp08) => VideoCodec {
			codec: "vp8".to_string(),
			width: vp08.visual.width as _,
			height: vp08.visual.height as _,
			description: None,
		},
		mp4_atom::Codec::Vp09(vp09) => {
			let vpcc = &vp09.vpcc;

			VideoCodec {
				codec: format!("vp09.{:02}.{:02}.{:02}", vpcc.profile, vpcc.level, vpcc.bit_depth),
				width: vp09.visual.width as _,
				height: vp09.visual.height as _,
				description: None,
			}
		}
		mp4_atom::Codec::Av01(av01) => {
			let av1c = &av01.av1c;
			let tier = if av1c.seq_tier_0 { 'H' } else { 'M' };
			let bitdepth = match (av1c.high_bitdepth, av1c.twelve_bit) {
				(true, true) => 12,
				(true, false) => 10,
				(false, _) => 8,
			};

			VideoCodec {
				codec: format!("av01.{}.{:02}{}.{:02}", av1c.seq_profile, av1c.seq_level_idx_0, tier, bitdepth),
				width: av01.visual.width as _,
				height: av01.visual.height as _,
				description: None,
			}
		}
		_ => return Ok(None),
	};

	Ok(Some(codec))
}

// There's two almost identical hvcc atoms in the wild.
fn h265(prefix: &str, hvcc: &mp4_atom::Hvcc, visual: &mp4_atom::Visual) -> Result<VideoCodec, DemuxError> {
	let mut description = BytesMut::new();
	hvcc.encode_body(&mut description)?;

	Ok(VideoCodec {
		codec: format!("{}.{}.L{}", prefix, hvcc.general_profile_idc, hvcc.general_level_idc),
		width: visual.width as _,
		height: visual.height as _,
		description: Some(description.freeze()),
	})
}

/// The sample table of a track, decoupled from the atom types.
#[derive(Debug, Default)]
struct Layout {
	// stts: (sample count, delta)
	decode: Vec<(u32, u32)>,

	// ctts: (sample count, offset)
	composition: Vec<(u32, i64)>,

	// stss: one-based sample numbers; every sample is sync when absent.
	sync: Option<Vec<u32>>,

	// stsc: (one-based first chunk, samples per chunk)
	chunks: Vec<(u32, u32)>,

	// stsz
	sizes: Vec<u32>,

	// stco or co64
	offsets: Vec<u64>,
}

impl Layout {
	fn samples(&self, timescale: u64, data: &Bytes) -> Result<Vec<Sample>, String> {
		if timescale == 0 {
			return Err("zero timescale".to_string());
		}

		let count = self.sizes.len();

		let mut times = Vec::with_capacity(count);
		let mut dts = 0u64;
		for &(run, delta) in &self.decode {
			for _ in 0..run {
				times.push((dts, delta as u64));
				dts += delta as u64;
			}
		}

		if times.len() < count {
			return Err(format!("time table covers {} of {} samples", times.len(), count));
		}

		let mut composition = self.composition.iter().flat_map(|&(run, offset)| (0..run).map(move |_| offset));

		let mut sync = vec![self.sync.is_none(); count];
		for &number in self.sync.iter().flatten() {
			match (number as usize).checked_sub(1).and_then(|index| sync.get_mut(index)) {
				Some(flag) => *flag = true,
				None => return Err(format!("sync sample {number} out of range")),
			}
		}

		let positions = self.positions(count)?;

		let mut samples = Vec::with_capacity(count);
		for index in 0..count {
			let (dts, duration) = times[index];
			let offset = composition.next().unwrap_or(0);
			let pts = (dts as i64).saturating_add(offset).max(0) as u64;

			let start = positions[index] as usize;
			let end = start + self.sizes[index] as usize;
			if end > data.len() {
				return Err(format!("sample {index} exceeds the file"));
			}

			samples.push(Sample {
				index: index as u64,
				timestamp: Timestamp::from_scale(pts, timescale).map_err(|err| err.to_string())?,
				duration: Timestamp::from_scale(duration, timescale).map_err(|err| err.to_string())?,
				sync: sync[index],
				payload: data.slice(start..end),
			});
		}

		Ok(samples)
	}

	// The file offset of each sample, resolved through the chunk tables.
	fn positions(&self, count: usize) -> Result<Vec<u64>, String> {
		let mut positions = Vec::with_capacity(count);

		for (i, &(first, per_chunk)) in self.chunks.iter().enumerate() {
			let last = match self.chunks.get(i + 1) {
				Some(&(next, _)) => next,
				None => self.offsets.len() as u32 + 1,
			};

			for chunk in first..last {
				let mut offset = chunk
					.checked_sub(1)
					.and_then(|chunk| self.offsets.get(chunk as usize))
					.copied()
					.ok_or_else(|| format!("chunk {chunk} out of range"))?;

				for _ in 0..per_chunk {
					if positions.len() == count {
						return Ok(positions);
					}

					positions.push(offset);
					offset += self.sizes[positions.len() - 1] as u64;
				}
			}
		}

		if positions.len() < count {
			return Err(format!("chunk table covers {} of {} samples", positions.len(), count));
		}

		Ok(positions)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	// Three samples of sizes 2, 3, 4 in two chunks, at 10 units per frame.
	fn layout() -> Layout {
		Layout {
			decode: vec![(3, 10)],
			composition: Vec::new(),
			sync: Some(vec![1]),
			chunks: vec![(1, 2), (2, 1)],
			sizes: vec![2, 3, 4],
			offsets: vec![4, 20],
		}
	}

	fn data() -> Bytes {
		Bytes::from((0..32u8).collect::<Vec<_>>())
	}

	#[test]
	fn test_layout() {
		let samples = layout().samples(30, &data()).unwrap();
		assert_eq!(samples.len(), 3);

		assert_eq!(samples[0].payload.as_ref(), &[4, 5]);
		assert_eq!(samples[1].payload.as_ref(), &[6, 7, 8]);
		assert_eq!(samples[2].payload.as_ref(), &[20, 21, 22, 23]);

		assert!(samples[0].sync);
		assert!(!samples[1].sync);
		assert_eq!(samples[1].timestamp.as_micros(), 333_333);
		assert_eq!(samples[2].duration.as_micros(), 333_333);
	}

	#[test]
	fn test_layout_composition() {
		let layout = Layout {
			composition: vec![(1, 20), (2, -10)],
			..layout()
		};

		let samples = layout.samples(10, &data()).unwrap();
		let timestamps: Vec<_> = samples.iter().map(|s| s.timestamp.as_micros() / 1_000_000).collect();
		assert_eq!(timestamps, vec![2, 0, 1]);
	}

	#[test]
	fn test_layout_all_sync() {
		let layout = Layout { sync: None, ..layout() };
		let samples = layout.samples(30, &data()).unwrap();
		assert!(samples.iter().all(|sample| sample.sync));
	}

	#[test]
	fn test_layout_invalid() {
		let short = Bytes::from_static(&[0; 16]);
		assert!(layout().samples(30, &short).is_err());

		let missing = Layout {
			offsets: vec![4],
			..layout()
		};
		assert!(missing.samples(30, &data()).is_err());

		let bad_sync = Layout {
			sync: Some(vec![0]),
			..layout()
		};
		assert!(bad_sync.samples(30, &data()).is_err());

		assert!(layout().samples(0, &data()).is_err());
	}

	// An AV1 video track with the same sample table as [layout].
	fn video() -> Trak {
		let mut trak = Trak::default();
		trak.tkhd.track_id = 1;
		trak.mdia.hdlr.handler = b"vide".into();
		trak.mdia.mdhd.timescale = 30;
		trak.mdia.mdhd.duration = 30;

		let stbl = &mut trak.mdia.minf.stbl;
		stbl.stsd.codecs.push(mp4_atom::Codec::Av01(mp4_atom::Av01 {
			visual: mp4_atom::Visual {
				width: 2,
				height: 1,
				..Default::default()
			},
			av1c: mp4_atom::Av1c {
				seq_level_idx_0: 8,
				seq_tier_0: true,
				high_bitdepth: true,
				..Default::default()
			},
			..Default::default()
		}));
		stbl.stts.entries.push(mp4_atom::SttsEntry {
			sample_count: 3,
			sample_delta: 10,
		});
		stbl.stss = Some(mp4_atom::Stss { entries: vec![1] });
		stbl.stsc.entries = vec![
			mp4_atom::StscEntry {
				first_chunk: 1,
				samples_per_chunk: 2,
				sample_description_index: 1,
			},
			mp4_atom::StscEntry {
				first_chunk: 2,
				samples_per_chunk: 1,
				sample_description_index: 1,
			},
		];
		stbl.stsz.samples = mp4_atom::StszSamples::Different { sizes: vec![2, 3, 4] };
		stbl.stco = Some(mp4_atom::Stco { entries: vec![4, 20] });

		trak
	}

	#[test]
	fn test_tracks() {
		let parsed = tracks(&[video()], &data()).unwrap();
		assert_eq!(parsed.len(), 1);

		let track = &parsed[0];
		assert_eq!(track.kind, TrackKind::Video);
		assert_eq!((track.width, track.height), (2, 1));
		assert_eq!(track.samples.len(), 3);

		// The high tier flag is unrelated to the bit depth.
		assert_eq!(track.codec, "av01.0.08H.10");
	}

	#[test]
	fn test_tracks_twelve_bit() {
		let mut trak = video();
		if let Some(mp4_atom::Codec::Av01(av01)) = trak.mdia.minf.stbl.stsd.codecs.first_mut() {
			av01.av1c.seq_tier_0 = false;
			av01.av1c.twelve_bit = true;
		}

		let parsed = tracks(&[trak], &data()).unwrap();
		assert_eq!(parsed[0].codec, "av01.0.08M.12");
	}

	#[test]
	fn test_tracks_skip_invalid_audio() {
		let mut audio = Trak::default();
		audio.tkhd.track_id = 2;
		audio.mdia.hdlr.handler = b"soun".into();

		let parsed = tracks(&[audio.clone(), video()], &data()).unwrap();
		assert_eq!(parsed.len(), 1);
		assert_eq!(parsed[0].id, 1);

		// A broken video track is still an error.
		let mut broken = video();
		broken.mdia.minf.stbl.stco = None;

		let err = tracks(&[audio, broken], &data()).unwrap_err();
		assert!(matches!(err, DemuxError::InvalidTrack { track: 1, .. }), "{err:?}");
	}
}
