//! Video decoding using FFmpeg.

use bytes::BytesMut;
use ffmpeg_next as ffmpeg;

use super::{DecodeError, Decoder};
use crate::{DecoderConfig, Image, PixelFormat, Plane, RawFrame, Sample, Timestamp};

// FFmpeg may read past the end of the extradata.
const PADDING: usize = 64;

type ScalerKey = (ffmpeg::format::Pixel, u32, u32);

/// Decodes H.264, H.265, VP8, VP9 and AV1 into RGBA images.
#[derive(Default)]
pub struct FfmpegDecoder {
	decoder: Option<ffmpeg::decoder::Video>,
	scaler: Option<(ScalerKey, ffmpeg::software::scaling::Context)>,
}

// SAFETY: the FFmpeg contexts are owned exclusively and only used from one thread at a time.
unsafe impl Send for FfmpegDecoder {}

impl FfmpegDecoder {
	pub fn new() -> Self {
		Self::default()
	}

	fn codec_id(codec: &str) -> Option<ffmpeg::codec::Id> {
		let prefix = codec.split('.').next().unwrap_or_default();

		match prefix {
			"avc1" | "avc3" => Some(ffmpeg::codec::Id::H264),
			"hev1" | "hvc1" => Some(ffmpeg::codec::Id::HEVC),
			"vp8" | "vp08" => Some(ffmpeg::codec::Id::VP8),
			"vp09" => Some(ffmpeg::codec::Id::VP9),
			"av01" => Some(ffmpeg::codec::Id::AV1),
			_ => None,
		}
	}

	fn receive(&mut self) -> Result<Vec<RawFrame>, DecodeError> {
		let decoder = self.decoder.as_mut().ok_or(DecodeError::Init("not configured".to_string()))?;

		let mut frames = Vec::new();
		let mut decoded = ffmpeg::frame::Video::empty();

		// Returns an error once the decoder needs more input.
		while decoder.receive_frame(&mut decoded).is_ok() {
			frames.push(Self::convert(&mut self.scaler, &decoded)?);
		}

		Ok(frames)
	}

	fn convert(
		scaler: &mut Option<(ScalerKey, ffmpeg::software::scaling::Context)>,
		decoded: &ffmpeg::frame::Video,
	) -> Result<RawFrame, DecodeError> {
		let (width, height) = (decoded.width(), decoded.height());
		let key = (decoded.format(), width, height);

		if scaler.as_ref().is_none_or(|(existing, _)| *existing != key) {
			let context = ffmpeg::software::scaling::Context::get(
				key.0,
				width,
				height,
				ffmpeg::format::Pixel::RGBA,
				width,
				height,
				ffmpeg::software::scaling::Flags::BILINEAR,
			)
			.map_err(|e| DecodeError::Unsupported(format!("pixel format {:?}: {}", key.0, e)))?;

			*scaler = Some((key, context));
		}

		let (_, context) = scaler
			.as_mut()
			.ok_or(DecodeError::Init("missing scaler".to_string()))?;

		let mut rgba = ffmpeg::frame::Video::empty();
		context
			.run(decoded, &mut rgba)
			.map_err(|e| DecodeError::Decode(format!("conversion failed: {}", e)))?;

		// Remove any row padding.
		let row = width as usize * 4;
		let stride = rgba.stride(0);
		let data = rgba.data(0);

		let mut packed = BytesMut::with_capacity(row * height as usize);
		for y in 0..height as usize {
			let start = y * stride;
			let line = data
				.get(start..start + row)
				.ok_or(DecodeError::InvalidData("short frame".to_string()))?;
			packed.extend_from_slice(line);
		}

		let pts = decoded.pts().or(decoded.timestamp()).unwrap_or_default();

		Ok(RawFrame {
			timestamp: Timestamp::from_micros(pts.max(0) as u64),
			image: Image {
				format: PixelFormat::Rgba,
				width,
				height,
				planes: vec![Plane {
					data: packed.freeze(),
					stride: row,
				}],
			},
		})
	}
}

impl Decoder for FfmpegDecoder {
	fn configure(&mut self, config: &DecoderConfig) -> Result<(), DecodeError> {
		// Initialize FFmpeg (idempotent)
		ffmpeg::init().map_err(|e| DecodeError::Init(e.to_string()))?;

		let id = Self::codec_id(&config.codec).ok_or_else(|| DecodeError::Unsupported(config.codec.clone()))?;
		let codec = ffmpeg::codec::decoder::find(id).ok_or_else(|| DecodeError::Unsupported(format!("{:?}", id)))?;

		let mut context = ffmpeg::codec::context::Context::new_with_codec(codec);

		// The extradata must be set before the decoder is opened.
		if let Some(description) = &config.description {
			unsafe {
				let context = context.as_mut_ptr();
				let extradata = ffmpeg::sys::av_mallocz(description.len() + PADDING) as *mut u8;
				if extradata.is_null() {
					return Err(DecodeError::Init("failed to allocate extradata".to_string()));
				}

				std::ptr::copy_nonoverlapping(description.as_ptr(), extradata, description.len());
				(*context).extradata = extradata;
				(*context).extradata_size = description.len() as i32;
			}
		}

		let decoder = context
			.decoder()
			.video()
			.map_err(|e| DecodeError::Unsupported(format!("{}: {}", config.codec, e)))?;

		tracing::debug!(codec = %config.codec, ?id, "configured ffmpeg decoder");

		self.decoder = Some(decoder);
		self.scaler = None;

		Ok(())
	}

	fn decode(&mut self, sample: &Sample) -> Result<Vec<RawFrame>, DecodeError> {
		let decoder = self.decoder.as_mut().ok_or(DecodeError::Init("not configured".to_string()))?;

		let mut packet = ffmpeg::codec::packet::Packet::copy(sample.payload.as_ref());
		packet.set_pts(Some(sample.timestamp.as_micros() as i64));
		if sample.sync {
			packet.set_flags(ffmpeg::codec::packet::Flags::KEY);
		}

		decoder
			.send_packet(&packet)
			.map_err(|e| DecodeError::Decode(format!("send_packet failed: {}", e)))?;

		self.receive()
	}

	fn flush(&mut self) -> Result<Vec<RawFrame>, DecodeError> {
		let decoder = self.decoder.as_mut().ok_or(DecodeError::Init("not configured".to_string()))?;

		decoder
			.send_eof()
			.map_err(|e| DecodeError::Decode(format!("flush failed: {}", e)))?;

		let frames = self.receive()?;

		// Accept new packets after draining.
		if let Some(decoder) = self.decoder.as_mut() {
			decoder.flush();
		}

		Ok(frames)
	}
}
