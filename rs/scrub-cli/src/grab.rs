use std::path::Path;

#[cfg(feature = "ffmpeg")]
pub async fn grab(
	source: &str,
	times: &[f64],
	output: &Path,
	preload: bool,
	config: scrub::EngineConfig,
) -> anyhow::Result<()> {
	use anyhow::Context;

	let engine = scrub::open(source, scrub::decode::FfmpegDecoder::new(), config).await?;

	if preload {
		engine.preload().await?;
	}

	tokio::fs::create_dir_all(output).await?;

	for &time in times {
		let frame = engine.seek(time).await.with_context(|| format!("failed to seek to {time}s"))?;
		let buffer = rgba(&frame.image)?;

		let path = output.join(format!("frame-{:06}.png", frame.index));
		buffer.save(&path).with_context(|| format!("failed to write {}", path.display()))?;

		tracing::info!(time, index = frame.index, timestamp = %frame.timestamp, path = %path.display(), "saved frame");
	}

	let stats = engine.stats().await?;
	tracing::info!(?stats, "done");

	Ok(())
}

#[cfg(feature = "ffmpeg")]
fn rgba(decoded: &scrub::Image) -> anyhow::Result<image::RgbaImage> {
	use anyhow::Context;

	anyhow::ensure!(
		decoded.format == scrub::PixelFormat::Rgba,
		"unsupported pixel format: {:?}",
		decoded.format
	);
	anyhow::ensure!(decoded.width > 0 && decoded.height > 0, "empty image");

	let plane = decoded.planes.first().context("frame has no planes")?;
	let row = decoded.width as usize * 4;

	// Drop any row padding.
	let mut data = Vec::with_capacity(row * decoded.height as usize);
	for line in plane.data.chunks(plane.stride.max(row)).take(decoded.height as usize) {
		data.extend_from_slice(line.get(..row).context("short row")?);
	}

	image::RgbaImage::from_raw(decoded.width, decoded.height, data).context("unexpected image size")
}

#[cfg(not(feature = "ffmpeg"))]
pub async fn grab(
	_source: &str,
	_times: &[f64],
	_output: &Path,
	_preload: bool,
	_config: scrub::EngineConfig,
) -> anyhow::Result<()> {
	anyhow::bail!("no decoder backend, rebuild with the `ffmpeg` feature")
}

#[cfg(all(test, feature = "ffmpeg"))]
mod tests {
	use super::*;

	#[test]
	fn test_rgba_padding() {
		let decoded = scrub::Image {
			format: scrub::PixelFormat::Rgba,
			width: 1,
			height: 2,
			planes: vec![scrub::Plane {
				data: vec![1, 2, 3, 4, 0, 0, 5, 6, 7, 8, 0, 0].into(),
				stride: 6,
			}],
		};

		let image = rgba(&decoded).unwrap();
		assert_eq!(image.into_raw(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
	}
}
