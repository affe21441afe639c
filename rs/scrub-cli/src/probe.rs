use anyhow::Context;

pub async fn probe(source: &str) -> anyhow::Result<()> {
	let data = scrub::fetch(source).await.context("failed to fetch source")?;
	let tracks = scrub::mp4::demux(&data).context("failed to parse mp4")?;

	for track in &tracks {
		tracing::debug!(id = track.id, kind = ?track.kind, codec = %track.codec, samples = track.samples.len(), "track");
	}

	let (metadata, _) = scrub::StreamMetadata::derive(tracks)?;
	let config = &metadata.config;

	println!("codec:     {}", config.codec);
	println!("size:      {}x{}", config.coded_width, config.coded_height);
	println!("fps:       {:.3}", metadata.fps);
	println!("frames:    {}", metadata.frames);
	println!("keyframes: {}", metadata.keyframes);
	println!("duration:  {:.3}s", metadata.duration.as_secs_f64());

	Ok(())
}
