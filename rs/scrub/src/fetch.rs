use bytes::Bytes;
use url::Url;

/// Errors retrieving the source media. These are never retried.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum FetchError {
	#[error("invalid source: {0}")]
	InvalidSource(String),

	#[error("io error: {0}")]
	Io(#[from] std::io::Error),

	#[error("http error: {0}")]
	Http(#[from] reqwest::Error),
}

/// Interpret a source as a URL.
///
/// `http://`, `https://` and `file://` URLs are used as-is; anything else is a local path.
pub fn parse_source(source: &str) -> Result<Url, FetchError> {
	let is_url = ["http://", "https://", "file://"]
		.iter()
		.any(|scheme| source.starts_with(scheme));

	if is_url {
		return Url::parse(source).map_err(|err| FetchError::InvalidSource(format!("{source}: {err}")));
	}

	let path = std::path::absolute(source)?;
	Url::from_file_path(&path).map_err(|_| FetchError::InvalidSource(path.display().to_string()))
}

/// Read the entire source into memory.
pub async fn fetch(source: &str) -> Result<Bytes, FetchError> {
	let url = parse_source(source)?;
	tracing::debug!(%url, "fetching");

	let bytes: Bytes = match url.scheme() {
		"file" => {
			let path = url
				.to_file_path()
				.map_err(|_| FetchError::InvalidSource(url.to_string()))?;
			tokio::fs::read(&path).await?.into()
		}
		"http" | "https" => {
			let client = reqwest::Client::new();
			client.get(url.clone()).send().await?.error_for_status()?.bytes().await?
		}
		scheme => return Err(FetchError::InvalidSource(format!("unsupported scheme: {scheme}"))),
	};

	tracing::info!(%url, size = bytes.len(), "fetched");
	Ok(bytes)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_source() {
		assert_eq!(parse_source("https://example.com/a.mp4").unwrap().scheme(), "https");
		assert_eq!(parse_source("file:///tmp/a.mp4").unwrap().path(), "/tmp/a.mp4");

		let url = parse_source("video/a.mp4").unwrap();
		assert_eq!(url.scheme(), "file");
		assert!(url.path().ends_with("/video/a.mp4"));

		assert!(matches!(parse_source("http://"), Err(FetchError::InvalidSource(_))));
	}

	#[tokio::test]
	async fn test_fetch_file() {
		let path = std::env::temp_dir().join(format!("scrub-fetch-{}.bin", std::process::id()));
		tokio::fs::write(&path, b"hello").await.unwrap();

		let bytes = fetch(path.to_str().unwrap()).await.unwrap();
		assert_eq!(bytes, Bytes::from_static(b"hello"));

		tokio::fs::remove_file(&path).await.unwrap();

		let err = fetch(path.to_str().unwrap()).await.unwrap_err();
		assert!(matches!(err, FetchError::Io(_)));
	}
}
