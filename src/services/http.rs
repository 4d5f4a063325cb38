//! Image fetching over HTTP(S) and `data:` URIs.
//!
//! Fetched images are validated (non-empty, image MIME type, decodable
//! header with non-zero dimensions) and cached by URL.

use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::ImageReader;
use log::{debug, warn};
use moka::future::Cache;

use super::models::FetchedImage;
use super::ImageFetcher;

const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

pub struct HttpImageFetcher {
    client: reqwest::Client,
    cache: Cache<String, FetchedImage>,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("report-forge/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        let cache = Cache::builder()
            .time_to_live(Duration::from_secs(10 * 60))
            .max_capacity(512)
            .build();
        Self { client, cache }
    }

    async fn download(&self, url: &str) -> Result<(Vec<u8>, Option<String>), String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?
            .error_for_status()
            .map_err(|e| format!("bad status: {}", e))?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| format!("failed to read body: {}", e))?;
        Ok((bytes.to_vec(), content_type))
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, String> {
        if let Some(cached) = self.cache.get(url).await {
            debug!("image cache hit for {}", url);
            return Ok(cached);
        }

        let (bytes, content_type) = if url.starts_with("data:") {
            decode_data_uri(url)?
        } else if url.starts_with("http://") || url.starts_with("https://") {
            self.download(url).await?
        } else {
            return Err(format!("unsupported image URL scheme in '{}'", url));
        };

        let image = validate_image(url, &bytes, content_type.as_deref()).map_err(|e| {
            warn!("rejected image {}: {}", url, e);
            e
        })?;
        self.cache.insert(url.to_string(), image.clone()).await;
        Ok(image)
    }
}

/// Split a `data:<mime>;base64,<payload>` URI into bytes and MIME type.
pub fn decode_data_uri(uri: &str) -> Result<(Vec<u8>, Option<String>), String> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| "not a data URI".to_string())?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| "data URI has no payload".to_string())?;
    let mut parts = header.split(';');
    let mime = parts
        .next()
        .filter(|mime| !mime.is_empty())
        .map(|mime| mime.to_string());
    if !parts.any(|part| part == "base64") {
        return Err("only base64 data URIs are supported".to_string());
    }
    let bytes = BASE64
        .decode(payload.trim())
        .map_err(|e| format!("invalid base64 payload: {}", e))?;
    Ok((bytes, mime))
}

/// Check that `bytes` are a usable image and read its intrinsic size.
pub fn validate_image(
    url: &str,
    bytes: &[u8],
    content_type: Option<&str>,
) -> Result<FetchedImage, String> {
    if bytes.is_empty() {
        return Err("empty image body".to_string());
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(format!(
            "image is {} bytes, limit is {}",
            bytes.len(),
            MAX_IMAGE_BYTES
        ));
    }

    let mime_type = match content_type {
        Some(declared) => declared
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase(),
        None => mime_guess::from_path(url.split('?').next().unwrap_or(url))
            .first()
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_default(),
    };
    // Servers often send octet-stream; the decoder below is the real check.
    if !mime_type.is_empty()
        && !mime_type.starts_with("image/")
        && mime_type != "application/octet-stream"
    {
        return Err(format!("unexpected content type '{}'", mime_type));
    }

    let (width, height) = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| format!("unreadable image: {}", e))?
        .into_dimensions()
        .map_err(|e| format!("cannot decode image header: {}", e))?;
    if width == 0 || height == 0 {
        return Err(format!("image has zero size {}x{}", width, height));
    }

    Ok(FetchedImage {
        uri: url.to_string(),
        width,
        height,
        mime_type: if mime_type.starts_with("image/") {
            mime_type
        } else {
            "image/png".to_string()
        },
    })
}
