use crate::document::Document;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::blocking::Client;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const USER_AGENT: &str = concat!("svg-banner-renderer/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("request for {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("{url} is not a recognizable image")]
    NotAnImage { url: String },
}

pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub mime: Option<String>,
}

pub trait ImageFetcher {
    fn fetch(&self, url: &str) -> Result<FetchedImage, AssetError>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl ImageFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<FetchedImage, AssetError> {
        let request_error = |source| AssetError::Request {
            url: url.to_string(),
            source,
        };
        let response = self.client.get(url).send().map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(AssetError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_string());
        let bytes = response.bytes().map_err(request_error)?.to_vec();
        Ok(FetchedImage { bytes, mime })
    }
}

/// Inline every `http(s)` image href in `doc`. A fetch that fails leaves its
/// href untouched; the renderer then draws nothing for it. Returns the number
/// of images inlined.
pub fn inline_remote_images(doc: &mut Document, fetcher: &dyn ImageFetcher) -> usize {
    let images: Vec<_> = doc
        .descendants(doc.root())
        .into_iter()
        .filter(|node| doc.tag(*node) == Some("image"))
        .collect();

    let mut inlined = 0;
    for image in images {
        let Some(href) = doc.href(image).map(str::to_string) else {
            continue;
        };
        if !is_remote(&href) {
            continue;
        }
        match fetcher.fetch(&href).and_then(|fetched| data_uri(&href, fetched)) {
            Ok(uri) => {
                let name = doc.href_attr_name(image).unwrap_or("href").to_string();
                doc.set_attr(image, &name, &uri);
                inlined += 1;
            }
            Err(err) => log::warn!("image not inlined: {err}"),
        }
    }
    inlined
}

fn is_remote(href: &str) -> bool {
    let lower = href.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn data_uri(url: &str, fetched: FetchedImage) -> Result<String, AssetError> {
    let mime = sniff_mime(&fetched.bytes)
        .map(str::to_string)
        .or(fetched.mime.filter(|mime| mime.starts_with("image/")))
        .ok_or_else(|| AssetError::NotAnImage {
            url: url.to_string(),
        })?;
    Ok(format!("data:{mime};base64,{}", STANDARD.encode(&fetched.bytes)))
}

fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if bytes.starts_with(&[0xff, 0xd8, 0xff]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        let head = String::from_utf8_lossy(&bytes[..bytes.len().min(256)]);
        head.contains("<svg").then_some("image/svg+xml")
    }
}
