use reqwest::blocking::Client;
use reqwest::blocking::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("upload service answered with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("upload response is not JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("upload response has no string at {0}")]
    MissingUrl(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UploadConfig {
    pub endpoint: String,
    /// Multipart field carrying the file.
    pub file_field: String,
    /// Multipart field carrying the artifact name; omitted when empty.
    pub name_field: String,
    /// JSON pointer to the URL in the response body.
    pub url_pointer: String,
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            file_field: "file".to_string(),
            name_field: "name".to_string(),
            url_pointer: "/url".to_string(),
            token: None,
            timeout_secs: 30,
        }
    }
}

pub trait AssetUploader {
    fn upload(&self, name: &str, bytes: &[u8]) -> Result<String, UploadError>;
}

pub struct HttpUploader {
    client: Client,
    config: UploadConfig,
}

impl HttpUploader {
    pub fn new(config: UploadConfig) -> Result<Self, UploadError> {
        let client = Client::builder()
            .user_agent(crate::assets::USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }
}

impl AssetUploader for HttpUploader {
    fn upload(&self, name: &str, bytes: &[u8]) -> Result<String, UploadError> {
        let part = Part::bytes(bytes.to_vec())
            .file_name(name.to_string())
            .mime_str(mime_for(name))?;
        let mut form = Form::new().part(self.config.file_field.clone(), part);
        if !self.config.name_field.is_empty() {
            form = form.text(self.config.name_field.clone(), name.to_string());
        }
        let mut request = self.client.post(&self.config.endpoint).multipart(form);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }
        let response = request.send()?;
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(UploadError::Status {
                status: status.as_u16(),
                body,
            });
        }
        extract_url(&body, &self.config.url_pointer)
    }
}

fn mime_for(name: &str) -> &'static str {
    if name.ends_with(".svg") {
        "image/svg+xml"
    } else {
        "image/png"
    }
}

fn extract_url(body: &str, pointer: &str) -> Result<String, UploadError> {
    let value: serde_json::Value = serde_json::from_str(body)?;
    value
        .pointer(pointer)
        .and_then(|url| url.as_str())
        .map(str::to_string)
        .ok_or_else(|| UploadError::MissingUrl(pointer.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_is_read_through_pointer() {
        let body = r#"{"data":{"files":[{"url":"https://cdn/x.png"}]}}"#;
        assert_eq!(
            extract_url(body, "/data/files/0/url").unwrap(),
            "https://cdn/x.png"
        );
        assert!(matches!(
            extract_url(body, "/url"),
            Err(UploadError::MissingUrl(_))
        ));
        assert!(matches!(extract_url("<html>", "/url"), Err(UploadError::Json(_))));
    }

    #[test]
    fn config_defaults_fill_missing_keys() {
        let config: UploadConfig =
            serde_json::from_str(r#"{"endpoint":"https://up","token":"t"}"#).unwrap();
        assert_eq!(config.file_field, "file");
        assert_eq!(config.url_pointer, "/url");
        assert_eq!(config.token.as_deref(), Some("t"));
    }
}
