use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Client,
};
use serde::Deserialize;
use thiserror::Error;

use crate::models::parse_scheduled_at;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("server time request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("server time endpoint answered with status {0}")]
    Status(u16),

    #[error("server time payload is not a timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("invalid sync header '{0}'")]
    InvalidHeader(String),
}

/// Anything that can report the authoritative current time.
#[async_trait]
pub trait ServerTimeSource: Send + Sync {
    async fn fetch_server_time(&self) -> Result<DateTime<Utc>, SyncError>;
}

#[derive(Debug, Deserialize)]
struct ServerTimeResponse {
    timestamp: RawTimestamp,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Millis(i64),
    Text(String),
}

impl RawTimestamp {
    fn into_datetime(self) -> Result<DateTime<Utc>, SyncError> {
        match self {
            RawTimestamp::Millis(ms) => DateTime::from_timestamp_millis(ms)
                .ok_or_else(|| SyncError::InvalidTimestamp(ms.to_string())),
            RawTimestamp::Text(text) => {
                parse_scheduled_at(&text).map_err(|_| SyncError::InvalidTimestamp(text))
            }
        }
    }
}

/// Parses a `{"timestamp": ...}` body where the timestamp is either epoch
/// milliseconds or an ISO-8601 string.
pub fn parse_server_time(body: &str) -> Result<DateTime<Utc>, SyncError> {
    let response: ServerTimeResponse = serde_json::from_str(body)
        .map_err(|err| SyncError::InvalidTimestamp(err.to_string()))?;
    response.timestamp.into_datetime()
}

/// `GET`s a server-time endpoint with caller-supplied headers.
pub struct HttpTimeSource {
    client: Client,
    url: String,
    headers: HeaderMap,
}

impl HttpTimeSource {
    pub fn new(url: impl Into<String>, headers: &BTreeMap<String, String>) -> Result<Self, SyncError> {
        let mut header_map = HeaderMap::new();
        header_map.insert(
            HeaderName::from_static("x-requested-with"),
            HeaderValue::from_static("XMLHttpRequest"),
        );
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| SyncError::InvalidHeader(name.clone()))?;
            let value =
                HeaderValue::from_str(value).map_err(|_| SyncError::InvalidHeader(name.to_string()))?;
            header_map.insert(name, value);
        }

        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            url: url.into(),
            headers: header_map,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ServerTimeSource for HttpTimeSource {
    async fn fetch_server_time(&self) -> Result<DateTime<Utc>, SyncError> {
        let response = self
            .client
            .get(&self.url)
            .headers(self.headers.clone())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        parse_server_time(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn accepts_iso_and_millis() {
        let expected = Utc.with_ymd_and_hms(2025, 3, 1, 16, 0, 0).unwrap();
        assert_eq!(
            parse_server_time(r#"{"timestamp": "2025-03-01T16:00:00.000Z"}"#).unwrap(),
            expected
        );
        assert_eq!(
            parse_server_time(&format!(r#"{{"timestamp": {}}}"#, expected.timestamp_millis())).unwrap(),
            expected
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            parse_server_time(r#"{"timestamp": "soon"}"#),
            Err(SyncError::InvalidTimestamp(_))
        ));
        assert!(parse_server_time(r#"{"time": 1}"#).is_err());
        assert!(parse_server_time("<html>").is_err());
    }

    #[test]
    fn rejects_bad_header_names() {
        let mut headers = BTreeMap::new();
        headers.insert("bad header".to_string(), "x".to_string());
        assert!(matches!(
            HttpTimeSource::new("http://localhost/api/server-time", &headers),
            Err(SyncError::InvalidHeader(_))
        ));
    }

    #[test]
    fn keeps_configured_url() {
        let mut headers = BTreeMap::new();
        headers.insert("X-CSRF-TOKEN".to_string(), "token".to_string());
        let source = HttpTimeSource::new("http://localhost/api/server-time", &headers).unwrap();
        assert_eq!(source.url(), "http://localhost/api/server-time");
        assert!(source.headers.contains_key("x-csrf-token"));
        assert!(source.headers.contains_key("x-requested-with"));
    }
}
