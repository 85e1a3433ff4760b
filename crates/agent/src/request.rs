//! Request and response types crossing the interception boundary.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use offcache_core::Entry;

use crate::net::NetResponse;

/// What kind of resource a request is for, mirroring the hosting
/// application's notion of a request destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    /// A full document navigation.
    Document,
    Style,
    Script,
    Image,
    Font,
    #[default]
    Other,
}

/// An outgoing request presented to the interceptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterceptRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub destination: Destination,
}

impl InterceptRequest {
    /// Convenience constructor for a GET request.
    pub fn get(url: impl Into<String>, destination: Destination) -> Self {
        Self { method: "GET".into(), url: url.into(), destination }
    }
}

/// Where a response produced by the interceptor came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseSource {
    Cache,
    Network,
    OfflineFallback,
    Synthesized,
}

/// A response the interceptor hands back to the caller.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub source: ResponseSource,
}

impl AgentResponse {
    /// Replay a stored snapshot.
    pub fn from_entry(entry: Entry, source: ResponseSource) -> Self {
        let headers = entry
            .headers_json
            .as_deref()
            .and_then(|json| serde_json::from_str(json).ok())
            .unwrap_or_default();
        Self {
            status: entry.status,
            status_text: entry.status_text,
            headers,
            body: Bytes::from(entry.body),
            source,
        }
    }

    /// Pass a network response along unmodified.
    pub fn from_net(resp: NetResponse) -> Self {
        Self {
            status: resp.status,
            status_text: resp.status_text,
            headers: resp.headers,
            body: resp.body,
            source: ResponseSource::Network,
        }
    }

    /// The placeholder handed to non-document requests when the network
    /// is unreachable and nothing is cached.
    pub fn synthesized_offline() -> Self {
        Self {
            status: 408,
            status_text: "offline".into(),
            headers: Vec::new(),
            body: Bytes::new(),
            source: ResponseSource::Synthesized,
        }
    }

    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Outcome of intercepting one request.
#[derive(Debug, Clone)]
pub enum Decision {
    /// Not our request; the caller performs it untouched.
    PassThrough,
    /// The agent produced a response for the caller.
    Respond(AgentResponse),
}

impl Decision {
    pub fn response(&self) -> Option<&AgentResponse> {
        match self {
            Decision::Respond(resp) => Some(resp),
            Decision::PassThrough => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_deserialize() {
        let req: InterceptRequest =
            serde_json::from_str(r#"{"method":"GET","url":"https://a.test/","destination":"document"}"#).unwrap();
        assert_eq!(req.destination, Destination::Document);
    }

    #[test]
    fn test_destination_defaults_to_other() {
        let req: InterceptRequest = serde_json::from_str(r#"{"method":"GET","url":"https://a.test/x.bin"}"#).unwrap();
        assert_eq!(req.destination, Destination::Other);
    }

    #[test]
    fn test_synthesized_offline_shape() {
        let resp = AgentResponse::synthesized_offline();
        assert_eq!(resp.status, 408);
        assert_eq!(resp.status_text, "offline");
        assert!(resp.body.is_empty());
        assert_eq!(resp.source, ResponseSource::Synthesized);
        assert!(!resp.ok());
    }

    #[test]
    fn test_from_entry_recovers_headers() {
        let entry = Entry {
            version: "v1".into(),
            key: "k".into(),
            method: "GET".into(),
            url: "https://a.test/".into(),
            status: 200,
            status_text: "OK".into(),
            headers_json: Some(r#"[["content-type","text/html"]]"#.into()),
            body: b"hi".to_vec(),
            stored_at: chrono::Utc::now().to_rfc3339(),
        };
        let resp = AgentResponse::from_entry(entry, ResponseSource::Cache);
        assert_eq!(resp.headers, vec![("content-type".to_string(), "text/html".to_string())]);
        assert_eq!(&resp.body[..], b"hi");
    }
}
