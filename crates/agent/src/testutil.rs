//! Shared test fixtures: a scripted network and a canned configuration.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use offcache_core::{AppConfig, Error};

use crate::net::{NetResponse, Network};

#[derive(Debug, Clone)]
enum Scripted {
    Respond { status: u16, body: Vec<u8> },
    Fail,
}

/// A [`Network`] that serves scripted responses and counts calls.
#[derive(Debug, Default)]
pub struct MockNetwork {
    routes: Mutex<HashMap<String, Scripted>>,
    all_offline: AtomicBool,
    calls: AtomicUsize,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a response for a URL.
    pub fn respond(&self, url: &str, status: u16, body: &[u8]) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Scripted::Respond { status, body: body.to_vec() });
    }

    /// Script a transport failure for one URL.
    pub fn fail(&self, url: &str) {
        self.routes.lock().unwrap().insert(url.to_string(), Scripted::Fail);
    }

    /// Make every request fail at the transport level.
    pub fn go_offline(&self) {
        self.all_offline.store(true, Ordering::SeqCst);
    }

    /// Number of network calls issued so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "",
    }
}

#[async_trait]
impl Network for MockNetwork {
    async fn get(&self, url: &Url) -> Result<NetResponse, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.all_offline.load(Ordering::SeqCst) {
            return Err(Error::Network("transport failure: offline".into()));
        }

        let scripted = self.routes.lock().unwrap().get(url.as_str()).cloned();
        match scripted {
            Some(Scripted::Respond { status, body }) => Ok(NetResponse {
                url: url.clone(),
                status,
                status_text: status_text(status).to_string(),
                headers: vec![("content-type".into(), "text/plain".into())],
                body: Bytes::from(body),
            }),
            Some(Scripted::Fail) => Err(Error::Network("transport failure: connection refused".into())),
            None => Ok(NetResponse {
                url: url.clone(),
                status: 404,
                status_text: "Not Found".into(),
                headers: Vec::new(),
                body: Bytes::new(),
            }),
        }
    }
}

/// A small configuration pointing at a fictional origin.
pub fn test_config() -> AppConfig {
    AppConfig {
        cache_name: "offcache-test-v1".into(),
        origin: "https://app.test".into(),
        precache: vec!["/".into(), "/index.html".into(), "/offline.html".into(), "/style.css".into()],
        offline_path: "/offline.html".into(),
        ..Default::default()
    }
}

/// Script a 200 for every precache path of `config`.
pub fn route_precache(network: &MockNetwork, config: &AppConfig) {
    for path in &config.precache {
        let url = format!("{}{}", config.origin, path);
        network.respond(&url, 200, format!("body of {path}").as_bytes());
    }
}
