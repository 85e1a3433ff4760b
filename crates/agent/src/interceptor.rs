//! Fetch interception with a cache-first, network-fallback policy.
//!
//! Policy, in order:
//! 0. Until the agent has claimed its clients (post-activation), every
//!    request passes through untouched. Nothing is served or cached
//!    before the current version's store has been committed.
//! 1. Non-GET requests and excluded schemes pass through untouched.
//! 2. A stored snapshot under the current version is served as-is, with
//!    no network call and no freshness check.
//! 3. On a miss the network is consulted. Successful responses (and any
//!    response for the origin's root document) are written through to the
//!    store in a detached background task.
//! 4. Transport failure degrades to the offline fallback document for
//!    navigations, or a synthesized 408 "offline" placeholder otherwise.
//!
//! The caller never observes a raw transport error for an intercepted
//! request.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use url::Url;

use offcache_core::cache::key::{canonicalize, request_key};
use offcache_core::{AppConfig, CacheStore, Entry, Error};

use crate::clients::ClientRegistry;
use crate::net::{NetResponse, Network};
use crate::request::{AgentResponse, Decision, Destination, InterceptRequest, ResponseSource};

/// The fetch interceptor. Cheap to clone; clones share the store handle
/// and the set of in-flight background writes.
#[derive(Clone)]
pub struct Interceptor {
    store: CacheStore,
    network: Arc<dyn Network>,
    config: Arc<AppConfig>,
    origin: Url,
    clients: ClientRegistry,
    writes: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Interceptor {
    pub fn new(
        store: CacheStore, network: Arc<dyn Network>, config: Arc<AppConfig>, clients: ClientRegistry,
    ) -> Result<Self, Error> {
        let origin = config.origin_url().map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self { store, network, config, origin, clients, writes: Arc::new(Mutex::new(Vec::new())) })
    }

    /// Apply the interception policy to one request.
    ///
    /// Infallible: store and network failures are converted
    /// into pass-through, fallback, or placeholder outcomes.
    pub async fn intercept(&self, req: &InterceptRequest) -> Decision {
        if !self.clients.is_claimed() {
            tracing::debug!(url = %req.url, "clients not claimed yet, passing through");
            return Decision::PassThrough;
        }
        if req.method != "GET" {
            return Decision::PassThrough;
        }
        if self.is_excluded_scheme(&req.url) {
            return Decision::PassThrough;
        }

        let url = match canonicalize(&req.url) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!(url = %req.url, error = %e, "uncacheable URL, passing through");
                return Decision::PassThrough;
            }
        };
        let key = request_key(&req.method, &url);

        match self.store.get_entry(&self.config.cache_name, &key).await {
            Ok(Some(entry)) => {
                tracing::debug!(url = %url, "cache hit");
                return Decision::Respond(AgentResponse::from_entry(entry, ResponseSource::Cache));
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "cache lookup failed, treating as miss");
            }
        }

        match self.network.get(&url).await {
            Ok(resp) => {
                if resp.ok() || self.is_root_document(&url) {
                    self.spawn_write_through(&key, &url, &resp);
                }
                Decision::Respond(AgentResponse::from_net(resp))
            }
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "network unavailable");
                if req.destination == Destination::Document {
                    match self.offline_fallback().await {
                        Some(resp) => Decision::Respond(resp),
                        None => Decision::Respond(AgentResponse::synthesized_offline()),
                    }
                } else {
                    Decision::Respond(AgentResponse::synthesized_offline())
                }
            }
        }
    }

    /// Await every in-flight background write.
    ///
    /// Hosts call this before tearing the agent down so lazily cached
    /// responses are not lost; it is also how tests observe writes
    /// deterministically.
    pub async fn flush_writes(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut writes = self.writes.lock().unwrap_or_else(PoisonError::into_inner);
            writes.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
    }

    fn is_excluded_scheme(&self, url: &str) -> bool {
        self.config
            .excluded_schemes
            .iter()
            .any(|scheme| url.starts_with(&format!("{scheme}:")))
    }

    fn is_root_document(&self, url: &Url) -> bool {
        url.origin() == self.origin.origin() && (url.path() == "/" || url.path().is_empty()) && url.query().is_none()
    }

    /// Store a snapshot without blocking the response. Write failures are
    /// logged and swallowed; the caching side effect is best-effort.
    fn spawn_write_through(&self, key: &str, url: &Url, resp: &NetResponse) {
        let entry = Entry {
            version: self.config.cache_name.clone(),
            key: key.to_string(),
            method: "GET".into(),
            url: url.to_string(),
            status: resp.status,
            status_text: resp.status_text.clone(),
            headers_json: serde_json::to_string(&resp.headers).ok(),
            body: resp.body.to_vec(),
            stored_at: chrono::Utc::now().to_rfc3339(),
        };
        let store = self.store.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = store.put_entry(&entry).await {
                tracing::warn!(url = %entry.url, error = %e, "write-through failed");
            }
        });
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    async fn offline_fallback(&self) -> Option<AgentResponse> {
        let url = self.origin.join(&self.config.offline_path).ok()?;
        let url = canonicalize(url.as_str()).ok()?;
        let key = request_key("GET", &url);
        match self.store.get_entry(&self.config.cache_name, &key).await {
            Ok(Some(entry)) => Some(AgentResponse::from_entry(entry, ResponseSource::OfflineFallback)),
            Ok(None) => {
                tracing::warn!(path = %self.config.offline_path, "offline fallback is not cached");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "offline fallback lookup failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MockNetwork, test_config};

    struct Fixture {
        interceptor: Interceptor,
        store: CacheStore,
        network: Arc<MockNetwork>,
        config: Arc<AppConfig>,
    }

    /// Fixture with clients already claimed, as after activation.
    async fn fixture() -> Fixture {
        let fx = unclaimed_fixture().await;
        fx.interceptor.clients.claim();
        fx
    }

    async fn unclaimed_fixture() -> Fixture {
        let store = CacheStore::open_in_memory().await.unwrap();
        let network = Arc::new(MockNetwork::new());
        let config = Arc::new(test_config());
        let clients = ClientRegistry::new();
        let interceptor =
            Interceptor::new(store.clone(), network.clone() as Arc<dyn Network>, config.clone(), clients).unwrap();
        Fixture { interceptor, store, network, config }
    }

    fn entry_for(config: &AppConfig, url: &str, status: u16, body: &[u8]) -> Entry {
        let canonical = canonicalize(url).unwrap();
        Entry {
            version: config.cache_name.clone(),
            key: request_key("GET", &canonical),
            method: "GET".into(),
            url: canonical.to_string(),
            status,
            status_text: "OK".into(),
            headers_json: None,
            body: body.to_vec(),
            stored_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    #[tokio::test]
    async fn test_cache_hit_never_touches_network() {
        let fx = fixture().await;
        let entry = entry_for(&fx.config, "https://app.test/app.js", 200, b"cached body");
        fx.store.put_entry(&entry).await.unwrap();

        let req = InterceptRequest::get("https://app.test/app.js", Destination::Script);
        let decision = fx.interceptor.intercept(&req).await;

        let resp = decision.response().expect("should respond");
        assert_eq!(resp.source, ResponseSource::Cache);
        assert_eq!(&resp.body[..], b"cached body");
        assert_eq!(fx.network.calls(), 0);
    }

    #[tokio::test]
    async fn test_unclaimed_clients_pass_through_without_writes() {
        let fx = unclaimed_fixture().await;
        fx.network.respond("https://app.test/data.json", 200, b"payload");

        let req = InterceptRequest::get("https://app.test/data.json", Destination::Other);
        let decision = fx.interceptor.intercept(&req).await;

        assert!(matches!(decision, Decision::PassThrough));
        assert_eq!(fx.network.calls(), 0);

        fx.interceptor.flush_writes().await;
        assert!(
            !fx.store.has_version(&fx.config.cache_name).await.unwrap(),
            "no store may exist for a version that was never installed"
        );
    }

    #[tokio::test]
    async fn test_non_get_passes_through() {
        let fx = fixture().await;
        let req = InterceptRequest {
            method: "POST".into(),
            url: "https://app.test/api/save".into(),
            destination: Destination::Other,
        };

        let decision = fx.interceptor.intercept(&req).await;

        assert!(matches!(decision, Decision::PassThrough));
        assert_eq!(fx.network.calls(), 0);
    }

    #[tokio::test]
    async fn test_excluded_scheme_passes_through() {
        let fx = fixture().await;
        let req = InterceptRequest::get("chrome-extension://abcdef/content.js", Destination::Script);

        let decision = fx.interceptor.intercept(&req).await;

        assert!(matches!(decision, Decision::PassThrough));
        assert_eq!(fx.network.calls(), 0);
    }

    #[tokio::test]
    async fn test_miss_fetches_and_writes_through() {
        let fx = fixture().await;
        fx.network.respond("https://app.test/data.json", 200, b"{\"a\":1}");

        let req = InterceptRequest::get("https://app.test/data.json", Destination::Other);
        let decision = fx.interceptor.intercept(&req).await;

        let resp = decision.response().unwrap();
        assert_eq!(resp.source, ResponseSource::Network);
        assert_eq!(resp.status, 200);

        fx.interceptor.flush_writes().await;

        let url = canonicalize("https://app.test/data.json").unwrap();
        let stored = fx
            .store
            .get_entry(&fx.config.cache_name, &request_key("GET", &url))
            .await
            .unwrap()
            .expect("write-through should have stored the snapshot");
        assert_eq!(stored.body, b"{\"a\":1}".to_vec());
        assert_eq!(fx.network.calls(), 1);
    }

    #[tokio::test]
    async fn test_second_request_served_from_cache() {
        let fx = fixture().await;
        fx.network.respond("https://app.test/data.json", 200, b"payload");
        let req = InterceptRequest::get("https://app.test/data.json", Destination::Other);

        fx.interceptor.intercept(&req).await;
        fx.interceptor.flush_writes().await;
        let decision = fx.interceptor.intercept(&req).await;

        assert_eq!(decision.response().unwrap().source, ResponseSource::Cache);
        assert_eq!(fx.network.calls(), 1);
    }

    #[tokio::test]
    async fn test_root_document_non_ok_is_cached() {
        let fx = fixture().await;
        fx.network.respond("https://app.test/", 404, b"custom 404 page");

        let req = InterceptRequest::get("https://app.test/", Destination::Document);
        let decision = fx.interceptor.intercept(&req).await;

        assert_eq!(decision.response().unwrap().status, 404);

        fx.interceptor.flush_writes().await;

        let url = canonicalize("https://app.test/").unwrap();
        let stored = fx
            .store
            .get_entry(&fx.config.cache_name, &request_key("GET", &url))
            .await
            .unwrap();
        assert!(stored.is_some(), "root document is cached regardless of status");
        assert_eq!(stored.unwrap().status, 404);
    }

    #[tokio::test]
    async fn test_non_root_non_ok_is_not_cached() {
        let fx = fixture().await;
        fx.network.respond("https://app.test/missing.css", 404, b"not found");

        let req = InterceptRequest::get("https://app.test/missing.css", Destination::Style);
        let decision = fx.interceptor.intercept(&req).await;

        assert_eq!(decision.response().unwrap().status, 404);

        fx.interceptor.flush_writes().await;

        let url = canonicalize("https://app.test/missing.css").unwrap();
        let stored = fx
            .store
            .get_entry(&fx.config.cache_name, &request_key("GET", &url))
            .await
            .unwrap();
        assert!(stored.is_none());
    }

    #[tokio::test]
    async fn test_offline_document_gets_fallback() {
        let fx = fixture().await;
        let fallback = entry_for(&fx.config, "https://app.test/offline.html", 200, b"<h1>offline</h1>");
        fx.store.put_entry(&fallback).await.unwrap();
        fx.network.go_offline();

        let req = InterceptRequest::get("https://app.test/deep/page", Destination::Document);
        let decision = fx.interceptor.intercept(&req).await;

        let resp = decision.response().unwrap();
        assert_eq!(resp.source, ResponseSource::OfflineFallback);
        assert_eq!(&resp.body[..], b"<h1>offline</h1>");
    }

    #[tokio::test]
    async fn test_offline_other_resource_gets_408() {
        let fx = fixture().await;
        fx.network.go_offline();

        let req = InterceptRequest::get("https://app.test/img.png", Destination::Image);
        let decision = fx.interceptor.intercept(&req).await;

        let resp = decision.response().unwrap();
        assert_eq!(resp.status, 408);
        assert_eq!(resp.status_text, "offline");
        assert!(resp.body.is_empty());
        assert_eq!(resp.source, ResponseSource::Synthesized);
    }

    #[tokio::test]
    async fn test_offline_document_without_fallback_gets_408() {
        let fx = fixture().await;
        fx.network.go_offline();

        let req = InterceptRequest::get("https://app.test/page", Destination::Document);
        let decision = fx.interceptor.intercept(&req).await;

        let resp = decision.response().unwrap();
        assert_eq!(resp.status, 408);
        assert_eq!(resp.source, ResponseSource::Synthesized);
    }

    #[tokio::test]
    async fn test_root_with_query_is_not_root_document() {
        let fx = fixture().await;
        fx.network.respond("https://app.test/?utm=1", 500, b"oops");

        let req = InterceptRequest::get("https://app.test/?utm=1", Destination::Document);
        fx.interceptor.intercept(&req).await;
        fx.interceptor.flush_writes().await;

        let url = canonicalize("https://app.test/?utm=1").unwrap();
        let stored = fx
            .store
            .get_entry(&fx.config.cache_name, &request_key("GET", &url))
            .await
            .unwrap();
        assert!(stored.is_none());
    }
}
