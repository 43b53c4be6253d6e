//! HTTP transport for remote calls.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::protocol::{Envelope, RemoteOutcome, Request};
use super::RemoteError;
use crate::config::RemoteConfig;

/// Result of a connectivity probe.
#[derive(Debug, Clone, PartialEq)]
pub enum Probe {
    Connected { version: u32 },
    Unreachable(String),
    /// No answer within the probe timeout. Usually transient.
    Timeout,
}

impl Probe {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Connected { version } => format!("connected (api version {version})"),
            Self::Unreachable(reason) => format!("unreachable: {reason}"),
            Self::Timeout => "probe timed out".to_string(),
        }
    }
}

struct CachedProbe {
    probe: Probe,
    at: Instant,
}

/// Inner state shared across clones.
struct RemoteClientInner {
    http: Client,
    config: RemoteConfig,
    probe_cache: Mutex<Option<CachedProbe>>,
}

/// Remote scheduler client.
///
/// Cheap to clone; all clones share the HTTP pool and the probe cache.
#[derive(Clone)]
pub struct RemoteClient {
    inner: Arc<RemoteClientInner>,
}

impl RemoteClient {
    pub fn new(config: RemoteConfig) -> Result<Self, RemoteError> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        Ok(Self {
            inner: Arc::new(RemoteClientInner {
                http,
                config,
                probe_cache: Mutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.inner.config
    }

    /// Probe connectivity, reusing a result younger than the cache TTL.
    pub async fn probe(&self) -> Probe {
        if let Some(cached) = self.cached_probe() {
            return cached;
        }
        self.probe_with_timeout(self.inner.config.probe_timeout())
            .await
    }

    /// Probe connectivity now, bypassing the cache. The result is cached.
    pub async fn probe_with_timeout(&self, timeout: Duration) -> Probe {
        let probe = match self.version(timeout).await {
            Ok(version) => {
                if version != self.inner.config.api_version {
                    warn!(
                        remote = version,
                        expected = self.inner.config.api_version,
                        "remote api version differs"
                    );
                }
                Probe::Connected { version }
            }
            Err(RemoteError::Timeout) => Probe::Timeout,
            Err(e) => Probe::Unreachable(e.to_string()),
        };
        debug!(probe = %probe.describe(), "connectivity probe");
        self.store_probe(Some(probe.clone()));
        probe
    }

    pub fn invalidate_probe(&self) {
        self.store_probe(None);
    }

    /// Issue one action and return its result.
    pub async fn call(&self, request: &Request) -> Result<Value, RemoteError> {
        let body = request.to_envelope(self.inner.config.api_version)?;
        debug!(action = request.name(), "remote call");
        let reply = self
            .post(
                &body,
                self.inner.config.request_timeout(),
                self.inner.config.max_attempts,
            )
            .await
            .inspect_err(|e| {
                if e.is_connectivity() {
                    self.invalidate_probe();
                }
            })?;
        decode_envelope(reply)
    }

    /// Issue one action and decode its result.
    pub async fn call_as<T: DeserializeOwned>(&self, request: &Request) -> Result<T, RemoteError> {
        let value = self.call(request).await?;
        serde_json::from_value(value)
            .map_err(|e| RemoteError::Protocol(format!("{}: {e}", request.name())))
    }

    /// Issue several actions in one round trip.
    ///
    /// Returns exactly one outcome per request, in request order. A failing
    /// action does not fail the others.
    pub async fn call_batch(&self, requests: &[Request]) -> Result<Vec<RemoteOutcome>, RemoteError> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let multi = Request::Multi {
            actions: requests.to_vec(),
        };
        let Value::Array(entries) = self.call(&multi).await? else {
            return Err(RemoteError::Protocol("multi returned a non-list result".to_string()));
        };
        if entries.len() != requests.len() {
            return Err(RemoteError::Protocol(format!(
                "multi returned {} results for {} actions",
                entries.len(),
                requests.len()
            )));
        }
        Ok(entries.into_iter().map(RemoteOutcome::from_entry).collect())
    }

    async fn version(&self, timeout: Duration) -> Result<u32, RemoteError> {
        let body = Request::Version.to_envelope(self.inner.config.api_version)?;
        let value = decode_envelope(self.post(&body, timeout, 1).await?)?;
        value
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| RemoteError::Protocol(format!("unexpected version reply: {value}")))
    }

    /// POST a JSON body, retrying server errors with exponential backoff.
    async fn post(&self, body: &Value, timeout: Duration, max_attempts: u32) -> Result<Value, RemoteError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let resp = self
                .inner
                .http
                .post(&self.inner.config.url)
                .timeout(timeout)
                .json(body)
                .send()
                .await?;

            let status = resp.status();
            if status.is_success() {
                return Ok(resp.json::<Value>().await?);
            }

            let message = resp.text().await.unwrap_or_default();
            if status.is_server_error() && attempt < max_attempts {
                let delay = self.inner.config.backoff(attempt);
                warn!(
                    status = status.as_u16(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "remote server error, retrying"
                );
                tokio::time::sleep(delay).await;
                continue;
            }
            return Err(RemoteError::Backend {
                status: status.as_u16(),
                message,
            });
        }
    }

    fn cached_probe(&self) -> Option<Probe> {
        let ttl = self.inner.config.probe_cache_ttl();
        let guard = self.inner.probe_cache.lock().ok()?;
        guard
            .as_ref()
            .filter(|cached| cached.at.elapsed() < ttl)
            .map(|cached| cached.probe.clone())
    }

    fn store_probe(&self, probe: Option<Probe>) {
        if let Ok(mut guard) = self.inner.probe_cache.lock() {
            *guard = probe.map(|probe| CachedProbe {
                probe,
                at: Instant::now(),
            });
        }
    }
}

fn decode_envelope(value: Value) -> Result<Value, RemoteError> {
    let envelope: Envelope = serde_json::from_value(value)
        .map_err(|e| RemoteError::Protocol(format!("malformed response: {e}")))?;
    envelope.into_result()
}
