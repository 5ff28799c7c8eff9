//! HTTP Transport.
//!
//! Builds a single `reqwest::Client` from timeout/redirect settings and
//! issues requests directly, wrapped behind a `Transport` trait so the
//! scanner and technique detectors depend on an interface rather than a
//! concrete HTTP client. That seam is what lets tests substitute a
//! scripted transport with no network calls at all.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::Mutex as AsyncMutex;

use crate::core::error::{ScanError, ScanOutcome};
use crate::model::{ParamLocation, Parameter, ScanTarget};

/// Aggregate counters exposed for reporting and rate-limit bookkeeping.
#[derive(Debug, Default)]
pub struct TransportStats {
    pub requests_sent: AtomicU64,
    pub requests_failed: AtomicU64,
}

impl TransportStats {
    pub fn snapshot(&self) -> (u64, u64) {
        (
            self.requests_sent.load(Ordering::Relaxed),
            self.requests_failed.load(Ordering::Relaxed),
        )
    }
}

/// Sends one request, substituting `payload` for `parameter`'s original
/// value, and returns the response. Implementations must be `Send +
/// Sync` so a single transport can be shared across worker tasks.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        target: &ScanTarget,
        parameter: &Parameter,
        payload: &str,
    ) -> ScanOutcome<crate::model::HttpResponse>;

    fn stats(&self) -> (u64, u64);

    /// Replace the upstream proxy, or clear it with `None`. Default is a
    /// no-op so test doubles don't need to implement it.
    fn set_proxy(&self, _proxy: Option<&str>) -> ScanOutcome<()> {
        Ok(())
    }

    /// Cap outbound request rate, or remove the cap with `None`.
    fn set_rate_limit(&self, _per_second: Option<u32>) {}
}

/// A minimal token-bucket: at most one request every `1/per_second`
/// seconds, enforced by having each caller wait for its turn rather
/// than by dropping requests.
struct RateLimiter {
    min_interval: Duration,
    next_allowed: AsyncMutex<Instant>,
}

impl RateLimiter {
    fn new(per_second: u32) -> Self {
        let min_interval = if per_second == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(1.0 / per_second as f64)
        };
        RateLimiter {
            min_interval,
            next_allowed: AsyncMutex::new(Instant::now()),
        }
    }

    async fn acquire(&self) {
        let mut next = self.next_allowed.lock().await;
        let now = Instant::now();
        let start_at = if *next > now { *next } else { now };
        *next = start_at + self.min_interval;
        drop(next);

        let delay = start_at.saturating_duration_since(now);
        if delay > Duration::ZERO {
            tokio::time::sleep(delay).await;
        }
    }
}

fn build_client(
    timeout_seconds: u64,
    follow_redirects: bool,
    proxy: Option<&str>,
) -> ScanOutcome<Client> {
    let mut builder = Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .redirect(if follow_redirects {
            reqwest::redirect::Policy::limited(5)
        } else {
            reqwest::redirect::Policy::none()
        })
        .danger_accept_invalid_certs(true);

    if let Some(proxy_url) = proxy {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| ScanError::configuration(format!("invalid proxy url: {e}")))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| ScanError::transport(format!("failed to build http client: {e}")))
}

/// `reqwest`-backed transport, built once per scan from `ScanConfig`.
/// The client lives behind a `RwLock` so `set_proxy` can swap it out
/// mid-scan without the scanner or worker pool needing to know.
pub struct ReqwestTransport {
    client: RwLock<Client>,
    timeout_seconds: u64,
    follow_redirects: bool,
    rate_limiter: RwLock<Option<Arc<RateLimiter>>>,
    stats: TransportStats,
}

impl ReqwestTransport {
    pub fn new(
        timeout_seconds: u64,
        follow_redirects: bool,
        proxy: Option<&str>,
    ) -> ScanOutcome<Self> {
        let client = build_client(timeout_seconds, follow_redirects, proxy)?;

        Ok(ReqwestTransport {
            client: RwLock::new(client),
            timeout_seconds,
            follow_redirects,
            rate_limiter: RwLock::new(None),
            stats: TransportStats::default(),
        })
    }

    fn current_client(&self) -> Client {
        self.client.read().expect("transport client lock poisoned").clone()
    }

    /// Builds the request with `parameter` replaced by `payload`, all
    /// other query/body parameters left at their original values, and
    /// the target's headers/cookies applied unchanged.
    fn build_request(
        &self,
        client: &Client,
        target: &ScanTarget,
        parameter: &Parameter,
        payload: &str,
    ) -> reqwest::RequestBuilder {
        let (url, body) = substitute_parameter(target, parameter, payload);

        let mut request = client.request(target.method.parse().unwrap_or(reqwest::Method::GET), url);

        for (name, value) in &target.headers {
            request = request.header(name, value);
        }

        if !target.cookies.is_empty() {
            let cookie_header = target
                .cookies
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("; ");
            request = request.header("Cookie", cookie_header);
        }

        let has_body = matches!(parameter.location, ParamLocation::Body) || !target.body.is_empty();
        match &target.content_type {
            Some(content_type) => {
                request = request.header("Content-Type", content_type.clone());
            }
            None if has_body => {
                // Default to form-urlencoded when a body is present and
                // the caller didn't set a content type.
                request = request.header("Content-Type", "application/x-www-form-urlencoded");
            }
            None => {}
        }

        if has_body {
            request = request.body(body);
        }

        request
    }
}

fn substitute_parameter(target: &ScanTarget, parameter: &Parameter, payload: &str) -> (String, String) {
    match parameter.location {
        ParamLocation::Query => {
            let (base, query) = target
                .url
                .split_once('?')
                .map(|(b, q)| (b.to_string(), q.to_string()))
                .unwrap_or((target.url.clone(), String::new()));

            let rebuilt = replace_pair(&query, &parameter.name, payload);
            (format!("{}?{}", base, rebuilt), target.body.clone())
        }
        ParamLocation::Body => {
            let rebuilt = replace_pair(&target.body, &parameter.name, payload);
            (target.url.clone(), rebuilt)
        }
    }
}

/// Rebuilds an `&`-joined pair list, replacing every value for `name`
/// with `urlencoding::encode(payload)` and leaving all other pairs
/// byte-for-byte untouched.
fn replace_pair(raw: &str, name: &str, payload: &str) -> String {
    let encoded = urlencoding::encode(payload);
    raw.split('&')
        .map(|pair| {
            let (key, _) = pair.split_once('=').unwrap_or((pair, ""));
            if key == name {
                format!("{}={}", key, encoded)
            } else {
                pair.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("&")
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        target: &ScanTarget,
        parameter: &Parameter,
        payload: &str,
    ) -> ScanOutcome<crate::model::HttpResponse> {
        if let Some(limiter) = self.rate_limiter.read().expect("rate limiter lock poisoned").clone() {
            limiter.acquire().await;
        }

        let client = self.current_client();
        let started = Instant::now();
        let request = self.build_request(&client, target, parameter, payload);

        let response = request.send().await.map_err(|e| {
            self.stats.requests_failed.fetch_add(1, Ordering::Relaxed);
            ScanError::transport(format!("request failed: {e}"))
        })?;
        self.stats.requests_sent.fetch_add(1, Ordering::Relaxed);

        let status = response.status().as_u16();
        let url = response.url().to_string();
        let mut headers: HashMap<String, Vec<String>> = HashMap::new();
        for (name, value) in response.headers().iter() {
            headers
                .entry(name.as_str().to_string())
                .or_default()
                .push(value.to_str().unwrap_or_default().to_string());
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ScanError::transport(format!("failed to read body: {e}")))?
            .to_vec();

        Ok(crate::model::HttpResponse {
            status,
            headers,
            body,
            elapsed: started.elapsed(),
            url,
            protocol: "HTTP/1.1".to_string(),
        })
    }

    fn stats(&self) -> (u64, u64) {
        self.stats.snapshot()
    }

    fn set_proxy(&self, proxy: Option<&str>) -> ScanOutcome<()> {
        let client = build_client(self.timeout_seconds, self.follow_redirects, proxy)?;
        *self.client.write().expect("transport client lock poisoned") = client;
        Ok(())
    }

    fn set_rate_limit(&self, per_second: Option<u32>) {
        let limiter = per_second.map(|n| Arc::new(RateLimiter::new(n)));
        *self.rate_limiter.write().expect("rate limiter lock poisoned") = limiter;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ParamType;

    #[test]
    fn replace_pair_updates_only_matching_key() {
        let rebuilt = replace_pair("id=1&name=bob", "id", "' OR 1=1-- ");
        assert!(rebuilt.starts_with("id=%27"));
        assert!(rebuilt.ends_with("name=bob"));
    }

    #[test]
    fn substitute_parameter_query_preserves_path() {
        let target = ScanTarget::new("https://x.test/search?q=shoes&page=2", "GET");
        let param = Parameter {
            name: "q".to_string(),
            value: "shoes".to_string(),
            location: ParamLocation::Query,
            param_type: ParamType::String,
        };
        let (url, _) = substitute_parameter(&target, &param, "'");
        assert!(url.starts_with("https://x.test/search?"));
        assert!(url.contains("page=2"));
    }
}
