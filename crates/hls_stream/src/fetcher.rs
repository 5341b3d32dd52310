use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Method;

use crate::HlsStreamError;

const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// A single HTTP request issued through a [`Fetcher`].
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    /// Overrides the fetcher's default timeout when set.
    pub timeout: Option<Duration>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, method: Method, body: Vec<u8>) -> Self {
        self.method = method;
        self.body = Some(body);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Transport used by sessions to retrieve manifests and segments.
///
/// Every failure (DNS, refused connection, timeout, non-2xx status) is
/// reported as [`HlsStreamError::FetchFailed`].
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<Vec<u8>, HlsStreamError>;
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub timeout: Duration,
    pub user_agent: String,
    /// Extra attempts after a transport error. Error statuses are never retried.
    pub max_retries: u32,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: "Kawaii-Player/6.0.0".to_string(),
            max_retries: 0,
        }
    }
}

pub struct HttpFetcher {
    client: reqwest::Client,
    config: FetcherConfig,
}

impl HttpFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, HlsStreamError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| HlsStreamError::fetch("", e))?;
        Ok(Self { client, config })
    }

    async fn attempt(&self, request: &FetchRequest) -> Result<Vec<u8>, reqwest::Error> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone());
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?.error_for_status()?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<Vec<u8>, HlsStreamError> {
        let mut attempt = 0u32;
        loop {
            log::debug!("{} {}", request.method, request.url);
            match self.attempt(&request).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if !e.is_status() && attempt < self.config.max_retries => {
                    attempt += 1;
                    log::warn!(
                        "Request to {} failed (attempt {}): {}",
                        request.url,
                        attempt,
                        e
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(e) => return Err(HlsStreamError::fetch(request.url.as_str(), e)),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use super::*;

    /// Serves queued responses per URL and records every requested URL.
    ///
    /// When a URL's queue holds a single response it is served repeatedly;
    /// an unknown URL fails like a refused connection.
    #[derive(Default)]
    pub struct ScriptedFetcher {
        responses: Mutex<HashMap<String, VecDeque<Result<Vec<u8>, HlsStreamError>>>>,
        requests: Mutex<Vec<String>>,
    }

    impl ScriptedFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(self, url: &str, body: &str) -> Self {
            self.push(url, Ok(body.as_bytes().to_vec()));
            self
        }

        pub fn fail(self, url: &str) -> Self {
            self.push(url, Err(HlsStreamError::fetch(url, "connection refused")));
            self
        }

        fn push(&self, url: &str, response: Result<Vec<u8>, HlsStreamError>) {
            self.responses
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_default()
                .push_back(response);
        }

        pub fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }

        pub fn request_count(&self, url: &str) -> usize {
            self.requests().iter().filter(|u| u.as_str() == url).count()
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn fetch(&self, request: FetchRequest) -> Result<Vec<u8>, HlsStreamError> {
            self.requests.lock().unwrap().push(request.url.clone());
            let mut responses = self.responses.lock().unwrap();
            match responses.get_mut(&request.url) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
                Some(queue) if !queue.is_empty() => queue[0].clone(),
                _ => Err(HlsStreamError::fetch(request.url, "connection refused")),
            }
        }
    }
}
