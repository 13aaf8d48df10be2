//! Scoped owner of the connection pool and per-run request defaults.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder};
use uuid::Uuid;

use crate::http::fetch::Fetch;
use crate::Result;

pub const CORRELATION_HEADER: &str = "x-mcprep-session";
pub const API_KEY_HEADER: &str = "x-api-key";

const DEFAULT_USER_AGENT: &str = concat!("mcprep/", env!("CARGO_PKG_VERSION"));
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Immutable per-session options
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
    pub proxy: Option<String>,
    pub api_key: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxy: None,
            api_key: None,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn with_proxy(mut self, proxy: String) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_api_key(mut self, api_key: String) -> Self {
        self.api_key = Some(api_key);
        self
    }
}

/// One session per command invocation. All requests issued through it share
/// the pooled connections and carry the same correlation header, so a run's
/// traffic is traceable as a unit. Dropping the session releases the pool.
pub struct FetchSession {
    client: Client,
    session_id: String,
    api_key: Option<String>,
}

impl FetchSession {
    pub fn new() -> Result<Self> {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .gzip(true)
            .user_agent(&config.user_agent);

        if let Some(proxy_url) = &config.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
        }

        // Provider API keys arrive from env vars and are often padded
        let api_key = config
            .api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        Ok(Self {
            client: builder.build()?,
            session_id: Uuid::new_v4().to_string(),
            api_key,
        })
    }

    /// Begin describing one logical retrieval
    pub fn fetch(&self, url: impl Into<String>) -> Fetch<'_> {
        Fetch::new(self, url.into())
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub(crate) fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let mut request = self
            .client
            .request(method, url)
            .header(CORRELATION_HEADER, &self.session_id);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }
        request
    }
}
