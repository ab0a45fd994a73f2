use anyhow::{bail, Context, Result};
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

const DEFAULT_BATCH_SIZE: usize = 30;
const DEFAULT_POOL_SIZE: usize = 2;
const DEFAULT_CONNECTION_CONCURRENCY: usize = 10;
const DEFAULT_CONFIRMATION_DEPTH: u64 = 20;
const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 10;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
const DEFAULT_STALENESS_TIMEOUT_SECS: u64 = 120;
const DEFAULT_HEALTH_ADDR: &str = "0.0.0.0:3000";

const ENV_PREFIX: &str = "LEDGERSTREAM_";

/// Runtime configuration for the exporter, read once at startup.
///
/// All instances must be constructed via [`ExporterConfig::builder`] or
/// [`ExporterConfig::new`] so invariants are validated before any consumer
/// observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExporterConfig {
    endpoints: Vec<String>,
    pool_size: usize,
    connection_concurrency: usize,
    batch_size: usize,
    start_index: u64,
    confirmation_depth: u64,
    session_timeout: Duration,
    poll_interval: Duration,
    staleness_timeout: Duration,
    health_addr: SocketAddr,
}

pub struct ExporterConfigParams {
    pub endpoints: Vec<String>,
    pub pool_size: usize,
    pub connection_concurrency: usize,
    pub batch_size: usize,
    pub start_index: u64,
    pub confirmation_depth: u64,
    pub session_timeout: Duration,
    pub poll_interval: Duration,
    pub staleness_timeout: Duration,
    pub health_addr: SocketAddr,
}

impl ExporterConfig {
    /// Returns a builder to incrementally construct and validate a
    /// configuration.
    pub fn builder() -> ExporterConfigBuilder {
        ExporterConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    pub fn new(params: ExporterConfigParams) -> Result<Self> {
        let ExporterConfigParams {
            endpoints,
            pool_size,
            connection_concurrency,
            batch_size,
            start_index,
            confirmation_depth,
            session_timeout,
            poll_interval,
            staleness_timeout,
            health_addr,
        } = params;

        let config = Self {
            endpoints: endpoints
                .into_iter()
                .map(|endpoint| endpoint.trim().to_owned())
                .filter(|endpoint| !endpoint.is_empty())
                .collect(),
            pool_size,
            connection_concurrency,
            batch_size,
            start_index,
            confirmation_depth,
            session_timeout,
            poll_interval,
            staleness_timeout,
            health_addr,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reads the configuration from `LEDGERSTREAM_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut builder = Self::builder()
            .endpoints(parse_endpoint_list(&require_env("ENDPOINTS")?))
            .start_index(parse_env("START_INDEX")?.context("LEDGERSTREAM_START_INDEX is required")?);

        if let Some(value) = parse_env("POOL_SIZE")? {
            builder = builder.pool_size(value);
        }
        if let Some(value) = parse_env("CONNECTION_CONCURRENCY")? {
            builder = builder.connection_concurrency(value);
        }
        if let Some(value) = parse_env("BATCH_SIZE")? {
            builder = builder.batch_size(value);
        }
        if let Some(value) = parse_env("CONFIRMATION_DEPTH")? {
            builder = builder.confirmation_depth(value);
        }
        if let Some(secs) = parse_env("SESSION_TIMEOUT_SECS")? {
            builder = builder.session_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_env("POLL_INTERVAL_SECS")? {
            builder = builder.poll_interval(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_env("STALENESS_TIMEOUT_SECS")? {
            builder = builder.staleness_timeout(Duration::from_secs(secs));
        }
        if let Some(addr) = parse_env("HEALTH_ADDR")? {
            builder = builder.health_addr(addr);
        }

        builder.build()
    }

    /// Ordered candidate node endpoints, consumed front-to-back.
    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Number of sessions opened per endpoint attempt.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Maximum in-flight requests per connection.
    pub fn connection_concurrency(&self) -> usize {
        self.connection_concurrency
    }

    /// Maximum ledgers per emitted batch, and the outer fetch cap.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// First ledger index to export when no checkpoint is persisted.
    pub fn start_index(&self) -> u64 {
        self.start_index
    }

    /// Trailing ledgers behind the validated head withheld from export.
    pub fn confirmation_depth(&self) -> u64 {
        self.confirmation_depth
    }

    /// Per-request timeout applied by the session implementation.
    pub fn session_timeout(&self) -> Duration {
        self.session_timeout
    }

    /// Delay between catch-up cycles.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Time since the last successful emission after which the health
    /// endpoint reports unhealthy.
    pub fn staleness_timeout(&self) -> Duration {
        self.staleness_timeout
    }

    /// Listen address for the health/metrics HTTP surface.
    pub fn health_addr(&self) -> SocketAddr {
        self.health_addr
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            bail!("endpoints must contain at least one node address");
        }
        for endpoint in &self.endpoints {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                bail!("endpoint {endpoint} must start with http:// or https://");
            }
        }

        if self.pool_size == 0 {
            bail!("pool_size must be greater than 0");
        }

        if self.connection_concurrency == 0 {
            bail!("connection_concurrency must be greater than 0");
        }

        if self.batch_size == 0 {
            bail!("batch_size must be greater than 0");
        }

        if self.session_timeout.is_zero() {
            bail!("session_timeout must be greater than 0");
        }

        if self.poll_interval.is_zero() {
            bail!("poll_interval must be greater than 0");
        }

        if self.staleness_timeout.is_zero() {
            bail!("staleness_timeout must be greater than 0");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct ExporterConfigBuilder {
    endpoints: Option<Vec<String>>,
    pool_size: Option<usize>,
    connection_concurrency: Option<usize>,
    batch_size: Option<usize>,
    start_index: Option<u64>,
    confirmation_depth: Option<u64>,
    session_timeout: Option<Duration>,
    poll_interval: Option<Duration>,
    staleness_timeout: Option<Duration>,
    health_addr: Option<SocketAddr>,
}

impl ExporterConfigBuilder {
    pub fn endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoints
            .get_or_insert_with(Vec::new)
            .push(endpoint.into());
        self
    }

    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = Some(size);
        self
    }

    pub fn connection_concurrency(mut self, concurrency: usize) -> Self {
        self.connection_concurrency = Some(concurrency);
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn start_index(mut self, index: u64) -> Self {
        self.start_index = Some(index);
        self
    }

    pub fn confirmation_depth(mut self, depth: u64) -> Self {
        self.confirmation_depth = Some(depth);
        self
    }

    pub fn session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = Some(timeout);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn staleness_timeout(mut self, timeout: Duration) -> Self {
        self.staleness_timeout = Some(timeout);
        self
    }

    pub fn health_addr(mut self, addr: SocketAddr) -> Self {
        self.health_addr = Some(addr);
        self
    }

    pub fn build(self) -> Result<ExporterConfig> {
        let default_health_addr: SocketAddr = DEFAULT_HEALTH_ADDR
            .parse()
            .expect("default health address must parse");

        let params = ExporterConfigParams {
            endpoints: self.endpoints.context("endpoints are required")?,
            pool_size: self.pool_size.unwrap_or(DEFAULT_POOL_SIZE),
            connection_concurrency: self
                .connection_concurrency
                .unwrap_or(DEFAULT_CONNECTION_CONCURRENCY),
            batch_size: self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            start_index: self.start_index.context("start_index is required")?,
            confirmation_depth: self.confirmation_depth.unwrap_or(DEFAULT_CONFIRMATION_DEPTH),
            session_timeout: self
                .session_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_SESSION_TIMEOUT_SECS)),
            poll_interval: self
                .poll_interval
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS)),
            staleness_timeout: self
                .staleness_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_STALENESS_TIMEOUT_SECS)),
            health_addr: self.health_addr.unwrap_or(default_health_addr),
        };

        ExporterConfig::new(params)
    }
}

/// Splits a comma-separated endpoint list, trimming blanks.
pub fn parse_endpoint_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_owned)
        .collect()
}

fn require_env(name: &str) -> Result<String> {
    env::var(format!("{ENV_PREFIX}{name}"))
        .with_context(|| format!("{ENV_PREFIX}{name} is required"))
}

fn parse_env<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(format!("{ENV_PREFIX}{name}")) {
        Ok(value) => {
            let parsed = value
                .trim()
                .parse()
                .with_context(|| format!("{ENV_PREFIX}{name} is invalid: {value}"))?;
            Ok(Some(parsed))
        }
        Err(_) => Ok(None),
    }
}
