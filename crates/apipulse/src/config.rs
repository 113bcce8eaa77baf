//! SDK configuration.
//!
//! [`Config`] is built once through [`ConfigBuilder`], optionally overridden
//! from the environment, and then shared read-only with every component. There
//! is no global mutable state; callers hand the value to the pipeline at
//! construction time.
//!
//! Environment overrides:
//!
//! | variable | effect |
//! |---|---|
//! | `APIPULSE_API_KEY` | tenant credential |
//! | `APIPULSE_PROJECT_ID` | tenant project identifier |
//! | `APIPULSE_ENDPOINT` | custom collector endpoint |
//! | `APIPULSE_MASKED_FIELDS` | comma list replacing the default masked fields |
//! | `APIPULSE_BATCH_SIZE` | batch flush size threshold |
//! | `APIPULSE_FLUSH_INTERVAL_MS` | batch flush interval, milliseconds |
//! | `APIPULSE_ASYNC` | `true`/`false`, pooled vs fire-and-forget dispatch |
//! | `APIPULSE_MAX_CONCURRENCY` | delivery pool size |
//! | `APIPULSE_IGNORED_ENVIRONMENTS` | comma list of environments to skip |
//! | `APIPULSE_ENV` | current deployment environment |
//! | `APIPULSE_SDK_NAME` / `APIPULSE_SDK_VERSION` | reported SDK identity |

use crate::dispatch::OverflowPolicy;
use crate::masking::{MaskRules, DEFAULT_MASKED_FIELDS};
use crate::meta::{LanguageInfo, ServerInfo};
use std::sync::Arc;
use std::time::Duration;

/// Reported SDK name unless overridden.
pub const SDK_NAME: &str = "rust";

/// Immutable SDK configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub project_id: String,
    /// Custom collector endpoint. Always wins over the built-in replicas.
    pub endpoint: Option<String>,
    /// Route payloads to the debug collector instead of the replicas.
    pub debug: bool,
    pub mask_rules: Arc<MaskRules>,
    /// Pooled dispatch when true, detached fire-and-forget when false.
    pub async_dispatch: bool,
    pub max_concurrency: usize,
    pub queue_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    pub batch_errors_enabled: bool,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub ignored_environments: Vec<String>,
    /// Current deployment environment, from `APIPULSE_ENV` unless set.
    pub environment: Option<String>,
    pub sdk_name: String,
    pub sdk_version: String,
    pub server: ServerInfo,
    pub language: LanguageInfo,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Whether capture should be skipped entirely for this process.
    pub fn is_ignored_environment(&self) -> bool {
        match &self.environment {
            Some(environment) => {
                let environment = environment.to_lowercase();
                self.ignored_environments
                    .iter()
                    .any(|ignored| ignored.to_lowercase() == environment)
            }
            None => false,
        }
    }
}

/// Builder for [`Config`].
///
/// Defaults mirror a conservative production setup; `build()` applies
/// environment overrides on top of whatever the caller set and probes host
/// metadata once.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    api_key: String,
    project_id: String,
    endpoint: Option<String>,
    debug: bool,
    default_fields: Option<Vec<String>>,
    additional_fields: Vec<String>,
    async_dispatch: bool,
    max_concurrency: Option<usize>,
    queue_capacity: Option<usize>,
    overflow_policy: Option<OverflowPolicy>,
    batch_errors_enabled: bool,
    batch_size: Option<usize>,
    flush_interval: Option<Duration>,
    ignored_environments: Option<Vec<String>>,
    environment: Option<String>,
    sdk_name: Option<String>,
    sdk_version: Option<String>,
    server: Option<ServerInfo>,
    language: Option<LanguageInfo>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = project_id.into();
        self
    }

    /// Use a custom collector endpoint instead of the built-in replicas.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Replace the default masked-field list.
    pub fn masked_fields(
        mut self,
        fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.default_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Mask additional fields on top of the default list.
    pub fn additional_masked_fields(
        mut self,
        fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.additional_fields
            .extend(fields.into_iter().map(Into::into));
        self
    }

    /// Enable the bounded delivery pool instead of detached sends.
    pub fn async_dispatch(mut self, enabled: bool) -> Self {
        self.async_dispatch = enabled;
        self
    }

    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = Some(max_concurrency.max(1));
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity.max(1));
        self
    }

    pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = Some(policy);
        self
    }

    /// Enable batched error reporting.
    pub fn batch_errors(mut self, size: usize, flush_interval: Duration) -> Self {
        self.batch_errors_enabled = true;
        self.batch_size = Some(size.max(1));
        self.flush_interval = Some(flush_interval);
        self
    }

    pub fn ignored_environments(
        mut self,
        environments: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.ignored_environments = Some(environments.into_iter().map(Into::into).collect());
        self
    }

    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn sdk_name(mut self, name: impl Into<String>) -> Self {
        self.sdk_name = Some(name.into());
        self
    }

    pub fn sdk_version(mut self, version: impl Into<String>) -> Self {
        self.sdk_version = Some(version.into());
        self
    }

    /// Supply host metadata instead of probing for it. Mainly for tests.
    pub fn server_info(mut self, server: ServerInfo) -> Self {
        self.server = Some(server);
        self
    }

    /// Supply language metadata instead of probing for it. Mainly for tests.
    pub fn language_info(mut self, language: LanguageInfo) -> Self {
        self.language = Some(language);
        self
    }

    /// Apply environment overrides and finish the configuration.
    pub async fn build(self) -> Config {
        let api_key = env_or(ENV_API_KEY, self.api_key);
        let project_id = env_or(ENV_PROJECT_ID, self.project_id);
        let endpoint = std::env::var(ENV_ENDPOINT).ok().or(self.endpoint);

        let default_fields = self
            .default_fields
            .or_else(|| env_list(ENV_MASKED_FIELDS))
            .unwrap_or_else(|| {
                DEFAULT_MASKED_FIELDS
                    .iter()
                    .map(|f| f.to_string())
                    .collect()
            });
        let mask_rules = Arc::new(MaskRules::new(default_fields, self.additional_fields));

        let max_concurrency = env_parse(ENV_MAX_CONCURRENCY)
            .or(self.max_concurrency)
            .unwrap_or(10)
            .max(1);

        let server = match self.server {
            Some(server) => server,
            None => ServerInfo::detect().await,
        };
        let language = match self.language {
            Some(language) => language,
            None => LanguageInfo::detect().await,
        };

        Config {
            api_key,
            project_id,
            endpoint,
            debug: self.debug,
            mask_rules,
            async_dispatch: env_parse(ENV_ASYNC).unwrap_or(self.async_dispatch),
            max_concurrency,
            queue_capacity: self.queue_capacity.unwrap_or(max_concurrency * 4),
            overflow_policy: self.overflow_policy.unwrap_or_default(),
            batch_errors_enabled: self.batch_errors_enabled,
            batch_size: env_parse(ENV_BATCH_SIZE)
                .or(self.batch_size)
                .unwrap_or(20)
                .max(1),
            flush_interval: env_parse(ENV_FLUSH_INTERVAL_MS)
                .map(Duration::from_millis)
                .or(self.flush_interval)
                .unwrap_or(Duration::from_secs(60)),
            ignored_environments: env_list(ENV_IGNORED_ENVIRONMENTS)
                .or(self.ignored_environments)
                .unwrap_or_else(|| vec!["local".to_string(), "development".to_string()]),
            environment: std::env::var(ENV_ENV).ok().or(self.environment),
            sdk_name: env_or(ENV_SDK_NAME, self.sdk_name.unwrap_or_else(|| SDK_NAME.to_string())),
            sdk_version: env_or(
                ENV_SDK_VERSION,
                self.sdk_version.unwrap_or_else(|| crate::VERSION.to_string()),
            ),
            server,
            language,
        }
    }
}

const ENV_API_KEY: &str = "APIPULSE_API_KEY";
const ENV_PROJECT_ID: &str = "APIPULSE_PROJECT_ID";
const ENV_ENDPOINT: &str = "APIPULSE_ENDPOINT";
const ENV_MASKED_FIELDS: &str = "APIPULSE_MASKED_FIELDS";
const ENV_BATCH_SIZE: &str = "APIPULSE_BATCH_SIZE";
const ENV_FLUSH_INTERVAL_MS: &str = "APIPULSE_FLUSH_INTERVAL_MS";
const ENV_ASYNC: &str = "APIPULSE_ASYNC";
const ENV_MAX_CONCURRENCY: &str = "APIPULSE_MAX_CONCURRENCY";
const ENV_IGNORED_ENVIRONMENTS: &str = "APIPULSE_IGNORED_ENVIRONMENTS";
const ENV_ENV: &str = "APIPULSE_ENV";
const ENV_SDK_NAME: &str = "APIPULSE_SDK_NAME";
const ENV_SDK_VERSION: &str = "APIPULSE_SDK_VERSION";

fn env_or(key: &str, fallback: String) -> String {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => fallback,
    }
}

fn env_list(key: &str) -> Option<Vec<String>> {
    let raw = std::env::var(key).ok()?;
    let list: Vec<String> = raw
        .split(',')
        .map(|entry| entry.trim().to_string())
        .filter(|entry| !entry.is_empty())
        .collect();
    if list.is_empty() {
        None
    } else {
        Some(list)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = key, value = %raw, "ignoring unparseable override");
            None
        }
    }
}
