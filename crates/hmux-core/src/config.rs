use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use hmux_store::{Client, LockOptions, LockerClient};
use serde::{Deserialize, Serialize};

use crate::draw::DrawSource;
use crate::error::{MuxError, MuxResult};

/// Prefix used for mapping keys when none is configured.
pub const DEFAULT_HASH_KEY_PREFIX: &str = "hmk-";

/// TTL of the per-hash lock when none is configured.
pub const DEFAULT_WITH_LOCK_ON_TTL: Duration = Duration::from_secs(3);

/// Tunables of a mux.
///
/// Durations are encoded as integer milliseconds, so a TOML file looks like:
///
/// ```toml
/// hash_key_prefix = "hmk-"
/// hash_map_ttl = 60000
/// with_lock_on_ttl = 3000
///
/// [lock]
/// min_backoff = 16
/// max_backoff = 64
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxConfig {
    /// Prefix added to each hash to build its mapping key.
    /// Default: `"hmk-"`; an empty prefix is replaced by the default.
    pub hash_key_prefix: String,
    /// TTL of hash → backend mappings. Default: none, mappings never expire.
    #[serde(
        with = "hmux_types::duration::option_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub hash_map_ttl: Option<Duration>,
    /// TTL of the lock taken by `with_lock_on`. Default: 3s.
    #[serde(with = "hmux_types::duration::millis")]
    pub with_lock_on_ttl: Duration,
    /// Retry policy of the lock taken by `with_lock_on`.
    /// Default: exponential backoff from 16ms to 64ms.
    pub lock: LockOptions,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            hash_key_prefix: DEFAULT_HASH_KEY_PREFIX.to_string(),
            hash_map_ttl: None,
            with_lock_on_ttl: DEFAULT_WITH_LOCK_ON_TTL,
            lock: LockOptions::default(),
        }
    }
}

impl MuxConfig {
    /// Parse a TOML document. Missing fields take their defaults.
    pub fn from_toml_str(input: &str) -> MuxResult<Self> {
        let config: Self = toml::from_str(input)?;
        Ok(config.normalized())
    }

    pub fn to_toml_string(&self) -> MuxResult<String> {
        Ok(toml::to_string(self)?)
    }

    /// Copy with unset or zero fields replaced by their defaults.
    pub fn normalized(mut self) -> Self {
        let defaults = LockOptions::default();
        if self.hash_key_prefix.is_empty() {
            self.hash_key_prefix = DEFAULT_HASH_KEY_PREFIX.to_string();
        }
        self.hash_map_ttl = self.hash_map_ttl.filter(|ttl| !ttl.is_zero());
        if self.with_lock_on_ttl.is_zero() {
            self.with_lock_on_ttl = DEFAULT_WITH_LOCK_ON_TTL;
        }
        if self.lock.min_backoff.is_zero() {
            self.lock.min_backoff = defaults.min_backoff;
        }
        if self.lock.max_backoff.is_zero() {
            self.lock.max_backoff = defaults.max_backoff;
        }
        self.lock.max_wait = self.lock.max_wait.filter(|wait| !wait.is_zero());
        self
    }

    pub fn validate(&self) -> MuxResult<()> {
        if self.lock.min_backoff > self.lock.max_backoff {
            return Err(MuxError::Config(format!(
                "lock min_backoff {:?} exceeds max_backoff {:?}",
                self.lock.min_backoff, self.lock.max_backoff
            )));
        }
        Ok(())
    }
}

/// Everything needed to build a [`BaseMux`](crate::BaseMux).
#[derive(Clone, Default)]
pub struct MuxOptions {
    /// Coordination store holding hash assignments and locks. Required.
    pub hash_client: Option<Arc<dyn LockerClient>>,
    /// Backends to multiplex over. At least one is required.
    pub clients: Vec<Arc<dyn Client>>,
    pub config: MuxConfig,
    /// Source of assignment draws. Default: an entropy-seeded
    /// [`RngDraw`](crate::RngDraw).
    pub draw: Option<Arc<dyn DrawSource>>,
}

impl MuxOptions {
    pub fn new(hash_client: Arc<dyn LockerClient>) -> Self {
        Self {
            hash_client: Some(hash_client),
            ..Default::default()
        }
    }

    pub fn client(mut self, client: Arc<dyn Client>) -> Self {
        self.clients.push(client);
        self
    }

    pub fn clients(mut self, clients: impl IntoIterator<Item = Arc<dyn Client>>) -> Self {
        self.clients.extend(clients);
        self
    }

    pub fn config(mut self, config: MuxConfig) -> Self {
        self.config = config;
        self
    }

    pub fn hash_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.hash_key_prefix = prefix.into();
        self
    }

    pub fn hash_map_ttl(mut self, ttl: Duration) -> Self {
        self.config.hash_map_ttl = Some(ttl);
        self
    }

    pub fn with_lock_on_ttl(mut self, ttl: Duration) -> Self {
        self.config.with_lock_on_ttl = ttl;
        self
    }

    pub fn lock_options(mut self, lock: LockOptions) -> Self {
        self.config.lock = lock;
        self
    }

    pub fn draw(mut self, draw: Arc<dyn DrawSource>) -> Self {
        self.draw = Some(draw);
        self
    }

    pub fn validate(&self) -> MuxResult<()> {
        if self.hash_client.is_none() {
            return Err(MuxError::Config("hash client is required".into()));
        }
        if self.clients.is_empty() {
            return Err(MuxError::Config("at least one client is required".into()));
        }
        self.config.clone().normalized().validate()
    }
}

impl fmt::Debug for MuxOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MuxOptions")
            .field("hash_client", &self.hash_client.as_ref().and_then(|c| c.addr()))
            .field("clients", &self.clients.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmux_store::InMemoryStore;

    #[test]
    fn default_config() {
        let c = MuxConfig::default();
        assert_eq!(c.hash_key_prefix, "hmk-");
        assert_eq!(c.hash_map_ttl, None);
        assert_eq!(c.with_lock_on_ttl, Duration::from_secs(3));
        assert_eq!(c.lock.min_backoff, Duration::from_millis(16));
        assert_eq!(c.lock.max_backoff, Duration::from_millis(64));
    }

    #[test]
    fn normalized_fills_unset_fields() {
        let c = MuxConfig {
            hash_key_prefix: String::new(),
            hash_map_ttl: Some(Duration::ZERO),
            with_lock_on_ttl: Duration::ZERO,
            lock: LockOptions {
                min_backoff: Duration::ZERO,
                max_backoff: Duration::ZERO,
                max_wait: Some(Duration::ZERO),
            },
        }
        .normalized();
        assert_eq!(c, MuxConfig::default());
    }

    #[test]
    fn partial_toml_takes_defaults() {
        let c = MuxConfig::from_toml_str(
            r#"
            hash_map_ttl = 60000

            [lock]
            max_backoff = 80
            "#,
        )
        .unwrap();
        assert_eq!(c.hash_key_prefix, "hmk-");
        assert_eq!(c.hash_map_ttl, Some(Duration::from_secs(60)));
        assert_eq!(c.with_lock_on_ttl, Duration::from_secs(3));
        assert_eq!(c.lock.min_backoff, Duration::from_millis(16));
        assert_eq!(c.lock.max_backoff, Duration::from_millis(80));
    }

    #[test]
    fn toml_round_trip() {
        let c = MuxConfig {
            hash_key_prefix: "route-".into(),
            hash_map_ttl: Some(Duration::from_millis(1500)),
            ..Default::default()
        };
        let text = c.to_toml_string().unwrap();
        assert!(text.contains("hash_map_ttl = 1500"));
        assert_eq!(MuxConfig::from_toml_str(&text).unwrap(), c);
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = MuxConfig::from_toml_str("hash_map_ttl = \"soon\"").unwrap_err();
        assert!(matches!(err, MuxError::Parse(_)));
    }

    #[test]
    fn inverted_backoff_is_rejected() {
        let c = MuxConfig {
            lock: LockOptions {
                min_backoff: Duration::from_millis(100),
                max_backoff: Duration::from_millis(10),
                max_wait: None,
            },
            ..Default::default()
        };
        assert!(matches!(c.validate(), Err(MuxError::Config(_))));
    }

    #[test]
    fn options_require_hash_client() {
        let opts = MuxOptions::default().client(Arc::new(InMemoryStore::new("a:1")));
        let err = opts.validate().unwrap_err();
        assert!(err.to_string().contains("hash client is required"));
    }

    #[test]
    fn options_require_clients() {
        let opts = MuxOptions::new(Arc::new(InMemoryStore::new("a:1")));
        let err = opts.validate().unwrap_err();
        assert!(err.to_string().contains("at least one client is required"));
    }

    #[test]
    fn builder_sets_config_fields() {
        let store = InMemoryStore::new("a:1");
        let opts = MuxOptions::new(Arc::new(store.clone()))
            .client(Arc::new(store))
            .hash_key_prefix("x-")
            .hash_map_ttl(Duration::from_secs(9))
            .with_lock_on_ttl(Duration::from_secs(1));
        assert!(opts.validate().is_ok());
        assert_eq!(opts.config.hash_key_prefix, "x-");
        assert_eq!(opts.config.hash_map_ttl, Some(Duration::from_secs(9)));
        assert_eq!(opts.config.with_lock_on_ttl, Duration::from_secs(1));
        assert!(format!("{opts:?}").contains("a:1"));
    }
}
