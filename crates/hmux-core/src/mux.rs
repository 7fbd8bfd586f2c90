//! Sticky hash → backend routing.
//!
//! The first time a hash is routed, a backend is drawn at random and the
//! choice is written to the coordination store under `prefix + hash`. Later
//! calls read it back. Draws for one hash are serialized by a per-hash lock
//! in that same store, so every process sharing it agrees on one backend.

use std::convert::identity;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use hmux_store::{Client, ErrClient, LockOptions, LockerClient, Pipeline, StoreError, StoreResult};
use hmux_types::{BackendId, Hash, OpContext};
use tracing::{debug, warn};

use crate::config::{MuxConfig, MuxOptions};
use crate::draw::{DrawSource, RngDraw};
use crate::error::{MuxError, MuxResult};
use crate::gate::LockGate;
use crate::registry::BackendRegistry;

/// Routes hashes to backends.
///
/// Routing never returns an error directly: failures come back as an
/// always-failing handle (see [`Client::failure`]) so callers handle routing
/// and store failures in one place.
pub trait Mux: Send + Sync + fmt::Debug {
    /// Every backend, in registration order.
    fn all(&self) -> &[Arc<dyn Client>];

    /// The backend `hash` is currently mapped to, without locking or drawing.
    ///
    /// `None` if unmapped or mapped to an unknown backend.
    fn get_mapping(&self, hash: &Hash) -> Option<Arc<dyn Client>>;

    /// Forget the mapping of `hash`.
    fn invalidate(&self, hash: &Hash) -> StoreResult<()>;

    fn invalidate_many(&self, hashes: &[Hash]) -> StoreResult<()>;

    /// The backend for `hash`, drawing and recording one if unmapped.
    fn on(&self, hash: &Hash) -> Arc<dyn Client>;

    /// The backend for `hash`, with every satellite rebound to it.
    ///
    /// Only `hash` is locked. On failure the primary mapping may already be
    /// recorded while satellites are not; retrying is safe.
    fn on_many(&self, hash: &Hash, satellites: &[Hash]) -> Arc<dyn Client>;

    /// Record `client` as the backend of `hash` and return it.
    ///
    /// Always-failing handles are passed through untouched.
    fn save_mapping(&self, client: Arc<dyn Client>, hash: &Hash) -> Arc<dyn Client>;

    /// Record `client` as the backend of `hash` and every hash in `many`.
    fn save_mappings(&self, client: Arc<dyn Client>, hash: &Hash, many: &[Hash]) -> Arc<dyn Client>;

    /// A mux over the same backends whose store operations run under `ctx`.
    fn with_context(&self, ctx: &OpContext) -> Arc<dyn Mux>;
}

/// The standard [`Mux`].
#[derive(Clone)]
pub struct BaseMux {
    registry: BackendRegistry,
    hash_client: Arc<dyn LockerClient>,
    gate: LockGate,
    config: MuxConfig,
    draw: Arc<dyn DrawSource>,
}

impl BaseMux {
    pub fn new(opts: MuxOptions) -> MuxResult<Self> {
        let MuxOptions {
            hash_client,
            clients,
            config,
            draw,
        } = opts;
        let hash_client = hash_client.ok_or_else(|| MuxError::Config("hash client is required".into()))?;
        let registry = BackendRegistry::new(clients)?;
        let config = config.normalized();
        config.validate()?;

        let gate = LockGate::new(Arc::clone(&hash_client), config.with_lock_on_ttl, config.lock);
        let draw = draw.unwrap_or_else(|| Arc::new(RngDraw::from_entropy()));
        debug!(
            backends = registry.len(),
            prefix = %config.hash_key_prefix,
            "mux ready"
        );
        Ok(Self {
            registry,
            hash_client,
            gate,
            config,
            draw,
        })
    }

    pub fn config(&self) -> &MuxConfig {
        &self.config
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn hash_client(&self) -> &Arc<dyn LockerClient> {
        &self.hash_client
    }

    pub fn hash_key_prefix(&self) -> &str {
        &self.config.hash_key_prefix
    }

    pub fn hash_map_ttl(&self) -> Option<Duration> {
        self.config.hash_map_ttl
    }

    pub fn with_lock_on_ttl(&self) -> Duration {
        self.config.with_lock_on_ttl
    }

    pub fn lock_options(&self) -> &LockOptions {
        &self.config.lock
    }

    /// Coordination store key holding the mapping of `hash`.
    pub fn key_for(&self, hash: &Hash) -> String {
        hash.key_with_prefix(&self.config.hash_key_prefix)
    }

    /// Run `f` while holding the lock on `hash`.
    pub fn with_lock_on<T>(&self, hash: &Hash, f: impl FnOnce() -> T) -> StoreResult<T> {
        self.gate.with_lock_on(hash, f)
    }

    /// Same as [`Mux::with_context`], keeping the concrete type.
    pub fn bind(&self, ctx: &OpContext) -> Self {
        let hash_client = self.hash_client.with_locker_context(ctx);
        Self {
            registry: self.registry.bind(ctx),
            gate: self.gate.bind(Arc::clone(&hash_client)),
            hash_client,
            config: self.config.clone(),
            draw: Arc::clone(&self.draw),
        }
    }

    // ---- Resolution ----

    /// Read the mapping of `hash`. Unknown backends count as unmapped.
    fn lookup(&self, hash: &Hash) -> StoreResult<Option<(BackendId, Arc<dyn Client>)>> {
        let Some(addr) = self.hash_client.get(&self.key_for(hash))? else {
            return Ok(None);
        };
        match self.registry.lookup(&addr) {
            Some((id, client)) => Ok(Some((id.clone(), Arc::clone(client)))),
            None => {
                warn!(hash = %hash, backend = %addr, "mapping points at unknown backend, redrawing");
                Ok(None)
            }
        }
    }

    /// Existing mapping of `hash`, or a fresh draw recorded in the store.
    ///
    /// Callers hold the lock on `hash`.
    fn resolve(&self, hash: &Hash) -> StoreResult<(BackendId, Arc<dyn Client>)> {
        if let Some(found) = self.lookup(hash)? {
            debug!(hash = %hash, backend = %found.0, "mapping hit");
            return Ok(found);
        }
        let index = self.draw.draw(self.registry.len());
        let (id, client) = self
            .registry
            .get(index)
            .ok_or_else(|| StoreError::Routing(format!("draw {index} out of range for {} backends", self.registry.len())))?;
        self.persist_mapping(id, hash)?;
        debug!(hash = %hash, backend = %id, index, "backend drawn");
        Ok((id.clone(), Arc::clone(client)))
    }

    /// Resolve `hash` and bind every satellite to the same backend.
    ///
    /// Callers hold the lock on `hash`.
    fn extend(&self, hash: &Hash, satellites: &[Hash]) -> StoreResult<Arc<dyn Client>> {
        let (id, client) = self.resolve(hash)?;
        self.persist_group(&id, hash, satellites)?;
        debug!(hash = %hash, backend = %id, satellites = satellites.len(), "group extended");
        Ok(client)
    }

    fn persist_mapping(&self, id: &BackendId, hash: &Hash) -> StoreResult<()> {
        self.hash_client
            .set(&self.key_for(hash), id.as_str(), self.config.hash_map_ttl)
    }

    /// Write satellite mappings and, with a mapping TTL, refresh it on the
    /// primary and every satellite in one atomic batch.
    fn persist_group(&self, id: &BackendId, hash: &Hash, satellites: &[Hash]) -> StoreResult<()> {
        let keys: Vec<String> = satellites.iter().map(|s| self.key_for(s)).collect();
        let Some(ttl) = self.config.hash_map_ttl else {
            if keys.is_empty() {
                return Ok(());
            }
            let pairs: Vec<(&str, &str)> = keys.iter().map(|k| (k.as_str(), id.as_str())).collect();
            return self.hash_client.mset(&pairs);
        };

        let mut pipe = Pipeline::new();
        if !keys.is_empty() {
            pipe.mset(keys.iter().map(|k| (k.clone(), id.to_string())).collect());
        }
        pipe.pexpire(self.key_for(hash), ttl);
        for key in keys {
            pipe.pexpire(key, ttl);
        }
        self.hash_client.exec(&pipe)
    }

    fn known_backend(&self, client: &dyn Client) -> StoreResult<BackendId> {
        if let Some(err) = client.failure() {
            return Err(err.clone());
        }
        let addr = client
            .addr()
            .ok_or_else(|| StoreError::Routing("client has no address".into()))?;
        self.registry
            .lookup(addr)
            .map(|(id, _)| id.clone())
            .ok_or_else(|| StoreError::Routing(format!("{addr} is not a registered backend")))
    }

    fn or_fail(result: StoreResult<Arc<dyn Client>>) -> Arc<dyn Client> {
        result.unwrap_or_else(|err| Arc::new(ErrClient::new(err)))
    }
}

impl Mux for BaseMux {
    fn all(&self) -> &[Arc<dyn Client>] {
        self.registry.clients()
    }

    fn get_mapping(&self, hash: &Hash) -> Option<Arc<dyn Client>> {
        match self.lookup(hash) {
            Ok(found) => found.map(|(_, client)| client),
            Err(err) => Some(Arc::new(ErrClient::new(err))),
        }
    }

    fn invalidate(&self, hash: &Hash) -> StoreResult<()> {
        self.hash_client.del(&[&self.key_for(hash)])?;
        debug!(hash = %hash, "mapping invalidated");
        Ok(())
    }

    fn invalidate_many(&self, hashes: &[Hash]) -> StoreResult<()> {
        if hashes.is_empty() {
            return Ok(());
        }
        let keys: Vec<String> = hashes.iter().map(|h| self.key_for(h)).collect();
        let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
        self.hash_client.del(&keys)?;
        debug!(count = hashes.len(), "mappings invalidated");
        Ok(())
    }

    fn on(&self, hash: &Hash) -> Arc<dyn Client> {
        Self::or_fail(
            self.with_lock_on(hash, || self.resolve(hash).map(|(_, client)| client))
                .and_then(identity),
        )
    }

    fn on_many(&self, hash: &Hash, satellites: &[Hash]) -> Arc<dyn Client> {
        Self::or_fail(
            self.with_lock_on(hash, || self.extend(hash, satellites))
                .and_then(identity),
        )
    }

    fn save_mapping(&self, client: Arc<dyn Client>, hash: &Hash) -> Arc<dyn Client> {
        if client.failure().is_some() {
            return client;
        }
        Self::or_fail(
            self.known_backend(client.as_ref())
                .and_then(|id| self.persist_mapping(&id, hash))
                .map(|()| client),
        )
    }

    fn save_mappings(&self, client: Arc<dyn Client>, hash: &Hash, many: &[Hash]) -> Arc<dyn Client> {
        if client.failure().is_some() {
            return client;
        }
        Self::or_fail(
            self.known_backend(client.as_ref())
                .and_then(|id| {
                    self.persist_mapping(&id, hash)?;
                    self.persist_group(&id, hash, many)
                })
                .map(|()| client),
        )
    }

    fn with_context(&self, ctx: &OpContext) -> Arc<dyn Mux> {
        Arc::new(self.bind(ctx))
    }
}

impl fmt::Debug for BaseMux {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseMux")
            .field("backends", &self.registry.ids())
            .field("hash_client", &self.hash_client.addr())
            .field("config", &self.config)
            .finish()
    }
}
