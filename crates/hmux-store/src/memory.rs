//! In-memory store for tests, embedding and simulation.
//!
//! [`InMemoryStore`] keeps typed values in a `HashMap` behind a `RwLock` and
//! implements both [`Client`] and [`Locker`]. Handles are cheap to clone and
//! every clone (including context-bound copies from `with_context`) sees the
//! same data, the way connections to one server would. Expired keys are
//! treated as absent on read and purged on the next write touching them.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use hmux_types::OpContext;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::lock::LockOptions;
use crate::pipeline::{Pipeline, PipelineOp};
use crate::traits::{Client, Lock, Locker, LockerClient};
use crate::value::{KeyTtl, ScoreRange, ScoredMember};

#[derive(Clone, Debug)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    List(VecDeque<String>),
    Set(BTreeSet<String>),
    /// Kept sorted by (score, member).
    ZSet(Vec<ScoredMember>),
}

#[derive(Clone, Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn persistent(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

type Keyspace = HashMap<String, Entry>;

struct Shared {
    data: RwLock<Keyspace>,
    failpoints: RwLock<HashMap<String, StoreError>>,
    closed: AtomicBool,
    commands: AtomicU64,
}

/// An in-memory, Redis-like store.
///
/// `addr` plays the role of the server address: it identifies the store in
/// mux mappings.
#[derive(Clone)]
pub struct InMemoryStore {
    addr: String,
    shared: Arc<Shared>,
    ctx: OpContext,
}

impl InMemoryStore {
    /// Create an empty store identified by `addr`.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            shared: Arc::new(Shared {
                data: RwLock::new(HashMap::new()),
                failpoints: RwLock::new(HashMap::new()),
                closed: AtomicBool::new(false),
                commands: AtomicU64::new(0),
            }),
            ctx: OpContext::background(),
        }
    }

    /// A handle to the same data whose operations run under `ctx`.
    pub fn bound(&self, ctx: &OpContext) -> Self {
        Self {
            addr: self.addr.clone(),
            shared: Arc::clone(&self.shared),
            ctx: ctx.clone(),
        }
    }

    /// Make every subsequent `command` fail with `err` until cleared.
    ///
    /// Command names are the lowercase command (`"get"`, `"set"`, `"exec"`,
    /// ...); lock operations use `"obtain"` and `"release"`.
    pub fn fail_command(&self, command: &str, err: StoreError) {
        if let Ok(mut points) = self.shared.failpoints.write() {
            points.insert(command.to_string(), err);
        }
    }

    pub fn clear_failure(&self, command: &str) {
        if let Ok(mut points) = self.shared.failpoints.write() {
            points.remove(command);
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut points) = self.shared.failpoints.write() {
            points.clear();
        }
    }

    /// Total commands received by this store across all handles.
    pub fn command_count(&self) -> u64 {
        self.shared.commands.load(Ordering::Relaxed)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.shared
            .data
            .read()
            .map(|map| map.values().filter(|e| e.is_live(now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every key.
    pub fn flush_all(&self) -> StoreResult<()> {
        self.write_with("flushall", |map, _| {
            map.clear();
            Ok(())
        })
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    fn begin(&self, command: &'static str) -> StoreResult<()> {
        self.shared.commands.fetch_add(1, Ordering::Relaxed);
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        if self.ctx.is_expired() {
            return Err(StoreError::DeadlineExceeded { command });
        }
        let points = self.shared.failpoints.read().map_err(poisoned)?;
        if let Some(err) = points.get(command) {
            return Err(err.clone());
        }
        trace!(addr = %self.addr, command, "store command");
        Ok(())
    }

    fn read_with<T>(&self, command: &'static str, f: impl FnOnce(&Keyspace, Instant) -> StoreResult<T>) -> StoreResult<T> {
        let _span = self.ctx.span().enter();
        self.begin(command)?;
        let map = self.shared.data.read().map_err(poisoned)?;
        f(&map, Instant::now())
    }

    fn write_with<T>(
        &self,
        command: &'static str,
        f: impl FnOnce(&mut Keyspace, Instant) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let _span = self.ctx.span().enter();
        self.begin(command)?;
        let mut map = self.shared.data.write().map_err(poisoned)?;
        f(&mut map, Instant::now())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new("memory:0")
    }
}

impl fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("addr", &self.addr)
            .field("key_count", &self.len())
            .finish()
    }
}

fn poisoned<E: fmt::Display>(e: E) -> StoreError {
    StoreError::Unavailable(format!("lock poisoned: {e}"))
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
    }
}

fn expiry(now: Instant, ttl: Option<Duration>) -> Option<Instant> {
    ttl.filter(|t| !t.is_zero()).map(|t| now + t)
}

// ---------------------------------------------------------------------------
// Keyspace helpers
// ---------------------------------------------------------------------------

fn live<'a>(map: &'a Keyspace, key: &str, now: Instant) -> Option<&'a Value> {
    map.get(key).filter(|e| e.is_live(now)).map(|e| &e.value)
}

/// Live entry for `key`, purging it first if it expired.
fn live_mut<'a>(map: &'a mut Keyspace, key: &str, now: Instant) -> Option<&'a mut Entry> {
    if map.get(key).is_some_and(|e| !e.is_live(now)) {
        map.remove(key);
    }
    map.get_mut(key)
}

/// Live value for `key`, created with `init` if absent.
fn value_or_insert<'a>(map: &'a mut Keyspace, key: &str, now: Instant, init: fn() -> Value) -> &'a mut Value {
    if map.get(key).is_some_and(|e| !e.is_live(now)) {
        map.remove(key);
    }
    &mut map
        .entry(key.to_string())
        .or_insert_with(|| Entry::persistent(init()))
        .value
}

/// Drop `key` if its container became empty.
fn drop_if_empty(map: &mut Keyspace, key: &str) {
    let empty = match map.get(key).map(|e| &e.value) {
        Some(Value::Hash(h)) => h.is_empty(),
        Some(Value::List(l)) => l.is_empty(),
        Some(Value::Set(s)) => s.is_empty(),
        Some(Value::ZSet(z)) => z.is_empty(),
        _ => false,
    };
    if empty {
        map.remove(key);
    }
}

fn read_str(map: &Keyspace, key: &str, now: Instant) -> StoreResult<Option<String>> {
    match live(map, key, now) {
        None => Ok(None),
        Some(Value::Str(s)) => Ok(Some(s.clone())),
        Some(_) => Err(wrong_type(key)),
    }
}

fn read_hash<'a>(map: &'a Keyspace, key: &str, now: Instant) -> StoreResult<Option<&'a HashMap<String, String>>> {
    match live(map, key, now) {
        None => Ok(None),
        Some(Value::Hash(h)) => Ok(Some(h)),
        Some(_) => Err(wrong_type(key)),
    }
}

fn read_list<'a>(map: &'a Keyspace, key: &str, now: Instant) -> StoreResult<Option<&'a VecDeque<String>>> {
    match live(map, key, now) {
        None => Ok(None),
        Some(Value::List(l)) => Ok(Some(l)),
        Some(_) => Err(wrong_type(key)),
    }
}

fn read_set<'a>(map: &'a Keyspace, key: &str, now: Instant) -> StoreResult<Option<&'a BTreeSet<String>>> {
    match live(map, key, now) {
        None => Ok(None),
        Some(Value::Set(s)) => Ok(Some(s)),
        Some(_) => Err(wrong_type(key)),
    }
}

fn read_zset<'a>(map: &'a Keyspace, key: &str, now: Instant) -> StoreResult<Option<&'a Vec<ScoredMember>>> {
    match live(map, key, now) {
        None => Ok(None),
        Some(Value::ZSet(z)) => Ok(Some(z)),
        Some(_) => Err(wrong_type(key)),
    }
}

fn write_str(map: &mut Keyspace, key: &str, value: &str, expires_at: Option<Instant>) {
    map.insert(
        key.to_string(),
        Entry {
            value: Value::Str(value.to_string()),
            expires_at,
        },
    );
}

fn delete_keys(map: &mut Keyspace, keys: &[&str], now: Instant) -> u64 {
    keys.iter()
        .filter_map(|k| map.remove(*k))
        .filter(|e| e.is_live(now))
        .count() as u64
}

fn set_expiry(map: &mut Keyspace, key: &str, ttl: Duration, now: Instant) -> bool {
    if ttl.is_zero() {
        return map.remove(key).is_some_and(|e| e.is_live(now));
    }
    match live_mut(map, key, now) {
        Some(entry) => {
            entry.expires_at = Some(now + ttl);
            true
        }
        None => false,
    }
}

/// Resolve Redis-style inclusive `[start, stop]` indices over `len` items.
fn index_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

fn zsort(z: &mut [ScoredMember]) {
    z.sort_by(|a, b| a.score.total_cmp(&b.score).then_with(|| a.member.cmp(&b.member)));
}

/// Validate and apply a pipeline step. Steps are applied to a scratch copy by
/// the caller, so an error leaves the real keyspace untouched.
fn apply_op(map: &mut Keyspace, op: &PipelineOp, now: Instant) -> StoreResult<()> {
    match op {
        PipelineOp::Set { key, value, ttl } => write_str(map, key, value, expiry(now, *ttl)),
        PipelineOp::MSet { pairs } => {
            if pairs.is_empty() {
                return Err(StoreError::InvalidArgument("mset requires at least one pair".into()));
            }
            for (k, v) in pairs {
                write_str(map, k, v, None);
            }
        }
        PipelineOp::PExpire { key, ttl } => {
            set_expiry(map, key, *ttl, now);
        }
        PipelineOp::Del { keys } => {
            let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
            delete_keys(map, &keys, now);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

impl Client for InMemoryStore {
    fn addr(&self) -> Option<&str> {
        Some(&self.addr)
    }

    fn context(&self) -> &OpContext {
        &self.ctx
    }

    fn with_context(&self, ctx: &OpContext) -> Arc<dyn Client> {
        Arc::new(self.bound(ctx))
    }

    fn ping(&self) -> StoreResult<()> {
        self.read_with("ping", |_, _| Ok(()))
    }

    fn close(&self) -> StoreResult<()> {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return Err(StoreError::Closed);
        }
        debug!(addr = %self.addr, "store closed");
        Ok(())
    }

    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.read_with("get", |map, now| read_str(map, key, now))
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        self.write_with("set", |map, now| {
            write_str(map, key, value, expiry(now, ttl));
            Ok(())
        })
    }

    fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<bool> {
        self.write_with("setnx", |map, now| {
            if live_mut(map, key, now).is_some() {
                return Ok(false);
            }
            write_str(map, key, value, expiry(now, ttl));
            Ok(true)
        })
    }

    fn mget(&self, keys: &[&str]) -> StoreResult<Vec<Option<String>>> {
        self.read_with("mget", |map, now| {
            // MGET reports non-string values as missing rather than failing.
            Ok(keys
                .iter()
                .map(|k| match live(map, k, now) {
                    Some(Value::Str(s)) => Some(s.clone()),
                    _ => None,
                })
                .collect())
        })
    }

    fn mset(&self, pairs: &[(&str, &str)]) -> StoreResult<()> {
        if pairs.is_empty() {
            return Err(StoreError::InvalidArgument("mset requires at least one pair".into()));
        }
        self.write_with("mset", |map, _| {
            for (k, v) in pairs {
                write_str(map, k, v, None);
            }
            Ok(())
        })
    }

    fn del(&self, keys: &[&str]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Err(StoreError::InvalidArgument("del requires at least one key".into()));
        }
        self.write_with("del", |map, now| Ok(delete_keys(map, keys, now)))
    }

    fn exists(&self, keys: &[&str]) -> StoreResult<u64> {
        self.read_with("exists", |map, now| {
            Ok(keys.iter().filter(|k| live(map, k, now).is_some()).count() as u64)
        })
    }

    fn ttl(&self, key: &str) -> StoreResult<KeyTtl> {
        self.read_with("ttl", |map, now| {
            Ok(match map.get(key).filter(|e| e.is_live(now)) {
                None => KeyTtl::Missing,
                Some(Entry { expires_at: None, .. }) => KeyTtl::Persistent,
                Some(Entry {
                    expires_at: Some(at), ..
                }) => KeyTtl::Expires(at.saturating_duration_since(now)),
            })
        })
    }

    fn pexpire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.write_with("pexpire", |map, now| Ok(set_expiry(map, key, ttl, now)))
    }

    fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        self.read_with("hget", |map, now| {
            Ok(read_hash(map, key, now)?.and_then(|h| h.get(field).cloned()))
        })
    }

    fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<bool> {
        self.write_with("hset", |map, now| match value_or_insert(map, key, now, || Value::Hash(HashMap::new())) {
            Value::Hash(h) => Ok(h.insert(field.to_string(), value.to_string()).is_none()),
            _ => Err(wrong_type(key)),
        })
    }

    fn hmset(&self, key: &str, fields: &[(&str, &str)]) -> StoreResult<()> {
        if fields.is_empty() {
            return Err(StoreError::InvalidArgument("hmset requires at least one field".into()));
        }
        self.write_with("hmset", |map, now| match value_or_insert(map, key, now, || Value::Hash(HashMap::new())) {
            Value::Hash(h) => {
                for (f, v) in fields {
                    h.insert(f.to_string(), v.to_string());
                }
                Ok(())
            }
            _ => Err(wrong_type(key)),
        })
    }

    fn hmget(&self, key: &str, fields: &[&str]) -> StoreResult<Vec<Option<String>>> {
        self.read_with("hmget", |map, now| {
            let hash = read_hash(map, key, now)?;
            Ok(fields
                .iter()
                .map(|f| hash.and_then(|h| h.get(*f).cloned()))
                .collect())
        })
    }

    fn hdel(&self, key: &str, fields: &[&str]) -> StoreResult<u64> {
        self.write_with("hdel", |map, now| {
            let removed = match live_mut(map, key, now).map(|e| &mut e.value) {
                None => return Ok(0),
                Some(Value::Hash(h)) => fields.iter().filter(|f| h.remove(**f).is_some()).count() as u64,
                Some(_) => return Err(wrong_type(key)),
            };
            drop_if_empty(map, key);
            Ok(removed)
        })
    }

    fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        self.read_with("hgetall", |map, now| {
            Ok(read_hash(map, key, now)?.cloned().unwrap_or_default())
        })
    }

    fn rpush(&self, key: &str, values: &[&str]) -> StoreResult<u64> {
        if values.is_empty() {
            return Err(StoreError::InvalidArgument("rpush requires at least one value".into()));
        }
        self.write_with("rpush", |map, now| match value_or_insert(map, key, now, || Value::List(VecDeque::new())) {
            Value::List(l) => {
                l.extend(values.iter().map(|v| v.to_string()));
                Ok(l.len() as u64)
            }
            _ => Err(wrong_type(key)),
        })
    }

    fn lpop(&self, key: &str) -> StoreResult<Option<String>> {
        self.write_with("lpop", |map, now| {
            let popped = match live_mut(map, key, now).map(|e| &mut e.value) {
                None => return Ok(None),
                Some(Value::List(l)) => l.pop_front(),
                Some(_) => return Err(wrong_type(key)),
            };
            drop_if_empty(map, key);
            Ok(popped)
        })
    }

    fn lrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>> {
        self.read_with("lrange", |map, now| {
            let Some(list) = read_list(map, key, now)? else {
                return Ok(Vec::new());
            };
            Ok(match index_range(list.len(), start, stop) {
                Some((from, to)) => list.range(from..=to).cloned().collect(),
                None => Vec::new(),
            })
        })
    }

    fn rpoplpush(&self, source: &str, destination: &str) -> StoreResult<Option<String>> {
        self.write_with("rpoplpush", |map, now| {
            // Type-check the destination before mutating the source.
            if let Some(entry) = live_mut(map, destination, now) {
                if !matches!(entry.value, Value::List(_)) {
                    return Err(wrong_type(destination));
                }
            }
            let popped = match live_mut(map, source, now).map(|e| &mut e.value) {
                None => return Ok(None),
                Some(Value::List(l)) => l.pop_back(),
                Some(_) => return Err(wrong_type(source)),
            };
            drop_if_empty(map, source);
            if let Some(item) = &popped {
                if let Value::List(l) = value_or_insert(map, destination, now, || Value::List(VecDeque::new())) {
                    l.push_front(item.clone());
                }
            }
            Ok(popped)
        })
    }

    fn sadd(&self, key: &str, members: &[&str]) -> StoreResult<u64> {
        if members.is_empty() {
            return Err(StoreError::InvalidArgument("sadd requires at least one member".into()));
        }
        self.write_with("sadd", |map, now| match value_or_insert(map, key, now, || Value::Set(BTreeSet::new())) {
            Value::Set(s) => Ok(members.iter().filter(|m| s.insert(m.to_string())).count() as u64),
            _ => Err(wrong_type(key)),
        })
    }

    fn srem(&self, key: &str, members: &[&str]) -> StoreResult<u64> {
        self.write_with("srem", |map, now| {
            let removed = match live_mut(map, key, now).map(|e| &mut e.value) {
                None => return Ok(0),
                Some(Value::Set(s)) => members.iter().filter(|m| s.remove(**m)).count() as u64,
                Some(_) => return Err(wrong_type(key)),
            };
            drop_if_empty(map, key);
            Ok(removed)
        })
    }

    fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        self.read_with("smembers", |map, now| {
            Ok(read_set(map, key, now)?
                .map(|s| s.iter().cloned().collect())
                .unwrap_or_default())
        })
    }

    fn sismember(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.read_with("sismember", |map, now| {
            Ok(read_set(map, key, now)?.is_some_and(|s| s.contains(member)))
        })
    }

    fn scard(&self, key: &str) -> StoreResult<u64> {
        self.read_with("scard", |map, now| {
            Ok(read_set(map, key, now)?.map_or(0, |s| s.len() as u64))
        })
    }

    fn zadd(&self, key: &str, members: &[ScoredMember]) -> StoreResult<u64> {
        if members.is_empty() {
            return Err(StoreError::InvalidArgument("zadd requires at least one member".into()));
        }
        if members.iter().any(|m| m.score.is_nan()) {
            return Err(StoreError::InvalidArgument("zadd score is not a number".into()));
        }
        self.write_with("zadd", |map, now| match value_or_insert(map, key, now, || Value::ZSet(Vec::new())) {
            Value::ZSet(z) => {
                let mut added = 0;
                for m in members {
                    match z.iter_mut().find(|existing| existing.member == m.member) {
                        Some(existing) => existing.score = m.score,
                        None => {
                            z.push(m.clone());
                            added += 1;
                        }
                    }
                }
                zsort(z);
                Ok(added)
            }
            _ => Err(wrong_type(key)),
        })
    }

    fn zrem(&self, key: &str, members: &[&str]) -> StoreResult<u64> {
        self.write_with("zrem", |map, now| {
            let removed = match live_mut(map, key, now).map(|e| &mut e.value) {
                None => return Ok(0),
                Some(Value::ZSet(z)) => {
                    let before = z.len();
                    z.retain(|m| !members.contains(&m.member.as_str()));
                    (before - z.len()) as u64
                }
                Some(_) => return Err(wrong_type(key)),
            };
            drop_if_empty(map, key);
            Ok(removed)
        })
    }

    fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<f64>> {
        self.read_with("zscore", |map, now| {
            Ok(read_zset(map, key, now)?
                .and_then(|z| z.iter().find(|m| m.member == member))
                .map(|m| m.score))
        })
    }

    fn zcard(&self, key: &str) -> StoreResult<u64> {
        self.read_with("zcard", |map, now| {
            Ok(read_zset(map, key, now)?.map_or(0, |z| z.len() as u64))
        })
    }

    fn zrank(&self, key: &str, member: &str) -> StoreResult<Option<u64>> {
        self.read_with("zrank", |map, now| {
            Ok(read_zset(map, key, now)?
                .and_then(|z| z.iter().position(|m| m.member == member))
                .map(|i| i as u64))
        })
    }

    fn zrange_by_score(&self, key: &str, range: ScoreRange) -> StoreResult<Vec<String>> {
        Ok(self
            .zrange_by_score_with_scores(key, range)?
            .into_iter()
            .map(|m| m.member)
            .collect())
    }

    fn zrange_by_score_with_scores(&self, key: &str, range: ScoreRange) -> StoreResult<Vec<ScoredMember>> {
        self.read_with("zrangebyscore", |map, now| {
            Ok(read_zset(map, key, now)?
                .map(|z| z.iter().filter(|m| range.contains(m.score)).cloned().collect())
                .unwrap_or_default())
        })
    }

    fn zrev_range_by_score(&self, key: &str, range: ScoreRange) -> StoreResult<Vec<String>> {
        let mut members = self.zrange_by_score(key, range)?;
        members.reverse();
        Ok(members)
    }

    fn exec(&self, pipeline: &Pipeline) -> StoreResult<()> {
        if pipeline.is_empty() {
            return Ok(());
        }
        // Fail points registered for individual steps abort the whole batch.
        {
            let points = self.shared.failpoints.read().map_err(poisoned)?;
            if let Some(err) = pipeline.ops().iter().find_map(|op| points.get(op.name())) {
                return Err(err.clone());
            }
        }
        self.write_with("exec", |map, now| {
            let mut scratch = map.clone();
            for op in pipeline.ops() {
                apply_op(&mut scratch, op, now)?;
            }
            *map = scratch;
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// Locking
// ---------------------------------------------------------------------------

/// A lock held in an [`InMemoryStore`], identified by a random token.
pub struct MemoryLock {
    store: InMemoryStore,
    key: String,
    token: String,
}

impl fmt::Debug for MemoryLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryLock")
            .field("addr", &self.store.addr)
            .field("key", &self.key)
            .finish()
    }
}

impl Lock for MemoryLock {
    fn key(&self) -> &str {
        &self.key
    }

    fn release(&self) -> StoreResult<()> {
        self.store.write_with("release", |map, now| {
            let held = matches!(
                live(map, &self.key, now),
                Some(Value::Str(token)) if *token == self.token
            );
            if !held {
                return Err(StoreError::LockNotHeld {
                    key: self.key.clone(),
                });
            }
            map.remove(&self.key);
            Ok(())
        })
    }
}

impl Locker for InMemoryStore {
    fn obtain(&self, key: &str, ttl: Duration, opts: &LockOptions) -> StoreResult<Option<Box<dyn Lock>>> {
        if ttl.is_zero() {
            return Err(StoreError::InvalidArgument("lock ttl must be positive".into()));
        }
        let token = Uuid::now_v7().to_string();
        let mut deadline = Instant::now() + opts.wait_window(ttl);
        if let Some(ctx_deadline) = self.ctx.deadline() {
            deadline = deadline.min(ctx_deadline);
        }
        let mut backoff = opts.backoff();
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let acquired = self.write_with("obtain", |map, now| {
                if live_mut(map, key, now).is_some() {
                    return Ok(false);
                }
                write_str(map, key, &token, Some(now + ttl));
                Ok(true)
            })?;
            if acquired {
                trace!(addr = %self.addr, key, attempts, "lock obtained");
                return Ok(Some(Box::new(MemoryLock {
                    store: self.clone(),
                    key: key.to_string(),
                    token,
                })));
            }
            let delay = backoff.next().unwrap_or(opts.max_backoff);
            if Instant::now() + delay > deadline {
                debug!(addr = %self.addr, key, attempts, "lock not obtained");
                return Ok(None);
            }
            thread::sleep(delay);
        }
    }
}

impl LockerClient for InMemoryStore {
    fn with_locker_context(&self, ctx: &OpContext) -> Arc<dyn LockerClient> {
        Arc::new(self.bound(ctx))
    }
}
