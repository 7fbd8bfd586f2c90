use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use hmux_types::OpContext;

use crate::error::{StoreError, StoreResult};
use crate::pipeline::Pipeline;
use crate::traits::Client;
use crate::value::{KeyTtl, ScoreRange, ScoredMember};

/// A [`Client`] that fails every operation with the same error.
///
/// Returned by a mux when routing fails, so callers handle routing failures
/// and store failures through the same `Result`.
#[derive(Clone, Debug)]
pub struct ErrClient {
    err: StoreError,
    ctx: OpContext,
}

impl ErrClient {
    pub fn new(err: StoreError) -> Self {
        Self {
            err,
            ctx: OpContext::background(),
        }
    }

    pub fn error(&self) -> &StoreError {
        &self.err
    }

    fn fail<T>(&self) -> StoreResult<T> {
        Err(self.err.clone())
    }
}

impl Client for ErrClient {
    fn addr(&self) -> Option<&str> {
        None
    }

    fn failure(&self) -> Option<&StoreError> {
        Some(&self.err)
    }

    fn context(&self) -> &OpContext {
        &self.ctx
    }

    fn with_context(&self, _ctx: &OpContext) -> Arc<dyn Client> {
        Arc::new(self.clone())
    }

    fn ping(&self) -> StoreResult<()> {
        self.fail()
    }

    fn close(&self) -> StoreResult<()> {
        self.fail()
    }

    fn get(&self, _key: &str) -> StoreResult<Option<String>> {
        self.fail()
    }

    fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> StoreResult<()> {
        self.fail()
    }

    fn set_nx(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> StoreResult<bool> {
        self.fail()
    }

    fn mget(&self, _keys: &[&str]) -> StoreResult<Vec<Option<String>>> {
        self.fail()
    }

    fn mset(&self, _pairs: &[(&str, &str)]) -> StoreResult<()> {
        self.fail()
    }

    fn del(&self, _keys: &[&str]) -> StoreResult<u64> {
        self.fail()
    }

    fn exists(&self, _keys: &[&str]) -> StoreResult<u64> {
        self.fail()
    }

    fn ttl(&self, _key: &str) -> StoreResult<KeyTtl> {
        self.fail()
    }

    fn pexpire(&self, _key: &str, _ttl: Duration) -> StoreResult<bool> {
        self.fail()
    }

    fn hget(&self, _key: &str, _field: &str) -> StoreResult<Option<String>> {
        self.fail()
    }

    fn hset(&self, _key: &str, _field: &str, _value: &str) -> StoreResult<bool> {
        self.fail()
    }

    fn hmset(&self, _key: &str, _fields: &[(&str, &str)]) -> StoreResult<()> {
        self.fail()
    }

    fn hmget(&self, _key: &str, _fields: &[&str]) -> StoreResult<Vec<Option<String>>> {
        self.fail()
    }

    fn hdel(&self, _key: &str, _fields: &[&str]) -> StoreResult<u64> {
        self.fail()
    }

    fn hgetall(&self, _key: &str) -> StoreResult<HashMap<String, String>> {
        self.fail()
    }

    fn rpush(&self, _key: &str, _values: &[&str]) -> StoreResult<u64> {
        self.fail()
    }

    fn lpop(&self, _key: &str) -> StoreResult<Option<String>> {
        self.fail()
    }

    fn lrange(&self, _key: &str, _start: i64, _stop: i64) -> StoreResult<Vec<String>> {
        self.fail()
    }

    fn rpoplpush(&self, _source: &str, _destination: &str) -> StoreResult<Option<String>> {
        self.fail()
    }

    fn sadd(&self, _key: &str, _members: &[&str]) -> StoreResult<u64> {
        self.fail()
    }

    fn srem(&self, _key: &str, _members: &[&str]) -> StoreResult<u64> {
        self.fail()
    }

    fn smembers(&self, _key: &str) -> StoreResult<Vec<String>> {
        self.fail()
    }

    fn sismember(&self, _key: &str, _member: &str) -> StoreResult<bool> {
        self.fail()
    }

    fn scard(&self, _key: &str) -> StoreResult<u64> {
        self.fail()
    }

    fn zadd(&self, _key: &str, _members: &[ScoredMember]) -> StoreResult<u64> {
        self.fail()
    }

    fn zrem(&self, _key: &str, _members: &[&str]) -> StoreResult<u64> {
        self.fail()
    }

    fn zscore(&self, _key: &str, _member: &str) -> StoreResult<Option<f64>> {
        self.fail()
    }

    fn zcard(&self, _key: &str) -> StoreResult<u64> {
        self.fail()
    }

    fn zrank(&self, _key: &str, _member: &str) -> StoreResult<Option<u64>> {
        self.fail()
    }

    fn zrange_by_score(&self, _key: &str, _range: ScoreRange) -> StoreResult<Vec<String>> {
        self.fail()
    }

    fn zrange_by_score_with_scores(&self, _key: &str, _range: ScoreRange) -> StoreResult<Vec<ScoredMember>> {
        self.fail()
    }

    fn zrev_range_by_score(&self, _key: &str, _range: ScoreRange) -> StoreResult<Vec<String>> {
        self.fail()
    }

    fn exec(&self, _pipeline: &Pipeline) -> StoreResult<()> {
        self.fail()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_operation_returns_the_same_error() {
        let err = StoreError::LockNotObtained { key: "h".into() };
        let client = ErrClient::new(err.clone());
        assert_eq!(client.get("k"), Err(err.clone()));
        assert_eq!(client.set("k", "v", None), Err(err.clone()));
        assert_eq!(client.hgetall("k"), Err(err.clone()));
        assert_eq!(client.lrange("k", 0, -1), Err(err.clone()));
        assert_eq!(client.zcard("k"), Err(err.clone()));
        assert_eq!(client.exec(&Pipeline::new()), Err(err.clone()));
        assert_eq!(client.close(), Err(err));
    }

    #[test]
    fn has_no_address_and_reports_failure() {
        let client = ErrClient::new(StoreError::Closed);
        assert_eq!(client.addr(), None);
        assert_eq!(client.failure(), Some(&StoreError::Closed));
    }

    #[test]
    fn with_context_keeps_failing() {
        let client = ErrClient::new(StoreError::Unavailable("down".into()));
        let bound = client.with_context(&OpContext::background());
        assert_eq!(bound.ping(), Err(StoreError::Unavailable("down".into())));
    }
}
