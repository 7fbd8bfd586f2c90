//! Batched commands executed atomically by [`Client::exec`](crate::Client::exec).

use std::time::Duration;

/// One step of a [`Pipeline`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineOp {
    Set {
        key: String,
        value: String,
        ttl: Option<Duration>,
    },
    MSet {
        pairs: Vec<(String, String)>,
    },
    PExpire {
        key: String,
        ttl: Duration,
    },
    Del {
        keys: Vec<String>,
    },
}

impl PipelineOp {
    /// Command name, as used for logging and fail points.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Set { .. } => "set",
            Self::MSet { .. } => "mset",
            Self::PExpire { .. } => "pexpire",
            Self::Del { .. } => "del",
        }
    }
}

/// An ordered batch of commands that either all apply or none do.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Pipeline {
    ops: Vec<PipelineOp>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>, ttl: Option<Duration>) -> &mut Self {
        self.ops.push(PipelineOp::Set {
            key: key.into(),
            value: value.into(),
            ttl,
        });
        self
    }

    pub fn mset(&mut self, pairs: Vec<(String, String)>) -> &mut Self {
        self.ops.push(PipelineOp::MSet { pairs });
        self
    }

    pub fn pexpire(&mut self, key: impl Into<String>, ttl: Duration) -> &mut Self {
        self.ops.push(PipelineOp::PExpire {
            key: key.into(),
            ttl,
        });
        self
    }

    pub fn del(&mut self, keys: Vec<String>) -> &mut Self {
        self.ops.push(PipelineOp::Del { keys });
        self
    }

    pub fn ops(&self) -> &[PipelineOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_preserves_order() {
        let mut pipe = Pipeline::new();
        pipe.mset(vec![("a".into(), "1".into())])
            .pexpire("a", Duration::from_secs(1))
            .del(vec!["b".into()]);
        let names: Vec<_> = pipe.ops().iter().map(PipelineOp::name).collect();
        assert_eq!(names, vec!["mset", "pexpire", "del"]);
        assert_eq!(pipe.len(), 3);
        assert!(!pipe.is_empty());
    }
}
