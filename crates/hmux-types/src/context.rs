use std::time::{Duration, Instant};

use tracing::Span;

/// Execution context carried by store handles.
///
/// A context bounds how long a handle may spend on a store round trip or a
/// lock wait, and names the tracing span operations are recorded under.
/// Contexts are immutable; the builder methods return modified copies.
#[derive(Clone, Debug)]
pub struct OpContext {
    deadline: Option<Instant>,
    span: Span,
}

impl OpContext {
    /// A context with no deadline that records under the current span.
    pub fn background() -> Self {
        Self {
            deadline: None,
            span: Span::current(),
        }
    }

    /// Copy of this context that expires `timeout` from now.
    ///
    /// An existing earlier deadline is kept.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Copy of this context that expires at `deadline`, or at the existing
    /// deadline if that is earlier.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        };
        Self {
            deadline: Some(deadline),
            span: self.span.clone(),
        }
    }

    /// Copy of this context recording under `span`.
    pub fn with_span(&self, span: Span) -> Self {
        Self {
            deadline: self.deadline,
            span,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Returns `true` once the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Time left before the deadline, `None` if there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}

impl Default for OpContext {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_never_expires() {
        let ctx = OpContext::background();
        assert!(ctx.deadline().is_none());
        assert!(!ctx.is_expired());
        assert!(ctx.remaining().is_none());
    }

    #[test]
    fn zero_timeout_is_expired() {
        let ctx = OpContext::background().with_timeout(Duration::ZERO);
        assert!(ctx.is_expired());
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn earlier_deadline_wins() {
        let now = Instant::now();
        let early = now + Duration::from_millis(10);
        let late = now + Duration::from_secs(10);
        let ctx = OpContext::background().with_deadline(early).with_deadline(late);
        assert_eq!(ctx.deadline(), Some(early));
        let ctx = OpContext::background().with_deadline(late).with_deadline(early);
        assert_eq!(ctx.deadline(), Some(early));
    }

    #[test]
    fn with_span_keeps_deadline() {
        let ctx = OpContext::background().with_timeout(Duration::from_secs(5));
        let deadline = ctx.deadline();
        let ctx = ctx.with_span(tracing::info_span!("request"));
        assert_eq!(ctx.deadline(), deadline);
    }
}
