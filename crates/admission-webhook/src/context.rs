use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::log::Kv;

/// Request scoped data that travels with every admission review.
///
/// It carries the cancellation signal of the HTTP request, an optional deadline, the
/// structured logging fields accumulated so far and the span of the current trace.
/// Every function that needs one of them receives the context explicitly.
#[derive(Clone, Debug)]
pub struct ReviewContext {
    cancellation: CancellationToken,
    deadline: Option<Instant>,
    values: Kv,
    span: Span,
}

impl Default for ReviewContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ReviewContext {
    /// A context that is never cancelled and has no deadline
    pub fn new() -> Self {
        Self {
            cancellation: CancellationToken::new(),
            deadline: None,
            values: Kv::new(),
            span: Span::none(),
        }
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Return a copy of the context with `values` merged on top of the current ones
    pub fn with_values(&self, values: Kv) -> Self {
        let mut ctx = self.clone();
        ctx.values.extend(values);
        ctx
    }

    pub fn with_span(&self, span: Span) -> Self {
        let mut ctx = self.clone();
        ctx.span = span;
        ctx
    }

    pub fn values(&self) -> &Kv {
        &self.values
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// `true` once the request has been cancelled or its deadline has passed
    pub fn is_done(&self) -> bool {
        self.cancellation.is_cancelled()
            || self
                .deadline
                .is_some_and(|deadline| Instant::now() >= deadline)
    }
}
