use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{event, Level};

use crate::context::ReviewContext;

/// Structured logging fields.
pub type Kv = BTreeMap<String, Value>;

/// Build a [`Kv`] out of `key => value` pairs, values go through `serde_json::json!`.
#[macro_export]
macro_rules! kv {
    ($($key:expr => $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut values = $crate::log::Kv::new();
        $(values.insert(String::from($key), ::serde_json::json!($value));)*
        values
    }};
}

/// The logger used by the webhooks, chains and the HTTP gateway.
pub trait Logger: Send + Sync {
    fn debug(&self, msg: &str);
    fn info(&self, msg: &str);
    fn warning(&self, msg: &str);
    fn error(&self, msg: &str);

    /// Return a child logger that attaches `values` to every entry.
    fn with_values(&self, values: Kv) -> Arc<dyn Logger>;

    /// Return a child logger that attaches the fields carried by the review context.
    fn with_ctx_values(&self, ctx: &ReviewContext) -> Arc<dyn Logger> {
        self.with_values(ctx.values().clone())
    }
}

/// A logger that drops everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn debug(&self, _msg: &str) {}
    fn info(&self, _msg: &str) {}
    fn warning(&self, _msg: &str) {}
    fn error(&self, _msg: &str) {}

    fn with_values(&self, _values: Kv) -> Arc<dyn Logger> {
        Arc::new(NoopLogger)
    }
}

pub fn noop() -> Arc<dyn Logger> {
    Arc::new(NoopLogger)
}

/// A logger that emits `tracing` events. The fixed fields are exported as a single
/// `fields` JSON value because `tracing` requires field names to be known at compile time.
#[derive(Clone, Debug, Default)]
pub struct TracingLogger {
    values: Kv,
}

impl TracingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    fn merge(&self, values: Kv) -> Self {
        let mut merged = self.values.clone();
        merged.extend(values);
        Self { values: merged }
    }

    fn fields(&self) -> String {
        serde_json::to_string(&self.values).unwrap_or_default()
    }
}

macro_rules! log {
    ($self:ident, $level:path, $msg:ident) => {
        if $self.values.is_empty() {
            event!(target: "admission_webhook", $level, "{}", $msg);
        } else {
            event!(target: "admission_webhook", $level, fields = %$self.fields(), "{}", $msg);
        }
    };
}

impl Logger for TracingLogger {
    fn debug(&self, msg: &str) {
        log!(self, Level::DEBUG, msg);
    }

    fn info(&self, msg: &str) {
        log!(self, Level::INFO, msg);
    }

    fn warning(&self, msg: &str) {
        log!(self, Level::WARN, msg);
    }

    fn error(&self, msg: &str) {
        log!(self, Level::ERROR, msg);
    }

    fn with_values(&self, values: Kv) -> Arc<dyn Logger> {
        Arc::new(self.merge(values))
    }
}
