use std::sync::Arc;
use std::time::Duration;

use crate::log::Logger;
use crate::tracing::Tracer;
use crate::webhook::Webhook;

pub(crate) struct ApiServerState {
    pub(crate) webhook: Arc<dyn Webhook>,
    pub(crate) logger: Arc<dyn Logger>,
    pub(crate) tracer: Arc<dyn Tracer>,
    pub(crate) timeout: Option<Duration>,
}
