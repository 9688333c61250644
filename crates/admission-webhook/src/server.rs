use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use axum::{routing::get, Router};
use axum_server::{tls_rustls::RustlsConfig, Handle};
use tracing::{error, info};

use admission_webhook::api::{self, readiness_handler, HandlerConfig};
use admission_webhook::log::{Logger, TracingLogger};
use admission_webhook::metrics::{MetricsRecorder, OtelMetricsRecorder};
use admission_webhook::mutating::{self, MutatingWebhook, MutatorChain};
use admission_webhook::tracing::{SpanTracer, Tracer};
use admission_webhook::validating::{self, ValidatingWebhook, ValidatorChain};
use admission_webhook::webhook::{MeasuredWebhook, TracedWebhook};
use admission_webhook::Webhook;

use crate::config::{Config, TlsConfig};
use crate::labels::{LabelsMutator, RequiredLabelsValidator};

/// Build the router serving the labels webhooks: the mutating one on `/mutate`, the
/// validating one on `/validate`.
pub(crate) fn router(config: &Config) -> Result<Router> {
    let logger: Arc<dyn Logger> = Arc::new(TracingLogger::new());
    let tracer: Arc<dyn Tracer> = Arc::new(SpanTracer::new());

    let mutating = MutatingWebhook::new(mutating::WebhookConfig {
        id: format!("{}-mutator", config.webhook_id),
        mutator: Some(Arc::new(MutatorChain::new(
            logger.clone(),
            vec![Arc::new(LabelsMutator::new(config.labels.clone()))],
        ))),
        logger: Some(logger.clone()),
        ..Default::default()
    })?;
    let validating = ValidatingWebhook::new(validating::WebhookConfig {
        id: format!("{}-validator", config.webhook_id),
        validator: Some(Arc::new(ValidatorChain::new(
            logger.clone(),
            vec![Arc::new(RequiredLabelsValidator::new(
                config.required_labels.clone(),
            ))],
        ))),
        logger: Some(logger.clone()),
        ..Default::default()
    })?;

    let handler = |webhook: Arc<dyn Webhook>| {
        api::handler_for(HandlerConfig {
            webhook: Some(instrument(webhook, config.metrics_enabled, tracer.clone())),
            logger: Some(logger.clone()),
            tracer: Some(tracer.clone()),
            timeout: config.timeout,
        })
    };

    Ok(Router::new()
        .nest("/mutate", handler(Arc::new(mutating))?)
        .nest("/validate", handler(Arc::new(validating))?)
        .route("/readiness", get(readiness_handler)))
}

fn instrument(
    webhook: Arc<dyn Webhook>,
    metrics_enabled: bool,
    tracer: Arc<dyn Tracer>,
) -> Arc<dyn Webhook> {
    let webhook: Arc<dyn Webhook> = if metrics_enabled {
        let recorder: Arc<dyn MetricsRecorder> = Arc::new(OtelMetricsRecorder);
        Arc::new(MeasuredWebhook::new(recorder, webhook))
    } else {
        webhook
    };
    Arc::new(TracedWebhook::new(tracer, webhook))
}

pub(crate) async fn run_server(
    addr: SocketAddr,
    tls_config: Option<TlsConfig>,
    router: Router,
) -> Result<()> {
    let handle = Handle::new();
    tokio::spawn(shutdown_on_signal(handle.clone()));

    let served = match tls_config {
        None => {
            info!(address = addr.to_string().as_str(), "started HTTP server");
            axum_server::bind(addr)
                .handle(handle)
                .serve(router.into_make_service())
                .await
        }
        Some(tls_config) => {
            let rustls_config =
                RustlsConfig::from_pem_file(&tls_config.cert_file, &tls_config.key_file)
                    .await
                    .map_err(|e| {
                        anyhow!(
                            "error loading the certificate {} and the key {}: {}",
                            tls_config.cert_file,
                            tls_config.key_file,
                            e
                        )
                    })?;
            info!(address = addr.to_string().as_str(), "started HTTPS server");
            axum_server::bind_rustls(addr, rustls_config)
                .handle(handle)
                .serve(router.into_make_service())
                .await
        }
    };
    served.map_err(|e| anyhow!("HTTP server error: {}", e))
}

async fn shutdown_on_signal(handle: Handle) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = e.to_string().as_str(), "cannot listen for shutdown signal");
        return;
    }
    info!("shutdown signal received, draining connections");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
