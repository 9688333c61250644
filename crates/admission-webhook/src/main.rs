use anyhow::Result;
use tokio::runtime::Runtime;
use tracing::{debug, info};

use admission_webhook::metrics::setup_metrics;
use admission_webhook::tracing::setup_tracing;

mod cli;
mod config;
mod labels;
mod server;

use config::Config;

fn main() -> Result<()> {
    let matches = cli::build_cli().get_matches();
    let config = Config::from_args(&matches)?;

    let rt = Runtime::new()?;
    rt.block_on(async move {
        // Setup the tracing system. This MUST be done inside of a tokio Runtime
        // because some collectors rely on it and would panic otherwise.
        setup_tracing(&config.log_level, &config.log_fmt, config.log_no_color)?;
        debug!("tracing system ready");

        if config.metrics_enabled {
            setup_metrics()?;
            debug!("metrics system ready");
        }

        let router = server::router(&config)?;
        info!(
            webhook_id = config.webhook_id.as_str(),
            labels = config.labels.len(),
            required_labels = config.required_labels.len(),
            "webhooks ready"
        );

        server::run_server(config.addr, config.tls_config, router).await
    })
}
