use anyhow::{anyhow, Result};
use clap::ArgMatches;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

pub struct Config {
    pub addr: SocketAddr,
    pub tls_config: Option<TlsConfig>,
    pub metrics_enabled: bool,
    pub log_level: String,
    pub log_fmt: String,
    pub log_no_color: bool,
    pub webhook_id: String,
    /// Labels set by the mutating webhook
    pub labels: BTreeMap<String, String>,
    /// Labels enforced by the validating webhook
    pub required_labels: Vec<String>,
    pub timeout: Option<Duration>,
}

pub struct TlsConfig {
    pub cert_file: String,
    pub key_file: String,
}

impl Config {
    pub fn from_args(matches: &ArgMatches) -> Result<Self> {
        let addr = api_bind_address(matches)?;
        let (cert_file, key_file) = tls_files(matches)?;
        let tls_config = if cert_file.is_empty() {
            None
        } else {
            Some(TlsConfig {
                cert_file,
                key_file,
            })
        };

        let metrics_enabled = matches
            .get_one::<bool>("enable-metrics")
            .expect("clap should have set a default value")
            .to_owned();
        let log_level = matches
            .get_one::<String>("log-level")
            .expect("This should not happen, there's a default value for log-level")
            .to_owned();
        let log_fmt = matches
            .get_one::<String>("log-fmt")
            .expect("This should not happen, there's a default value for log-fmt")
            .to_owned();
        let log_no_color = matches
            .get_one::<bool>("log-no-color")
            .expect("clap should have assigned a default value")
            .to_owned();
        let webhook_id = matches
            .get_one::<String>("webhook-id")
            .expect("This should not happen, there's a default value for webhook-id")
            .to_owned();
        if webhook_id.is_empty() {
            return Err(anyhow!("error parsing arguments: --webhook-id can't be empty"));
        }

        let labels = labels(matches)?;
        let required_labels = matches
            .get_many::<String>("required-label")
            .map(|values| values.cloned().collect())
            .unwrap_or_default();
        let timeout = timeout(matches)?;

        Ok(Self {
            addr,
            tls_config,
            metrics_enabled,
            log_level,
            log_fmt,
            log_no_color,
            webhook_id,
            labels,
            required_labels,
            timeout,
        })
    }
}

fn api_bind_address(matches: &ArgMatches) -> Result<SocketAddr> {
    format!(
        "{}:{}",
        matches
            .get_one::<String>("address")
            .expect("This should not happen, there's a default value for address"),
        matches
            .get_one::<String>("port")
            .expect("This should not happen, there's a default value for port")
    )
    .parse()
    .map_err(|e| anyhow!("error parsing arguments: {}", e))
}

fn tls_files(matches: &ArgMatches) -> Result<(String, String)> {
    let cert_file = matches
        .get_one::<String>("cert-file")
        .expect("This should not happen, there's a default value for cert-file")
        .to_owned();
    let key_file = matches
        .get_one::<String>("key-file")
        .expect("This should not happen, there's a default value for key-file")
        .to_owned();
    if cert_file.is_empty() != key_file.is_empty() {
        Err(anyhow!("error parsing arguments: either both --cert-file and --key-file must be provided, or neither"))
    } else {
        Ok((cert_file, key_file))
    }
}

fn labels(matches: &ArgMatches) -> Result<BTreeMap<String, String>> {
    matches
        .get_many::<String>("label")
        .into_iter()
        .flatten()
        .map(|label| match label.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
            _ => Err(anyhow!(
                "error parsing arguments: label '{}' is not in the KEY=VALUE format",
                label
            )),
        })
        .collect()
}

fn timeout(matches: &ArgMatches) -> Result<Option<Duration>> {
    matches
        .get_one::<String>("timeout")
        .map(|secs| {
            secs.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| anyhow!("error parsing arguments: invalid timeout '{}': {}", secs, e))
        })
        .transpose()
}
