use clap::builder::PossibleValue;
use clap::{crate_authors, crate_description, crate_name, crate_version, Arg, ArgAction, Command};

pub(crate) fn build_cli() -> Command {
    let args = vec![
        Arg::new("log-level")
            .long("log-level")
            .value_name("LOG_LEVEL")
            .env("ADMISSION_WEBHOOK_LOG_LEVEL")
            .default_value("info")
            .value_parser([
                PossibleValue::new("trace"),
                PossibleValue::new("debug"),
                PossibleValue::new("info"),
                PossibleValue::new("warn"),
                PossibleValue::new("error"),
            ])
            .help("Log level"),
        Arg::new("log-fmt")
            .long("log-fmt")
            .value_name("LOG_FMT")
            .env("ADMISSION_WEBHOOK_LOG_FMT")
            .default_value("text")
            .value_parser([
                PossibleValue::new("text"),
                PossibleValue::new("json"),
                PossibleValue::new("otlp"),
            ])
            .help("Log output format"),
        Arg::new("log-no-color")
            .long("log-no-color")
            .env("NO_COLOR")
            .action(ArgAction::SetTrue)
            .help("Disable colored output for logs"),
        Arg::new("address")
            .long("addr")
            .value_name("BIND_ADDRESS")
            .default_value("0.0.0.0")
            .env("ADMISSION_WEBHOOK_BIND_ADDRESS")
            .help("Bind against ADDRESS"),
        Arg::new("port")
            .long("port")
            .value_name("PORT")
            .default_value("8080")
            .env("ADMISSION_WEBHOOK_PORT")
            .help("Listen on PORT"),
        Arg::new("cert-file")
            .long("cert-file")
            .value_name("CERT_FILE")
            .default_value("")
            .env("ADMISSION_WEBHOOK_CERT_FILE")
            .help("Path to an X.509 certificate file for HTTPS"),
        Arg::new("key-file")
            .long("key-file")
            .value_name("KEY_FILE")
            .default_value("")
            .env("ADMISSION_WEBHOOK_KEY_FILE")
            .help("Path to an X.509 private key file for HTTPS"),
        Arg::new("enable-metrics")
            .long("enable-metrics")
            .env("ADMISSION_WEBHOOK_ENABLE_METRICS")
            .action(ArgAction::SetTrue)
            .help("Enable metrics, exported to an OpenTelemetry collector"),
        Arg::new("webhook-id")
            .long("webhook-id")
            .value_name("WEBHOOK_ID")
            .default_value("labels")
            .env("ADMISSION_WEBHOOK_ID")
            .help("Prefix of the webhook ids, the webhooks are named <WEBHOOK_ID>-mutator and <WEBHOOK_ID>-validator"),
        Arg::new("label")
            .long("label")
            .value_name("KEY=VALUE")
            .env("ADMISSION_WEBHOOK_LABELS")
            .value_delimiter(',')
            .action(ArgAction::Append)
            .help("Label set on every reviewed object by the mutating webhook. Can be repeated"),
        Arg::new("required-label")
            .long("required-label")
            .value_name("KEY")
            .env("ADMISSION_WEBHOOK_REQUIRED_LABELS")
            .value_delimiter(',')
            .action(ArgAction::Append)
            .help("Label every reviewed object must have to be accepted by the validating webhook. Can be repeated"),
        Arg::new("timeout")
            .long("timeout")
            .value_name("SECONDS")
            .env("ADMISSION_WEBHOOK_TIMEOUT")
            .help("Interrupt the review of a request after the given time"),
    ];

    Command::new(crate_name!())
        .author(crate_authors!())
        .version(crate_version!())
        .about(crate_description!())
        .args(args)
}
