use std::time::Duration;

use anyhow::Result;
#[cfg(test)]
use mockall::automock;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::{ExportConfig, WithExportConfig};

use crate::model::{AdmissionReviewVersion, Operation, WebhookKind};

mod review_duration;
pub use review_duration::{record_mutating_review_duration, record_validating_review_duration};
mod review_warnings;
pub use review_warnings::add_review_warnings;

const METER_NAME: &str = "admission_webhook";

/// Install the global OpenTelemetry meter provider, exporting the metrics to an OTLP
/// collector over gRPC.
pub fn setup_metrics() -> Result<()> {
    let metric_exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_export_config(ExportConfig::default())
        .build()?;

    let periodic_reader =
        opentelemetry_sdk::metrics::PeriodicReader::builder(metric_exporter).build();
    let meter_provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
        .with_reader(periodic_reader)
        .build();

    global::set_meter_provider(meter_provider);
    Ok(())
}

/// Data shared by the measurements of both kinds of webhooks.
#[derive(Clone, Debug, PartialEq)]
pub struct MeasureOpCommonData {
    pub webhook_id: String,
    pub webhook_kind: WebhookKind,
    pub review_version: AdmissionReviewVersion,
    pub duration: Duration,
    /// `false` when the review ended with an error
    pub success: bool,
    pub resource_name: String,
    pub resource_namespace: String,
    pub resource_kind: String,
    pub operation: Operation,
    pub dry_run: bool,
    pub warnings_number: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MeasureValidatingOpData {
    pub common: MeasureOpCommonData,
    pub allowed: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MeasureMutatingOpData {
    pub common: MeasureOpCommonData,
    pub mutated: bool,
}

#[allow(clippy::from_over_into)]
impl Into<Vec<KeyValue>> for &MeasureOpCommonData {
    fn into(self) -> Vec<KeyValue> {
        let mut baggage = vec![
            KeyValue::new("webhook_id", self.webhook_id.clone()),
            KeyValue::new("webhook_version", self.review_version.as_str()),
            KeyValue::new("resource_kind", self.resource_kind.clone()),
            KeyValue::new("operation", self.operation.as_str()),
            KeyValue::new("dry_run", self.dry_run),
            KeyValue::new("success", self.success),
        ];
        if !self.resource_namespace.is_empty() {
            baggage.push(KeyValue::new(
                "resource_namespace",
                self.resource_namespace.clone(),
            ));
        }
        baggage
    }
}

#[allow(clippy::from_over_into)]
impl Into<Vec<KeyValue>> for &MeasureValidatingOpData {
    fn into(self) -> Vec<KeyValue> {
        let mut baggage: Vec<KeyValue> = (&self.common).into();
        baggage.push(KeyValue::new("allowed", self.allowed));
        baggage
    }
}

#[allow(clippy::from_over_into)]
impl Into<Vec<KeyValue>> for &MeasureMutatingOpData {
    fn into(self) -> Vec<KeyValue> {
        let mut baggage: Vec<KeyValue> = (&self.common).into();
        baggage.push(KeyValue::new("mutated", self.mutated));
        baggage
    }
}

/// Knows how to record the measurements of the webhook reviews. It's shared by all the
/// reviews, implementations must be safe to call concurrently and never fail.
#[cfg_attr(test, automock)]
pub trait MetricsRecorder: Send + Sync {
    fn measure_validating_webhook_review_op(&self, data: &MeasureValidatingOpData);
    fn measure_mutating_webhook_review_op(&self, data: &MeasureMutatingOpData);
}

/// Drops every measurement
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetricsRecorder;

impl MetricsRecorder for NoopMetricsRecorder {
    fn measure_validating_webhook_review_op(&self, _data: &MeasureValidatingOpData) {}
    fn measure_mutating_webhook_review_op(&self, _data: &MeasureMutatingOpData) {}
}

/// Records the measurements with the OpenTelemetry instruments of the global meter provider.
/// See [`setup_metrics`].
#[derive(Clone, Copy, Debug, Default)]
pub struct OtelMetricsRecorder;

impl MetricsRecorder for OtelMetricsRecorder {
    fn measure_validating_webhook_review_op(&self, data: &MeasureValidatingOpData) {
        record_validating_review_duration(data.common.duration, data);
        add_review_warnings(&data.common);
    }

    fn measure_mutating_webhook_review_op(&self, data: &MeasureMutatingOpData) {
        record_mutating_review_duration(data.common.duration, data);
        add_review_warnings(&data.common);
    }
}
