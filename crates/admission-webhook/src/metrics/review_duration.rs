use lazy_static::lazy_static;
use opentelemetry::{metrics::Histogram, KeyValue};
use std::time::Duration;

use super::{MeasureMutatingOpData, MeasureValidatingOpData};

lazy_static! {
    static ref VALIDATING_REVIEW_DURATION: Histogram<f64> =
        opentelemetry::global::meter(super::METER_NAME)
            .f64_histogram("admission_webhook_validating_review_duration_seconds")
            .with_unit("s")
            .build();
    static ref MUTATING_REVIEW_DURATION: Histogram<f64> =
        opentelemetry::global::meter(super::METER_NAME)
            .f64_histogram("admission_webhook_mutating_review_duration_seconds")
            .with_unit("s")
            .build();
}

pub fn record_validating_review_duration(duration: Duration, data: &MeasureValidatingOpData) {
    VALIDATING_REVIEW_DURATION.record(duration.as_secs_f64(), &Into::<Vec<KeyValue>>::into(data));
}

pub fn record_mutating_review_duration(duration: Duration, data: &MeasureMutatingOpData) {
    MUTATING_REVIEW_DURATION.record(duration.as_secs_f64(), &Into::<Vec<KeyValue>>::into(data));
}
