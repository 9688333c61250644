use lazy_static::lazy_static;
use opentelemetry::{metrics::Counter, KeyValue};

use super::MeasureOpCommonData;

lazy_static! {
    static ref REVIEW_WARNINGS_TOTAL: Counter<u64> =
        opentelemetry::global::meter(super::METER_NAME)
            .u64_counter("admission_webhook_review_warnings_total")
            .build();
}

pub fn add_review_warnings(data: &MeasureOpCommonData) {
    if data.warnings_number == 0 {
        return;
    }
    let mut baggage: Vec<KeyValue> = data.into();
    baggage.push(KeyValue::new("webhook_type", data.webhook_kind.as_str()));
    REVIEW_WARNINGS_TOTAL.add(data.warnings_number as u64, &baggage);
}
