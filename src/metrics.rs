//! Prometheus metrics on the default registry.

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramVec, IntCounterVec, TextEncoder, register_histogram_vec,
    register_int_counter_vec,
};

use crate::application::AppError;
use crate::domain::Transaction;

pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "http_requests_total",
        "Total HTTP requests handled",
        &["method", "endpoint", "status"]
    )
    .expect("register http_requests_total")
});

pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latency in seconds",
        &["method", "endpoint"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]
    )
    .expect("register http_request_duration_seconds")
});

pub static TRANSFERS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tally_transfers_total",
        "Transfer requests by outcome",
        &["outcome"]
    )
    .expect("register tally_transfers_total")
});

/// Count a finished transfer under `committed` or its error code.
pub fn record_transfer(result: &Result<Transaction, AppError>) {
    let outcome = match result {
        Ok(_) => "committed",
        Err(err) => err.code(),
    };
    TRANSFERS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Render every registered metric in the Prometheus text format.
pub fn encode() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_transfers_are_counted_by_code() {
        let before = TRANSFERS_TOTAL
            .with_label_values(&["insufficient_funds"])
            .get();
        record_transfer(&Err(AppError::InsufficientFunds {
            account_id: 1,
            balance: 0,
            required: 5,
        }));
        let after = TRANSFERS_TOTAL
            .with_label_values(&["insufficient_funds"])
            .get();
        assert_eq!(after, before + 1);
        assert!(encode().unwrap().contains("tally_transfers_total"));
    }
}
