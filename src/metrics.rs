//! Here we keep the notification counters and render them for scraping.
use prometheus::{Encoder, IntCounter, Opts, Registry, TextEncoder};

use crate::settings::APPLICATION;

/// The three notification counters, backed by a registry owned by the
/// application state rather than the process-global one, so every consumer
/// (and every test) gets its own.
pub struct Metrics {
    registry: Registry,

    /// total intake, incremented for every request whatever its outcome
    pub received: IntCounter,
    /// notifications rejected during decoding
    pub invalid: IntCounter,
    /// notifications that failed during rendering or forwarding
    pub errored: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let received = IntCounter::with_opts(
            Opts::new(
                "notifications_received_total",
                "Total number of alert notifications received",
            )
            .namespace(APPLICATION),
        )?;
        let invalid = IntCounter::with_opts(
            Opts::new(
                "notifications_invalid_total",
                "Total number of invalid alert notifications received",
            )
            .namespace(APPLICATION),
        )?;
        let errored = IntCounter::with_opts(
            Opts::new(
                "notifications_errored_total",
                "Total number of alert notifications that errored during processing and should be retried",
            )
            .namespace(APPLICATION),
        )?;

        registry.register(Box::new(received.clone()))?;
        registry.register(Box::new(invalid.clone()))?;
        registry.register(Box::new(errored.clone()))?;

        Ok(Self {
            registry,
            received,
            invalid,
            errored,
        })
    }

    /// renders the registry in the prometheus text exposition format
    pub fn encode(&self) -> (String, Vec<u8>) {
        let mut buffer = vec![];
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        #[allow(clippy::expect_used)]
        encoder
            .encode(&metric_families, &mut buffer)
            .expect("text encoding of gathered metrics cannot fail");

        (encoder.format_type().to_string(), buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposes_all_three_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.received.inc();
        metrics.received.inc();
        metrics.invalid.inc();

        let (format, buffer) = metrics.encode();
        let exposition = String::from_utf8(buffer).unwrap();

        assert!(format.starts_with("text/plain"));
        assert!(exposition.contains("foghorn_notifications_received_total 2"));
        assert!(exposition.contains("foghorn_notifications_invalid_total 1"));
        assert!(exposition.contains("foghorn_notifications_errored_total 0"));
    }
}
