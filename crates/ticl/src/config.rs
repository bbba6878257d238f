//! Configuration for the client engine and protocol handler.

use std::time::Duration;

use ticl_proto::PropertyRecord;

/// Configuration for the protocol handler's outbound batching.
#[derive(Debug, Clone)]
pub struct ProtocolHandlerConfig {
    /// Delay before batched outbound operations (registrations, acks,
    /// info messages) are flushed into a single envelope.
    pub batching_delay: Duration,
}

impl Default for ProtocolHandlerConfig {
    fn default() -> Self {
        Self {
            batching_delay: Duration::from_millis(500),
        }
    }
}

impl ProtocolHandlerConfig {
    /// Appends this config's parameters to `params` for info messages.
    pub fn config_params(&self, params: &mut Vec<PropertyRecord>) {
        params.push(PropertyRecord::new(
            "batching_delay_ms",
            self.batching_delay.as_millis() as i64,
        ));
    }
}

/// Configuration for the client engine.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Delay after which an outbound request with no reply is considered
    /// timed out (default: 1 minute).
    pub network_timeout_delay: Duration,
    /// Retry delay for a failed persistent write (default: 10 seconds).
    pub write_retry_delay: Duration,
    /// Interval between heartbeat info messages (default: 20 minutes).
    pub heartbeat_interval: Duration,
    /// Interval after which performance counters ride along with the next
    /// info message (default: 6 hours).
    pub perf_counter_delay: Duration,
    /// Cap on exponential backoff, as a multiple of the initial delay
    /// (default: 500).
    pub max_exponential_backoff_factor: u32,
    /// Multiplicative jitter applied to scheduled delays, in `(0, 1]`
    /// (default: 0.2).
    pub smear_fraction: f64,
    /// Protocol handler configuration.
    pub protocol_handler: ProtocolHandlerConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            network_timeout_delay: Duration::from_secs(60),
            write_retry_delay: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(20 * 60),
            perf_counter_delay: Duration::from_secs(6 * 60 * 60),
            max_exponential_backoff_factor: 500,
            smear_fraction: crate::smear::DEFAULT_SMEAR_FRACTION,
            protocol_handler: ProtocolHandlerConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Returns the configuration as named parameters for info messages.
    pub fn config_params(&self) -> Vec<PropertyRecord> {
        let mut params = vec![
            PropertyRecord::new(
                "network_timeout_delay_ms",
                self.network_timeout_delay.as_millis() as i64,
            ),
            PropertyRecord::new(
                "write_retry_delay_ms",
                self.write_retry_delay.as_millis() as i64,
            ),
            PropertyRecord::new(
                "heartbeat_interval_ms",
                self.heartbeat_interval.as_millis() as i64,
            ),
            PropertyRecord::new(
                "perf_counter_delay_ms",
                self.perf_counter_delay.as_millis() as i64,
            ),
            PropertyRecord::new(
                "max_exponential_backoff_factor",
                self.max_exponential_backoff_factor as i64,
            ),
        ];
        self.protocol_handler.config_params(&mut params);
        params
    }
}
