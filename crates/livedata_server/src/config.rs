//! Server configuration.

use crate::sink::DEFAULT_OUTBOUND_BUFFER;
use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for the LiveData server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the TCP transport binds to.
    pub bind_addr: SocketAddr,
    /// Interval of the periodic re-poll of every connection.
    pub poll_interval: Duration,
    /// Minimum spacing between two triggered polls of one connection.
    pub throttle_window: Duration,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Capacity of each connection's command queue.
    pub command_buffer: usize,
    /// Undelivered messages a TCP client may fall behind before it is dropped.
    pub outbound_buffer: usize,
    /// Longest inbound line the TCP transport accepts, in bytes.
    pub max_frame_len: usize,
}

impl ServerConfig {
    /// Creates a configuration bound to `bind_addr`.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            poll_interval: Duration::from_secs(10),
            throttle_window: Duration::from_millis(50),
            max_connections: 1000,
            command_buffer: 64,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            max_frame_len: 1024 * 1024,
        }
    }

    /// Sets the bind address.
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Sets the periodic poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the throttle window.
    pub fn with_throttle_window(mut self, window: Duration) -> Self {
        self.throttle_window = window;
        self
    }

    /// Sets the maximum concurrent connections.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the command queue capacity (at least 1).
    pub fn with_command_buffer(mut self, capacity: usize) -> Self {
        self.command_buffer = capacity.max(1);
        self
    }

    /// Sets the outbound buffer of each TCP client (at least 1).
    pub fn with_outbound_buffer(mut self, capacity: usize) -> Self {
        self.outbound_buffer = capacity.max(1);
        self
    }

    /// Sets the maximum inbound line length (at least 1).
    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len.max(1);
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 3030)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.throttle_window, Duration::from_millis(50));
        assert_eq!(config.bind_addr.port(), 3030);
        assert_eq!(config.outbound_buffer, DEFAULT_OUTBOUND_BUFFER);
        assert_eq!(config.max_frame_len, 1024 * 1024);
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new("0.0.0.0:9000".parse().unwrap())
            .with_poll_interval(Duration::from_secs(1))
            .with_throttle_window(Duration::from_millis(5))
            .with_max_connections(2)
            .with_command_buffer(0)
            .with_outbound_buffer(0)
            .with_max_frame_len(64);

        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.throttle_window, Duration::from_millis(5));
        assert_eq!(config.max_connections, 2);
        assert_eq!(config.command_buffer, 1);
        assert_eq!(config.outbound_buffer, 1);
        assert_eq!(config.max_frame_len, 64);
    }
}
