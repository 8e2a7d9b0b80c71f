//! Connector configuration.

use std::time::Duration;

/// Settings shared by server and client connectors.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Minimum size of each connection's read buffer (default: 8192)
    ///
    /// One inbound delivery never exceeds the buffer's capacity.
    pub read_buffer_size: usize,

    /// Whether to set `TCP_NODELAY` on every connection (default: true)
    pub nodelay: bool,

    /// How long `connect` waits for the handshake (default: 5s)
    pub connect_timeout: Duration,

    /// Upper bound on bytes queued by `Connection::send` (default: 4 MiB)
    pub max_pending_write_bytes: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: 8 * 1024,
            nodelay: true,
            connect_timeout: Duration::from_secs(5),
            max_pending_write_bytes: 4 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TransportConfig::default();
        assert_eq!(config.read_buffer_size, 8192);
        assert!(config.nodelay);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.max_pending_write_bytes, 4 * 1024 * 1024);
    }
}
