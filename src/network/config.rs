use crate::messages::MAX_MESSAGE_SIZE;
use std::time::Duration;

// Max number of messages received that can be buffered per connection
pub const RX_MSG_CHAN_LEN: usize = 23333;

// Max number of messages to be sent that can be buffered per connection
pub const TX_MSG_CHAN_LEN: usize = 23333;

// Size of the socket read buffer
pub const RX_BUF_LEN: usize = 16 * 1024;

pub const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

// Interval between keepalive pings
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(3);

// Max idle time before the peer is considered dead
pub const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Tuning knobs for a peer connection, fixed for the lifetime of the node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub rx_msg_chan_len: usize,
    pub tx_msg_chan_len: usize,
    pub rx_buf_len: usize,
    pub reply_timeout: Duration,
    pub keepalive_interval: Duration,
    pub keepalive_timeout: Duration,
    pub max_message_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            rx_msg_chan_len: RX_MSG_CHAN_LEN,
            tx_msg_chan_len: TX_MSG_CHAN_LEN,
            rx_buf_len: RX_BUF_LEN,
            reply_timeout: REPLY_TIMEOUT,
            keepalive_interval: KEEPALIVE_INTERVAL,
            keepalive_timeout: KEEPALIVE_TIMEOUT,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

impl ConnectionConfig {
    /// Create a ConnectionConfig with custom timeouts and default buffer sizes
    pub fn with_timeouts(
        reply_timeout: Duration,
        keepalive_interval: Duration,
        keepalive_timeout: Duration,
    ) -> Self {
        Self {
            reply_timeout,
            keepalive_interval,
            keepalive_timeout,
            ..Self::default()
        }
    }

    /// Create a ConnectionConfig with custom queue capacities
    pub fn with_queue_capacity(rx_msg_chan_len: usize, tx_msg_chan_len: usize) -> Self {
        Self {
            rx_msg_chan_len,
            tx_msg_chan_len,
            ..Self::default()
        }
    }

    /// Short timeouts so tests observe keepalive and reply behavior quickly
    pub fn for_testing() -> Self {
        Self {
            rx_msg_chan_len: 64,
            tx_msg_chan_len: 64,
            rx_buf_len: 1024,
            reply_timeout: Duration::from_millis(500),
            keepalive_interval: Duration::from_millis(100),
            keepalive_timeout: Duration::from_millis(400),
            max_message_size: 64 * 1024,
        }
    }

    /// Check the knobs describe a usable connection
    pub fn validate(&self) -> Result<(), String> {
        if self.rx_msg_chan_len == 0 || self.tx_msg_chan_len == 0 {
            return Err("message queue capacity must be at least 1".to_string());
        }
        if self.rx_buf_len == 0 {
            return Err("receive buffer must not be empty".to_string());
        }
        if self.keepalive_interval >= self.keepalive_timeout {
            return Err(format!(
                "keepalive interval {:?} must be shorter than keepalive timeout {:?}",
                self.keepalive_interval, self.keepalive_timeout
            ));
        }
        if self.reply_timeout.is_zero() {
            return Err("reply timeout must be positive".to_string());
        }
        Ok(())
    }
}
