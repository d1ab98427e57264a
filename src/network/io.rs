//! The three loops every running connection owns.
//!
//! - receive: socket bytes -> frame decoder -> inbound queue
//! - transmit: outbound queue -> socket, plus a keepalive ping when quiet
//! - dispatch: inbound queue -> reply slots or the local node's routing
//!   queues, stopping the connection when the peer goes silent
//!
//! Every loop checks the stopped state at the top of each iteration and
//! wakes on the shutdown signal while blocked.

use crate::messages::{decode_envelope, write_frame, Envelope, FrameDecoder, WireProtocolError};
use crate::network::connection::{wait_stopped, PeerStream};
use crate::network::{Connection, DisconnectReason, RemoteMessage};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, trace, warn};

impl Connection {
    pub(crate) async fn rx_loop(self: Arc<Self>, mut reader: ReadHalf<Box<dyn PeerStream>>) {
        let mut shutdown = self.shutdown.subscribe();
        let mut buf = vec![0u8; self.config.rx_buf_len];
        let mut decoder = FrameDecoder::new(self.config.max_message_size);

        loop {
            if self.is_stopped() {
                return;
            }

            let read = tokio::select! {
                read = reader.read(&mut buf) => read,
                _ = wait_stopped(&mut shutdown) => return,
            };

            match read {
                Ok(0) => {
                    self.stop(DisconnectReason::Eof);
                    return;
                }
                Ok(len) => match decoder.decode(&buf[..len]) {
                    Ok(frames) => {
                        for frame in frames {
                            self.handle_frame(&frame);
                        }
                    }
                    Err(e) => {
                        self.stop(DisconnectReason::Protocol(e.to_string()));
                        return;
                    }
                },
                Err(e) => {
                    self.stop(DisconnectReason::ReadFailed(e.to_string()));
                    return;
                }
            }
        }
    }

    /// Deserialize one frame and queue it for dispatch
    fn handle_frame(&self, frame: &[u8]) {
        let envelope = match decode_envelope(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(
                    session_id = %self.session_id(),
                    error = %e,
                    "Unmarshal msg error, discarding frame"
                );
                return;
            }
        };

        trace!(
            session_id = %self.session_id(),
            message_id = %envelope.message_id,
            message_type = envelope.message_type.as_str(),
            "Frame received"
        );

        if let Err(mpsc::error::TrySendError::Full(envelope)) = self.rx_sender.try_send(envelope) {
            warn!(
                session_id = %self.session_id(),
                message_id = %envelope.message_id,
                "Rx msg queue full, discarding message"
            );
        }
    }

    pub(crate) async fn tx_loop(
        self: Arc<Self>,
        mut writer: WriteHalf<Box<dyn PeerStream>>,
        mut tx_receiver: mpsc::Receiver<Envelope>,
    ) {
        let mut shutdown = self.shutdown.subscribe();
        let max_message_size = self.config.max_message_size;

        loop {
            if self.is_stopped() {
                break;
            }

            // The keepalive sleep is recreated every iteration, so a ping only
            // goes out after a full quiet interval
            tokio::select! {
                envelope = tx_receiver.recv() => {
                    let Some(envelope) = envelope else { break };

                    let written = tokio::select! {
                        written = write_frame(&mut writer, &envelope, max_message_size) => written,
                        _ = wait_stopped(&mut shutdown) => break,
                    };

                    match written {
                        Ok(()) => {}
                        Err(WireProtocolError::Io(e)) => {
                            self.stop(DisconnectReason::WriteFailed(e.to_string()));
                            break;
                        }
                        Err(e) => {
                            error!(
                                session_id = %self.session_id(),
                                message_id = %envelope.message_id,
                                error = %e,
                                "Failed to encode message, discarding"
                            );
                        }
                    }
                }
                _ = sleep(self.config.keepalive_interval) => self.keep_alive(),
                _ = wait_stopped(&mut shutdown) => break,
            }
        }

        if let Err(e) = writer.shutdown().await {
            debug!(session_id = %self.session_id(), error = %e, "Error shutting down stream");
        }
    }

    pub(crate) async fn dispatch_loop(self: Arc<Self>, mut rx_receiver: mpsc::Receiver<Envelope>) {
        let mut shutdown = self.shutdown.subscribe();

        loop {
            if self.is_stopped() {
                return;
            }

            // Any processed envelope counts as liveness, even one dropped later
            tokio::select! {
                envelope = rx_receiver.recv() => match envelope {
                    Some(envelope) => self.dispatch(envelope),
                    None => return,
                },
                _ = sleep(self.config.keepalive_timeout) => {
                    self.stop(DisconnectReason::KeepaliveTimeout);
                    return;
                }
                _ = wait_stopped(&mut shutdown) => return,
            }
        }
    }

    /// Route one inbound envelope to a waiting request or the local node
    fn dispatch(self: &Arc<Self>, envelope: Envelope) {
        if let Some(reply_to) = envelope.reply_to {
            let message = RemoteMessage {
                connection: Arc::clone(self),
                envelope,
            };
            if !self.local_node().deliver_reply(reply_to, message) {
                trace!(
                    session_id = %self.session_id(),
                    reply_to = %reply_to,
                    "No pending request for reply, discarding"
                );
            }
            return;
        }

        let routing_type = envelope.routing_type;
        let sender = match self.local_node().rx_msg_sender(routing_type) {
            Ok(sender) => sender,
            Err(e) => {
                error!(session_id = %self.session_id(), error = %e, "Cannot dispatch message");
                return;
            }
        };

        let message = RemoteMessage {
            connection: Arc::clone(self),
            envelope,
        };
        match sender.try_send(message) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    session_id = %self.session_id(),
                    routing_type = %routing_type,
                    "Msg queue full for routing type, discarding message"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(
                    routing_type = %routing_type,
                    "Routing type subscriber is gone, discarding message"
                );
            }
        }
    }
}
