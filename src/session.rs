//! Session builder and the call correlator.
//!
//! The [`SessionBuilder`] configures tunables and inbound handlers, then
//! `connect()` runs the lifecycle:
//! 1. Handshake on the raw transport
//! 2. Split into read and write halves
//! 3. Spawn the writer task and the listener task
//! 4. Hand back a [`Session`] for issuing calls
//!
//! A call allocates a request id, sends the encoded Request frame and
//! suspends on the slot until the listener fills it or the response
//! deadline expires. Fire-and-forget calls go through the same path with
//! the unit decoder; the empty acknowledgement doubles as flow control, so
//! a caller can never run further ahead of the peer than the pool allows.
//!
//! # Example
//!
//! ```ignore
//! use pinwire::Session;
//!
//! #[tokio::main]
//! async fn main() -> pinwire::Result<()> {
//!     let port = open_serial_port()?; // any AsyncRead + AsyncWrite
//!     let session = Session::builder()
//!         .on_function(1, |payload, _function_id, _request_id| {
//!             println!("peer called us with {payload:?}");
//!         })?
//!         .connect(port)
//!         .await?;
//!
//!     let level = session.analog_read(3).await?;
//!     session.digital_write(13, level > 512).await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::codec::FromPayload;
use crate::config::ProtocolConfig;
use crate::error::Result;
use crate::handler::{FunctionRegistry, InboundDispatcher};
use crate::handshake;
use crate::listener::listener_loop;
use crate::pool::RequestPool;
use crate::protocol::{encode_request, instructions, validate_instruction};
use crate::transport::Transport;
use crate::writer::{spawn_writer_task, WriterHandle};

/// Builder for configuring and connecting a session.
#[derive(Debug)]
pub struct SessionBuilder {
    config: ProtocolConfig,
    registry: FunctionRegistry,
}

impl SessionBuilder {
    /// Create a builder with the default configuration.
    pub fn new() -> Self {
        Self {
            config: ProtocolConfig::default(),
            registry: FunctionRegistry::new(),
        }
    }

    /// Set the overall handshake deadline.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Set the handshake SYN resend interval.
    pub fn handshake_resend_interval(mut self, interval: Duration) -> Self {
        self.config.handshake_resend_interval = interval;
        self
    }

    /// Set the inactivity budget for completing a started frame.
    pub fn frame_inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.config.frame_inactivity_timeout = timeout;
        self
    }

    /// Set the per-call response deadline.
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.config.response_timeout = timeout;
        self
    }

    /// Set the number of concurrently in-flight request ids.
    pub fn max_concurrent_requests(mut self, max: u8) -> Self {
        self.config.max_concurrent_requests = max;
        self
    }

    /// Set the maximum payload length per frame.
    pub fn max_payload_length(mut self, max: usize) -> Self {
        self.config.max_payload_length = max;
        self
    }

    /// Register a host function the peer may invoke.
    ///
    /// # Errors
    ///
    /// `FunctionAlreadyRegistered` if the id is taken.
    pub fn on_function<F>(mut self, function_id: u8, callback: F) -> Result<Self>
    where
        F: Fn(&[u8], u8, u8) + Send + Sync + 'static,
    {
        self.registry.register(function_id, callback)?;
        Ok(self)
    }

    /// Handshake with the peer and start the session tasks.
    ///
    /// # Errors
    ///
    /// `HandshakeFailed` if the peer does not synchronize within the
    /// handshake deadline; I/O errors from the transport.
    pub async fn connect<T: Transport>(self, transport: T) -> Result<Session> {
        let (mut reader, mut writer) = tokio::io::split(transport);

        handshake::initiate(&mut reader, &mut writer, &self.config).await?;

        let (writer_handle, writer_task) = spawn_writer_task(writer);
        let pool = Arc::new(RequestPool::new(
            self.config.max_concurrent_requests,
            self.config.response_timeout,
        ));
        let dispatcher = Arc::new(InboundDispatcher::new(self.registry));

        let (closed_tx, closed_rx) = oneshot::channel();
        let listener_task = {
            let pool = Arc::clone(&pool);
            let config = self.config.clone();
            tokio::spawn(async move {
                if let Err(err) = listener_loop(reader, pool, dispatcher, config).await {
                    tracing::error!(%err, "listener stopped");
                }
                let _ = closed_tx.send(());
            })
        };

        Ok(Session {
            config: self.config,
            pool,
            writer: writer_handle,
            closed: closed_rx,
            listener_task,
            _writer_task: writer_task,
        })
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// An established connection to the peer.
///
/// Cheap to share by reference across tasks; every call runs its own
/// allocate/send/wait cycle, so up to `max_concurrent_requests` calls can
/// be in flight at once.
pub struct Session {
    config: ProtocolConfig,
    pool: Arc<RequestPool>,
    writer: WriterHandle,
    closed: oneshot::Receiver<()>,
    listener_task: JoinHandle<()>,
    _writer_task: JoinHandle<Result<()>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session builder.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Issue a remote call and decode the response payload.
    ///
    /// Allocates a request id (waiting if all ids are in flight), sends
    /// the Request frame and blocks this task until the matching Response
    /// arrives or `response_timeout` elapses.
    ///
    /// # Errors
    ///
    /// `ResponseTimeout` if the reply never arrives (the id is reclaimed
    /// either way), `ConnectionClosed` if the writer is gone, decode
    /// errors from `T`.
    pub async fn call<T: FromPayload>(&self, instruction: u8, payload: &[u8]) -> Result<T> {
        validate_instruction(instruction)?;

        let ticket = self.pool.allocate().await;
        let frame = match encode_request(
            ticket.id(),
            instruction,
            payload,
            self.config.max_payload_length,
        ) {
            Ok(frame) => frame,
            Err(err) => {
                // Nothing went on the wire; no response to expect.
                ticket.cancel();
                return Err(err);
            }
        };

        if let Err(err) = self.writer.send(Bytes::from(frame)).await {
            ticket.cancel();
            return Err(err);
        }

        let bytes = self.pool.take(ticket).await?;
        T::from_payload(&bytes)
    }

    /// Issue a call with no meaningful reply.
    ///
    /// Still waits for the peer's empty acknowledgement; that barrier is
    /// the protocol's flow control.
    pub async fn call_unit(&self, instruction: u8, payload: &[u8]) -> Result<()> {
        self.call::<()>(instruction, payload).await
    }

    /// Read an analog pin. The reply is a Big Endian 16-bit value.
    pub async fn analog_read(&self, pin: u8) -> Result<i16> {
        self.call(instructions::ANALOG_READ, &[pin]).await
    }

    /// Set an analog (PWM) pin level.
    pub async fn analog_write(&self, pin: u8, value: u8) -> Result<()> {
        self.call_unit(instructions::ANALOG_WRITE, &[pin, value]).await
    }

    /// Read a digital pin. The reply is a Big Endian 32-bit value, zero
    /// meaning low.
    pub async fn digital_read(&self, pin: u8) -> Result<bool> {
        let value: i32 = self.call(instructions::DIGITAL_READ, &[pin]).await?;
        Ok(value != 0)
    }

    /// Set a digital pin level.
    pub async fn digital_write(&self, pin: u8, level: bool) -> Result<()> {
        self.call_unit(instructions::DIGITAL_WRITE, &[pin, level as u8])
            .await
    }

    /// Send text for the peer to display.
    pub async fn print(&self, text: &str) -> Result<()> {
        self.call_unit(instructions::PRINT, text.as_bytes()).await
    }

    /// Whether the listener is still serving the connection.
    pub fn is_connected(&self) -> bool {
        !self.listener_task.is_finished()
    }

    /// Wait until the connection closes (transport EOF or error).
    ///
    /// Consumes the session and resolves once the listener has exited.
    pub async fn wait_for_close(self) -> Result<()> {
        let _ = self.closed.await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_configuration() {
        let builder = Session::builder()
            .handshake_timeout(Duration::from_millis(1000))
            .handshake_resend_interval(Duration::from_millis(5))
            .frame_inactivity_timeout(Duration::from_millis(15))
            .response_timeout(Duration::from_millis(250))
            .max_concurrent_requests(8)
            .max_payload_length(32);

        assert_eq!(builder.config.handshake_timeout, Duration::from_millis(1000));
        assert_eq!(
            builder.config.handshake_resend_interval,
            Duration::from_millis(5)
        );
        assert_eq!(
            builder.config.frame_inactivity_timeout,
            Duration::from_millis(15)
        );
        assert_eq!(builder.config.response_timeout, Duration::from_millis(250));
        assert_eq!(builder.config.max_concurrent_requests, 8);
        assert_eq!(builder.config.max_payload_length, 32);
    }

    #[test]
    fn builder_rejects_duplicate_function_ids() {
        let result = Session::builder()
            .on_function(1, |_, _, _| {})
            .unwrap()
            .on_function(1, |_, _, _| {});

        assert!(matches!(
            result.unwrap_err(),
            crate::PinwireError::FunctionAlreadyRegistered(1)
        ));
    }
}
