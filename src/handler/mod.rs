//! Handler module - dispatch of peer-initiated inbound calls.
//!
//! The peer can push Request frames at any time, independent of anything
//! the host has in flight. The dispatcher interprets the instruction byte:
//! a log instruction prints the payload as peer text, a function-call
//! instruction routes to a callback registered in [`FunctionRegistry`].
//! Dispatch failures surface as errors for the listener to log; they are
//! never fatal to the connection.

mod registry;

pub use registry::{FunctionCallback, FunctionRegistry};

use crate::error::{PinwireError, Result};
use crate::protocol::{instructions, Frame};

/// Dispatches decoded inbound Request frames to host-side handlers.
pub struct InboundDispatcher {
    registry: FunctionRegistry,
}

impl InboundDispatcher {
    /// Create a dispatcher over a validated registry.
    pub fn new(registry: FunctionRegistry) -> Self {
        Self { registry }
    }

    /// Handle one peer-initiated Request frame.
    ///
    /// # Errors
    ///
    /// `UnknownInstruction` if the instruction or function id has no
    /// handler, `MalformedFrame` if a function call carries no selector.
    pub fn dispatch(&self, frame: &Frame) -> Result<()> {
        let Some(instruction) = frame.instruction else {
            // Response frames are routed to the pool, not here.
            return Err(PinwireError::MalformedFrame("inbound frame without instruction"));
        };

        match instruction {
            instructions::LOG => {
                let text = String::from_utf8_lossy(&frame.payload);
                tracing::info!(target: "pinwire::peer", "{}", text);
                Ok(())
            }
            instructions::FUNCTION_CALL => self.dispatch_function(frame),
            other => Err(PinwireError::UnknownInstruction(other)),
        }
    }

    fn dispatch_function(&self, frame: &Frame) -> Result<()> {
        let Some((&function_id, payload)) = frame.payload.split_first() else {
            return Err(PinwireError::MalformedFrame("function call without selector byte"));
        };

        match self.registry.get(function_id) {
            Some(callback) => {
                callback(payload, function_id, frame.id);
                Ok(())
            }
            None => Err(PinwireError::UnknownInstruction(function_id)),
        }
    }
}
