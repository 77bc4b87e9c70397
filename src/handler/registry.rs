//! Host function registry for peer-initiated calls.
//!
//! The peer addresses host functions by a one-byte selector. Selectors
//! map to registered callback capabilities; registration is validated up
//! front so dispatch never meets an unchecked function pointer.

use std::collections::HashMap;

use crate::error::{PinwireError, Result};

/// Callback invoked for a peer-initiated function call.
///
/// Arguments: payload bytes (after the selector), function id, request id.
pub type FunctionCallback = Box<dyn Fn(&[u8], u8, u8) + Send + Sync>;

/// Registry mapping function ids to host callbacks.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: HashMap<u8, FunctionCallback>,
}

impl FunctionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for a function id.
    ///
    /// # Errors
    ///
    /// `FunctionAlreadyRegistered` if the id is taken.
    pub fn register<F>(&mut self, function_id: u8, callback: F) -> Result<()>
    where
        F: Fn(&[u8], u8, u8) + Send + Sync + 'static,
    {
        if self.functions.contains_key(&function_id) {
            return Err(PinwireError::FunctionAlreadyRegistered(function_id));
        }
        self.functions.insert(function_id, Box::new(callback));
        Ok(())
    }

    /// Look up a callback by function id.
    pub fn get(&self, function_id: u8) -> Option<&FunctionCallback> {
        self.functions.get(&function_id)
    }

    /// Number of registered functions.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Check if no functions are registered.
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.functions.keys().collect();
        ids.sort();
        f.debug_struct("FunctionRegistry").field("ids", &ids).finish()
    }
}
