//! # pinwire
//!
//! Host-side request/response protocol engine for a raw serial link to a
//! small embedded peer.
//!
//! The host issues synchronous-looking remote calls (read a pin, write a
//! pin, print text) while the peer can asynchronously push calls back
//! (log a line, invoke a registered host function). Underneath sits a
//! marker-framed byte protocol with a nonce handshake, a bounded pool of
//! in-flight request ids, one demultiplexing listener task and a
//! correlation mechanism that matches every reply to its caller by id,
//! with a deadline.
//!
//! ## Architecture
//!
//! - **Caller side**: allocate id, encode Request frame, queue it on the
//!   writer task, suspend on the slot until filled or timed out
//! - **Listener side**: scan bytes into frames, fill request slots with
//!   Response payloads, dispatch peer-initiated Requests to handlers
//!
//! ## Example
//!
//! ```ignore
//! use pinwire::Session;
//!
//! #[tokio::main]
//! async fn main() -> pinwire::Result<()> {
//!     let session = Session::builder().connect(transport).await?;
//!     let value = session.analog_read(3).await?;
//!     println!("pin 3 reads {value}");
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod transport;

mod handshake;
mod listener;
mod pool;
mod session;
mod writer;

pub use config::ProtocolConfig;
pub use error::{PinwireError, Result};
pub use session::{Session, SessionBuilder};
