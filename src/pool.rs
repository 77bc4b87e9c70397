//! Request slot pool - bounded in-flight request ids.
//!
//! The pool is the only shared mutable state between the listener and the
//! calling tasks. Every slot transition happens under one pool-wide lock
//! with short critical sections; waiting for a response suspends only the
//! calling task (a oneshot channel with a deadline, never a poll loop).
//!
//! Each slot carries a generation counter, bumped on every release, so a
//! stale release can never free a reallocated slot. Responses that arrive
//! for an id whose caller already timed out are counted at release time
//! and discarded on arrival, so a reallocated slot never observes a
//! payload meant for its previous owner.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{oneshot, Notify};
use tokio::time::timeout;

use crate::error::{PinwireError, Result};

/// Lifecycle of one pool entry.
enum SlotState {
    /// Available for allocation.
    Free,
    /// A caller is waiting; the sender delivers the response payload.
    Allocated { tx: oneshot::Sender<Bytes> },
    /// Response delivered, caller has not released the slot yet.
    Filled,
}

struct Slot {
    state: SlotState,
    /// Bumped on every release; allocation-scoped operations must match it.
    generation: u64,
    /// Responses still expected for callers that already released this id.
    stale_fills: u32,
}

struct Shared {
    slots: Mutex<Vec<Slot>>,
    /// Signalled whenever a slot returns to `Free`.
    freed: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Vec<Slot>> {
        self.slots.lock().expect("slot pool lock poisoned")
    }

    /// Return a slot to `Free` and bump its generation.
    ///
    /// `response_outstanding` records whether the releasing caller gave up
    /// before its response arrived; the next fill for this id is then
    /// presumed stale and discarded.
    fn release(&self, id: u8, generation: u64, response_outstanding: bool) {
        let mut slots = self.lock();
        let slot = &mut slots[id as usize];
        if slot.generation != generation {
            tracing::warn!(id, "release for a stale allocation ignored");
            return;
        }

        let prev = std::mem::replace(&mut slot.state, SlotState::Free);
        if response_outstanding && matches!(prev, SlotState::Allocated { .. }) {
            slot.stale_fills += 1;
        }
        slot.generation += 1;
        drop(slots);

        self.freed.notify_one();
    }
}

/// An allocated request id.
///
/// Holds the receiving end of the response channel. Dropping a ticket
/// without consuming it releases the slot and flags the response, if it
/// ever arrives, as stale.
pub(crate) struct Ticket {
    id: u8,
    generation: u64,
    rx: Option<oneshot::Receiver<Bytes>>,
    shared: Arc<Shared>,
}

impl Ticket {
    /// The request id carried on the wire.
    #[inline]
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Release the slot for a call that was never sent.
    ///
    /// Unlike dropping the ticket, no response is expected, so the next
    /// fill for this id must not be discarded.
    pub fn cancel(mut self) {
        if self.rx.take().is_some() {
            self.shared.release(self.id, self.generation, false);
        }
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if self.rx.is_some() {
            self.shared.release(self.id, self.generation, true);
        }
    }
}

/// Fixed-size pool of request ids shared by the listener and all callers.
pub(crate) struct RequestPool {
    shared: Arc<Shared>,
    capacity: u8,
    response_timeout: Duration,
}

impl RequestPool {
    /// Create a pool with all slots `Free`.
    pub fn new(capacity: u8, response_timeout: Duration) -> Self {
        let slots = (0..capacity)
            .map(|_| Slot {
                state: SlotState::Free,
                generation: 0,
                stale_fills: 0,
            })
            .collect();

        Self {
            shared: Arc::new(Shared {
                slots: Mutex::new(slots),
                freed: Notify::new(),
            }),
            capacity,
            response_timeout,
        }
    }

    /// Reserve the lowest free id.
    ///
    /// # Errors
    ///
    /// `PoolExhausted` when every id is in flight.
    pub fn try_allocate(&self) -> Result<Ticket> {
        let mut slots = self.shared.lock();
        for (id, slot) in slots.iter_mut().enumerate() {
            if matches!(slot.state, SlotState::Free) {
                let (tx, rx) = oneshot::channel();
                slot.state = SlotState::Allocated { tx };
                return Ok(Ticket {
                    id: id as u8,
                    generation: slot.generation,
                    rx: Some(rx),
                    shared: Arc::clone(&self.shared),
                });
            }
        }
        Err(PinwireError::PoolExhausted(self.capacity))
    }

    /// Reserve an id, waiting for one to free up if the pool is exhausted.
    ///
    /// Exhaustion is backpressure: the call is never dropped, the caller
    /// is suspended until a slot is released.
    pub async fn allocate(&self) -> Ticket {
        let mut warned = false;
        loop {
            let freed = self.shared.freed.notified();
            match self.try_allocate() {
                Ok(ticket) => return ticket,
                Err(_) => {
                    if !warned {
                        tracing::warn!(
                            capacity = self.capacity,
                            "request pool exhausted; waiting for a free id"
                        );
                        warned = true;
                    }
                }
            }
            freed.await;
        }
    }

    /// Deliver a response payload into a slot. Listener only.
    ///
    /// Anomalies (free slot, duplicate, stale) are logged and discarded;
    /// nothing here ever reaches the application as an error.
    pub fn fill(&self, id: u8, payload: Bytes) {
        let mut slots = self.shared.lock();
        let Some(slot) = slots.get_mut(id as usize) else {
            tracing::warn!(id, "response for id outside the pool; dropping");
            return;
        };

        if slot.stale_fills > 0 {
            slot.stale_fills -= 1;
            tracing::debug!(id, "discarding response for an already released request");
            return;
        }

        match std::mem::replace(&mut slot.state, SlotState::Filled) {
            SlotState::Allocated { tx } => {
                if tx.send(payload).is_err() {
                    // Caller is mid-teardown; its release reclaims the slot.
                    tracing::debug!(id, "caller gone before response delivery");
                }
            }
            SlotState::Free => {
                slot.state = SlotState::Free;
                tracing::warn!(id, "unexpected response for a free id; dropping");
            }
            SlotState::Filled => {
                tracing::warn!(id, "duplicate response for id; dropping");
            }
        }
    }

    /// Wait for the slot to fill, then release it and return the payload.
    ///
    /// The slot is released on every path; a lost response costs the
    /// caller a `ResponseTimeout`, never a leaked id.
    pub async fn take(&self, mut ticket: Ticket) -> Result<Bytes> {
        let rx = ticket.rx.take().expect("ticket consumed twice");
        let (id, generation) = (ticket.id, ticket.generation);
        let shared = Arc::clone(&ticket.shared);
        // rx was taken out, so dropping the ticket releases nothing.
        drop(ticket);

        match timeout(self.response_timeout, rx).await {
            Ok(Ok(payload)) => {
                shared.release(id, generation, false);
                Ok(payload)
            }
            Ok(Err(_)) => {
                shared.release(id, generation, false);
                Err(PinwireError::ConnectionClosed)
            }
            Err(_) => {
                shared.release(id, generation, true);
                Err(PinwireError::ResponseTimeout(id))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn pool(capacity: u8, timeout_ms: u64) -> RequestPool {
        RequestPool::new(capacity, Duration::from_millis(timeout_ms))
    }

    fn payload(bytes: &[u8]) -> Bytes {
        Bytes::copy_from_slice(bytes)
    }

    #[tokio::test]
    async fn fill_then_take_roundtrip() {
        let pool = pool(4, 100);

        let ticket = pool.try_allocate().unwrap();
        assert_eq!(ticket.id(), 0);

        pool.fill(0, payload(&[0x00, 0x2A]));
        let bytes = pool.take(ticket).await.unwrap();
        assert_eq!(&bytes[..], &[0x00, 0x2A]);

        // The id is free again.
        let again = pool.try_allocate().unwrap();
        assert_eq!(again.id(), 0);
    }

    #[tokio::test]
    async fn exhaustion_and_recovery() {
        let pool = pool(3, 100);

        let mut tickets: Vec<_> = (0..3).map(|_| pool.try_allocate().unwrap()).collect();
        assert!(matches!(
            pool.try_allocate(),
            Err(PinwireError::PoolExhausted(3))
        ));

        // Releasing one id permits exactly one more allocation.
        tickets.remove(0).cancel();
        let _extra = pool.try_allocate().unwrap();
        assert!(matches!(
            pool.try_allocate(),
            Err(PinwireError::PoolExhausted(3))
        ));
    }

    #[tokio::test]
    async fn take_times_out_and_frees_the_slot() {
        let pool = pool(2, 30);

        let ticket = pool.try_allocate().unwrap();
        let id = ticket.id();

        let start = Instant::now();
        let err = pool.take(ticket).await.unwrap_err();
        let elapsed = start.elapsed();

        assert!(matches!(err, PinwireError::ResponseTimeout(i) if i == id));
        assert!(elapsed >= Duration::from_millis(30));
        assert!(elapsed < Duration::from_millis(300), "timed out far too late");

        // The id is allocatable again immediately.
        assert_eq!(pool.try_allocate().unwrap().id(), id);
    }

    #[tokio::test]
    async fn stale_fill_is_not_observed_by_the_next_caller() {
        let pool = pool(1, 30);

        // First caller times out; its response is still in flight.
        let first = pool.try_allocate().unwrap();
        assert!(pool.take(first).await.is_err());

        // Same id, new caller.
        let second = pool.try_allocate().unwrap();
        assert_eq!(second.id(), 0);

        // The late response for the first caller lands now and is
        // discarded; only the genuine response reaches the second caller.
        pool.fill(0, payload(b"stale"));
        pool.fill(0, payload(b"fresh"));

        let bytes = pool.take(second).await.unwrap();
        assert_eq!(&bytes[..], b"fresh");
    }

    #[tokio::test]
    async fn cancelled_ticket_expects_no_stale_response() {
        let pool = pool(1, 50);

        // Allocation abandoned before anything was sent.
        pool.try_allocate().unwrap().cancel();

        let ticket = pool.try_allocate().unwrap();
        pool.fill(0, payload(b"real"));
        assert_eq!(&pool.take(ticket).await.unwrap()[..], b"real");
    }

    #[tokio::test]
    async fn out_of_order_fills_correlate_by_id() {
        let pool = pool(8, 100);

        let tickets: Vec<_> = (0..8).map(|_| pool.try_allocate().unwrap()).collect();
        let mut tickets: Vec<_> = tickets
            .into_iter()
            .filter(|t| t.id() == 3 || t.id() == 7)
            .collect();
        let t7 = tickets.pop().unwrap();
        let t3 = tickets.pop().unwrap();

        // Replies arrive 7 then 3.
        pool.fill(7, payload(b"seven"));
        pool.fill(3, payload(b"three"));

        assert_eq!(&pool.take(t3).await.unwrap()[..], b"three");
        assert_eq!(&pool.take(t7).await.unwrap()[..], b"seven");
    }

    #[tokio::test]
    async fn unexpected_and_duplicate_fills_are_harmless() {
        let pool = pool(2, 50);

        // Fill on a free slot: logged, dropped.
        pool.fill(1, payload(b"nobody asked"));

        let ticket = pool.try_allocate().unwrap();
        pool.fill(0, payload(b"first"));
        // Duplicate before the caller consumed: logged, dropped.
        pool.fill(0, payload(b"second"));

        assert_eq!(&pool.take(ticket).await.unwrap()[..], b"first");
    }

    #[tokio::test]
    async fn waiting_allocation_wakes_on_release() {
        let pool = Arc::new(RequestPool::new(1, Duration::from_millis(100)));

        let held = pool.try_allocate().unwrap();

        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.allocate().await.id() })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        held.cancel();
        let id = tokio::time::timeout(Duration::from_millis(200), waiter)
            .await
            .expect("allocation did not wake")
            .unwrap();
        assert_eq!(id, 0);
    }
}
