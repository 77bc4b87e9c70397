//! End-to-end tests for pinwire.
//!
//! Each test drives a real `Session` over an in-memory duplex pipe against
//! a scripted peer that speaks the wire protocol byte for byte.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use pinwire::protocol::{
    encode_response, instructions, Frame, FrameBuffer, REQUEST_END, REQUEST_START,
};
use pinwire::{PinwireError, Session, SessionBuilder};

const MAX_PAYLOAD: usize = 100;

/// Scripted peer: handshake responder plus a frame-level read/write API.
struct Peer {
    stream: DuplexStream,
    scanner: FrameBuffer,
    queue: VecDeque<Frame>,
}

impl Peer {
    fn new(stream: DuplexStream) -> Self {
        Self {
            stream,
            scanner: FrameBuffer::new(MAX_PAYLOAD, 50),
            queue: VecDeque::new(),
        }
    }

    async fn read_byte(&mut self) -> u8 {
        let mut byte = [0u8; 1];
        self.stream.read_exact(&mut byte).await.unwrap();
        byte[0]
    }

    /// Read one `< n >` handshake frame and return its nonce.
    async fn read_nonce(&mut self) -> u8 {
        loop {
            while self.read_byte().await != REQUEST_START {}
            let nonce = self.read_byte().await;
            if self.read_byte().await == REQUEST_END {
                return nonce;
            }
        }
    }

    /// Play the responder side of the handshake; returns the host nonce.
    async fn handshake(&mut self) -> u8 {
        let host_nonce = self.read_nonce().await;
        // A peer nonce distinct from the host's keeps the ack unambiguous.
        let peer_nonce = host_nonce.wrapping_add(1);

        self.stream
            .write_all(&[REQUEST_START, host_nonce, REQUEST_END])
            .await
            .unwrap();
        self.stream
            .write_all(&[REQUEST_START, peer_nonce, REQUEST_END])
            .await
            .unwrap();

        // Skip queued SYN resends until the ack of our nonce arrives.
        loop {
            if self.read_nonce().await == peer_nonce {
                return host_nonce;
            }
        }
    }

    /// Read the next complete application frame.
    async fn next_frame(&mut self) -> Frame {
        loop {
            if let Some(frame) = self.queue.pop_front() {
                return frame;
            }
            let mut buf = [0u8; 128];
            let n = self.stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "host closed the stream");
            self.queue.extend(self.scanner.push(&buf[..n]));
        }
    }

    async fn respond(&mut self, id: u8, payload: &[u8]) {
        let bytes = encode_response(id, payload, MAX_PAYLOAD).unwrap();
        self.stream.write_all(&bytes).await.unwrap();
    }

    async fn write_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }
}

/// Route protocol logs through `RUST_LOG` when debugging a failing test.
fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

fn builder() -> SessionBuilder {
    init_tracing();
    Session::builder().response_timeout(Duration::from_millis(400))
}

#[tokio::test]
async fn analog_read_round_trip() {
    let (host_end, peer_end) = tokio::io::duplex(1024);
    let mut peer = Peer::new(peer_end);

    let host = tokio::spawn(async move {
        let session = builder().connect(host_end).await?;
        session.analog_read(3).await
    });

    peer.handshake().await;

    let request = peer.next_frame().await;
    assert!(request.is_request());
    assert_eq!(request.instruction, Some(instructions::ANALOG_READ));
    assert_eq!(request.payload(), &[3]);

    // 42 as a Big Endian 16-bit value.
    peer.respond(request.id, &[0x00, 0x2A]).await;

    assert_eq!(host.await.unwrap().unwrap(), 42);
}

#[tokio::test]
async fn digital_read_decodes_a_big_endian_word() {
    let (host_end, peer_end) = tokio::io::duplex(1024);
    let mut peer = Peer::new(peer_end);

    let host = tokio::spawn(async move {
        let session = builder().connect(host_end).await?;
        session.digital_read(13).await
    });

    peer.handshake().await;
    let request = peer.next_frame().await;
    assert_eq!(request.instruction, Some(instructions::DIGITAL_READ));
    peer.respond(request.id, &[0x00, 0x00, 0x00, 0x01]).await;

    assert!(host.await.unwrap().unwrap());
}

#[tokio::test]
async fn fire_and_forget_waits_for_the_acknowledgement() {
    let (host_end, peer_end) = tokio::io::duplex(1024);
    let mut peer = Peer::new(peer_end);

    let host = tokio::spawn(async move {
        let session = builder().connect(host_end).await?;
        let start = Instant::now();
        session.analog_write(5, 128).await?;
        Ok::<_, PinwireError>(start.elapsed())
    });

    peer.handshake().await;

    let request = peer.next_frame().await;
    assert_eq!(request.instruction, Some(instructions::ANALOG_WRITE));
    assert_eq!(request.payload(), &[5, 128]);

    // Delay the empty acknowledgement; the caller must block on it.
    tokio::time::sleep(Duration::from_millis(40)).await;
    peer.respond(request.id, &[]).await;

    let waited = host.await.unwrap().unwrap();
    assert!(waited >= Duration::from_millis(35), "caller did not wait for the ack");
}

#[tokio::test]
async fn out_of_order_responses_correlate_by_id() {
    let (host_end, peer_end) = tokio::io::duplex(1024);
    let mut peer = Peer::new(peer_end);

    let host = tokio::spawn(async move {
        let session = builder().connect(host_end).await?;
        let (x, y) = tokio::join!(
            session.call::<Bytes>(b'x', &[1]),
            session.call::<Bytes>(b'y', &[2]),
        );
        Ok::<_, PinwireError>((x?, y?))
    });

    peer.handshake().await;

    let first = peer.next_frame().await;
    let second = peer.next_frame().await;
    let (x_req, y_req) = if first.instruction == Some(b'x') {
        (first, second)
    } else {
        (second, first)
    };
    assert_ne!(x_req.id, y_req.id);

    // Answer in the opposite order of arrival.
    peer.respond(y_req.id, b"YY").await;
    peer.respond(x_req.id, b"XX").await;

    let (x, y) = host.await.unwrap().unwrap();
    assert_eq!(&x[..], b"XX");
    assert_eq!(&y[..], b"YY");
}

#[tokio::test]
async fn response_timeout_reclaims_the_id() {
    let (host_end, peer_end) = tokio::io::duplex(1024);
    let mut peer = Peer::new(peer_end);

    let (result_tx, mut result_rx) = tokio::sync::mpsc::channel(4);
    let host = tokio::spawn(async move {
        let session = builder()
            .response_timeout(Duration::from_millis(60))
            .connect(host_end)
            .await?;

        let start = Instant::now();
        let first = session.analog_read(3).await;
        result_tx.send((first, start.elapsed())).await.unwrap();

        session.analog_read(3).await
    });

    peer.handshake().await;

    // Swallow the first request entirely.
    let first_req = peer.next_frame().await;
    let (first, elapsed) = result_rx.recv().await.unwrap();
    assert!(matches!(first, Err(PinwireError::ResponseTimeout(_))));
    assert!(elapsed >= Duration::from_millis(60));
    assert!(elapsed < Duration::from_millis(400), "timeout fired far too late");

    // The overdue response shows up now; the pool must discard it.
    peer.respond(first_req.id, &[0x7F, 0xFF]).await;

    // The id is immediately reusable and the retry sees only its own reply.
    let second_req = peer.next_frame().await;
    assert_eq!(second_req.id, first_req.id);
    peer.respond(second_req.id, &[0x00, 0x2A]).await;

    assert_eq!(host.await.unwrap().unwrap(), 42);
}

#[tokio::test]
async fn pool_exhaustion_is_backpressure_not_failure() {
    let (host_end, peer_end) = tokio::io::duplex(1024);
    let mut peer = Peer::new(peer_end);

    let host = tokio::spawn(async move {
        let session = builder()
            .max_concurrent_requests(2)
            .connect(host_end)
            .await?;
        let (a, b, c) = tokio::join!(
            session.call::<Bytes>(b'x', &[1]),
            session.call::<Bytes>(b'x', &[2]),
            session.call::<Bytes>(b'x', &[3]),
        );
        Ok::<_, PinwireError>((a?, b?, c?))
    });

    peer.handshake().await;

    let first = peer.next_frame().await;
    let second = peer.next_frame().await;

    // Both ids are in flight; the third call must be held back.
    let held = tokio::time::timeout(Duration::from_millis(50), peer.next_frame()).await;
    assert!(held.is_err(), "third request sent while the pool was full");

    // Freeing one id lets exactly the waiting call through.
    peer.respond(first.id, first.payload()).await;
    let third = peer.next_frame().await;

    peer.respond(second.id, second.payload()).await;
    peer.respond(third.id, third.payload()).await;

    let (a, b, c) = host.await.unwrap().unwrap();
    assert_eq!(&a[..], &[1]);
    assert_eq!(&b[..], &[2]);
    assert_eq!(&c[..], &[3]);
}

#[tokio::test]
async fn peer_initiated_calls_reach_registered_functions() {
    let (host_end, peer_end) = tokio::io::duplex(1024);
    let mut peer = Peer::new(peer_end);

    let (seen_tx, mut seen_rx) = tokio::sync::mpsc::unbounded_channel();
    let host = tokio::spawn(async move {
        let session = builder()
            .on_function(7, move |payload, function_id, request_id| {
                seen_tx
                    .send((payload.to_vec(), function_id, request_id))
                    .unwrap();
            })?
            .connect(host_end)
            .await?;

        // Keep the session alive until the peer script finishes.
        session.analog_read(0).await
    });

    peer.handshake().await;

    // An unknown instruction first; it must be ignored without harm.
    peer.write_raw(&[b'<', 4, 1, b'z', 0xEE, b'>']).await;

    // Then a genuine function call: selector 7, two payload bytes.
    peer.write_raw(&[b'<', 9, 3, instructions::FUNCTION_CALL, 7, 0xAB, 0xCD, b'>'])
        .await;

    // A log line from the peer exercises the same inbound path.
    peer.write_raw(&[b'<', 2, 5, instructions::LOG, b'h', b'e', b'l', b'l', b'o', b'>'])
        .await;

    // The listener is still healthy: serve the host's own call.
    let request = peer.next_frame().await;
    peer.respond(request.id, &[0x00, 0x05]).await;
    assert_eq!(host.await.unwrap().unwrap(), 5);

    let (payload, function_id, request_id) = seen_rx.try_recv().unwrap();
    assert_eq!(payload, vec![0xAB, 0xCD]);
    assert_eq!(function_id, 7);
    assert_eq!(request_id, 9);
}

#[tokio::test]
async fn print_sends_text_and_waits_for_the_ack() {
    let (host_end, peer_end) = tokio::io::duplex(1024);
    let mut peer = Peer::new(peer_end);

    let host = tokio::spawn(async move {
        let session = builder().connect(host_end).await?;
        session.print("hello peer").await
    });

    peer.handshake().await;

    let request = peer.next_frame().await;
    assert_eq!(request.instruction, Some(instructions::PRINT));
    assert_eq!(request.payload(), b"hello peer");
    peer.respond(request.id, &[]).await;

    host.await.unwrap().unwrap();
}

#[tokio::test]
async fn silent_peer_fails_the_handshake() {
    init_tracing();
    let (host_end, _peer_end) = tokio::io::duplex(256);

    let start = Instant::now();
    let result = Session::builder()
        .handshake_timeout(Duration::from_millis(60))
        .connect(host_end)
        .await;

    assert!(matches!(result.unwrap_err(), PinwireError::HandshakeFailed));
    assert!(start.elapsed() >= Duration::from_millis(60));
}

#[tokio::test]
async fn session_observes_transport_close() {
    let (host_end, peer_end) = tokio::io::duplex(1024);
    let mut peer = Peer::new(peer_end);

    let (session_tx, session_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let session = builder().connect(host_end).await.unwrap();
        session_tx.send(session).ok();
    });

    peer.handshake().await;
    let session = session_rx.await.unwrap();
    assert!(session.is_connected());

    drop(peer);
    tokio::time::timeout(Duration::from_millis(200), session.wait_for_close())
        .await
        .expect("close not observed")
        .unwrap();
}
