//! One persistent TCP connection to a Dubbo provider.
//!
//! A single writer lane (the `tokio::sync::Mutex` around the write half)
//! serializes outbound frames; a single reader task owns the read half
//! and demultiplexes inbound frames to the pending call that requested
//! them, correlated solely by request id. `Drop` aborts the reader task
//! as a best-effort cleanup for connections that go out of scope without
//! an explicit `close()`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{DubboError, DubboResult};
use crate::protocol::decoder::{response_exception, Decoder};
use crate::protocol::wire::{self, FrameHeader};
use crate::value::Value;

/// Read-side outcome of a completed response frame, delivered to the
/// pending call's oneshot.
enum Outcome {
    Value(Value),
    Exception(DubboError),
}

struct PendingCall {
    sender: oneshot::Sender<Outcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Ready,
    Broken,
    Closed,
}

/// One persistent connection to `host:port`. Carries the monotonic
/// request-id allocator and the pending-call correlation table described
/// in the data model.
pub struct Connection {
    host: String,
    write_half: tokio::sync::Mutex<OwnedWriteHalf>,
    next_id: AtomicI64,
    pending: Arc<Mutex<HashMap<i64, PendingCall>>>,
    state: Arc<Mutex<ConnState>>,
    reader_task: JoinHandle<()>,
}

impl Connection {
    /// Open a new connection. Performs no handshake — the frame protocol
    /// carries no startup exchange.
    pub async fn connect(host: &str) -> DubboResult<Self> {
        let stream = TcpStream::connect(host)
            .await
            .map_err(|e| DubboError::transport(format!("connect to {host} failed: {e}")))?;
        stream.set_nodelay(true).ok();

        let (read_half, write_half) = stream.into_split();
        let pending: Arc<Mutex<HashMap<i64, PendingCall>>> = Arc::new(Mutex::new(HashMap::new()));
        let state = Arc::new(Mutex::new(ConnState::Ready));

        let reader_task = tokio::spawn(read_loop(
            read_half,
            pending.clone(),
            state.clone(),
            host.to_string(),
        ));

        tracing::debug!(host, "dubbo connection ready");

        Ok(Self {
            host: host.to_string(),
            write_half: tokio::sync::Mutex::new(write_half),
            next_id: AtomicI64::new(1),
            pending,
            state,
            reader_task,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn is_broken(&self) -> bool {
        *self.state.lock() != ConnState::Ready
    }

    fn mark_broken(&self) {
        let mut state = self.state.lock();
        if *state == ConnState::Ready {
            *state = ConnState::Broken;
        }
    }

    /// Send `body` as a fresh request and wait up to `timeout` for the
    /// correlated response. `interface`/`method` are carried only for
    /// error context (the frame correlation itself is by request id).
    pub async fn invoke(
        &self,
        body: &[u8],
        interface: &str,
        method: &str,
        timeout: Duration,
    ) -> DubboResult<Value> {
        if self.is_broken() {
            return Err(DubboError::transport(format!(
                "connection to {} is broken",
                self.host
            )));
        }

        let request_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();

        // Reserving the slot happens-before the write below, so a fast
        // response can never arrive before its slot exists.
        self.pending.lock().insert(request_id, PendingCall { sender: tx });

        let frame = wire::encode_request_frame(request_id, body);
        {
            let mut writer = self.write_half.lock().await;
            if let Err(e) = writer.write_all(&frame).await {
                self.pending.lock().remove(&request_id);
                self.mark_broken();
                return Err(DubboError::transport(format!(
                    "write to {} failed: {e}",
                    self.host
                )));
            }
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Outcome::Value(v))) => Ok(v),
            Ok(Ok(Outcome::Exception(e))) => Err(e),
            Ok(Err(_)) => Err(DubboError::transport(format!(
                "connection to {} closed before response to {method} arrived",
                self.host
            ))),
            Err(_elapsed) => {
                self.pending.lock().remove(&request_id);
                Err(DubboError::TimeoutError {
                    interface: interface.to_string(),
                    method: method.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Best-effort close: aborts the reader task and fails any calls
    /// still outstanding with a `TransportError`.
    pub fn close(&self) {
        self.mark_broken();
        *self.state.lock() = ConnState::Closed;
        self.reader_task.abort();
        drain_pending(&self.pending, &self.host);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

fn drain_pending(pending: &Mutex<HashMap<i64, PendingCall>>, host: &str) {
    for (_, call) in pending.lock().drain() {
        let _ = call.sender.send(Outcome::Exception(DubboError::transport(format!(
            "connection to {host} lost"
        ))));
    }
}

async fn read_loop(
    mut read_half: OwnedReadHalf,
    pending: Arc<Mutex<HashMap<i64, PendingCall>>>,
    state: Arc<Mutex<ConnState>>,
    host: String,
) {
    let mut buf = BytesMut::with_capacity(65536);
    loop {
        match read_frame(&mut read_half, &mut buf).await {
            Ok(Some((header, body))) => {
                dispatch_response(&pending, header, body);
            }
            Ok(None) => {
                tracing::debug!(host = %host, "connection closed by peer");
                break;
            }
            Err(e) => {
                tracing::warn!(host = %host, error = %e, "transport error reading response");
                break;
            }
        }
    }
    let mut guard = state.lock();
    if *guard == ConnState::Ready {
        *guard = ConnState::Broken;
    }
    drop(guard);
    drain_pending(&pending, &host);
}

/// Reads one full frame, growing `buf` as needed. Returns `Ok(None)` on
/// clean EOF before any bytes of a new frame have arrived.
async fn read_frame(
    read_half: &mut OwnedReadHalf,
    buf: &mut BytesMut,
) -> DubboResult<Option<(FrameHeader, BytesMut)>> {
    while buf.len() < wire::HEADER_LEN {
        let mut chunk = [0u8; 4096];
        let n = read_half
            .read(&mut chunk)
            .await
            .map_err(|e| DubboError::transport(format!("read failed: {e}")))?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(DubboError::transport("connection closed mid-frame"));
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let header = wire::decode_header(buf)
        .map_err(|e| DubboError::transport(e.to_string()))?
        .expect("header-length bytes are present");

    let total_len = wire::HEADER_LEN + header.data_length as usize;
    while buf.len() < total_len {
        let mut chunk = [0u8; 4096];
        let n = read_half
            .read(&mut chunk)
            .await
            .map_err(|e| DubboError::transport(format!("read failed: {e}")))?;
        if n == 0 {
            return Err(DubboError::transport("connection closed mid-body"));
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let mut frame = buf.split_to(total_len);
    let body = frame.split_off(wire::HEADER_LEN);
    Ok(Some((header, body)))
}

fn dispatch_response(pending: &Mutex<HashMap<i64, PendingCall>>, header: FrameHeader, body: BytesMut) {
    let call = match pending.lock().remove(&header.request_id) {
        Some(call) => call,
        // Late response for a timed-out or already-resolved call: discard
        // without failing the connection.
        None => {
            tracing::debug!(request_id = header.request_id, "discarding unmatched response");
            return;
        }
    };

    let outcome = decode_response_body(header.status, &body);
    let _ = call.sender.send(outcome);
}

fn decode_response_body(status: u8, body: &[u8]) -> Outcome {
    if status != wire::STATUS_OK {
        let message = Decoder::new(body)
            .decode_value()
            .ok()
            .and_then(|v| match v {
                Value::String(s) => Some(s),
                other => Some(format!("{other:?}")),
            })
            .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());
        return Outcome::Exception(response_exception(status, message));
    }

    let mut decoder = Decoder::new(body);
    match decoder.decode_value() {
        Ok(v) => Outcome::Value(v),
        Err(e) => Outcome::Exception(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn fake_provider(response: Vec<u8>) -> (String, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handle = tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(&response).await;
            }
        });
        (addr, handle)
    }

    fn ok_frame(request_id: i64, body: &[u8]) -> Vec<u8> {
        let mut frame = wire::encode_request_frame(request_id, body).to_vec();
        frame[3] = wire::STATUS_OK;
        frame
    }

    #[tokio::test]
    async fn test_invoke_roundtrip() {
        let mut body = BytesMut::new();
        body.extend_from_slice(&[0x00 + 2]);
        body.extend_from_slice(b"hi");
        let (addr, _server) = fake_provider(ok_frame(1, &body)).await;

        let conn = Connection::connect(&addr).await.unwrap();
        let result = conn
            .invoke(b"ping", "com.example.Svc", "ping", Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(result, Value::String("hi".to_string()));
    }

    #[tokio::test]
    async fn test_invoke_times_out_without_response() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let _server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            // Hold the connection open without ever responding.
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let conn = Connection::connect(&addr).await.unwrap();
        let err = conn
            .invoke(b"ping", "com.example.Svc", "ping", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, DubboError::TimeoutError { .. }));
    }

    #[tokio::test]
    async fn test_connection_marks_broken_on_peer_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let conn = Connection::connect(&addr).await.unwrap();
        let result = conn
            .invoke(b"ping", "com.example.Svc", "ping", Duration::from_secs(1))
            .await;
        assert!(result.is_err());
        // give the reader task a moment to observe EOF and drain pending
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(conn.is_broken());
    }
}
