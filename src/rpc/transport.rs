//! Transports carrying envelopes between an endpoint and the frontend
//!
//! Outbound traffic goes through the [`Transport`] trait. Inbound traffic is
//! delivered to [`Endpoint::listen`](super::Endpoint::listen) as a stream of
//! [`InboundMessage`]s over an unbounded channel.

use parking_lot::Mutex;
use serde_json::{Value, json};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

use super::error::TransportError;

/// Binary attachment carried next to a JSON message
pub type Buffer = Vec<u8>;

/// Outbound side of a duplex channel
pub trait Transport: Send + Sync {
    /// Send one JSON message with optional binary buffers.
    fn send(&self, message: Value, buffers: Vec<Buffer>) -> Result<(), TransportError>;

    /// Tear the transport down. Later sends fail.
    fn close(&self) {}

    /// Whether the transport has been torn down
    fn is_closed(&self) -> bool {
        false
    }
}

/// Raw message received from the frontend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Undecoded JSON bytes
    pub data: Vec<u8>,
    /// Binary buffers delivered alongside
    pub buffers: Vec<Buffer>,
}

impl InboundMessage {
    /// Wrap raw bytes.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            buffers: Vec::new(),
        }
    }

    /// Encode a JSON value.
    pub fn json(value: &Value) -> Self {
        Self::new(value.to_string())
    }

    /// Attach binary buffers.
    pub fn with_buffers(mut self, buffers: Vec<Buffer>) -> Self {
        self.buffers = buffers;
        self
    }
}

/// Message sent by an endpoint, as observed by the frontend side
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    /// JSON envelope
    pub message: Value,
    /// Binary buffers
    pub buffers: Vec<Buffer>,
}

/// In-process transport backed by a tokio channel
pub struct ChannelTransport {
    outbound: mpsc::UnboundedSender<OutboundMessage>,
    closed: AtomicBool,
}

impl Transport for ChannelTransport {
    fn send(&self, message: Value, buffers: Vec<Buffer>) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send(OutboundMessage { message, buffers })
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.outbound.is_closed()
    }
}

/// The frontend end of a [`ChannelTransport`]
///
/// Used for embedding a frontend in-process and for driving endpoints in tests.
pub struct FrontendPeer {
    outbound: mpsc::UnboundedReceiver<OutboundMessage>,
    inbound: mpsc::UnboundedSender<InboundMessage>,
}

/// Create a linked transport, inbound stream and frontend peer.
pub fn channel_pair() -> (
    ChannelTransport,
    mpsc::UnboundedReceiver<InboundMessage>,
    FrontendPeer,
) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    (
        ChannelTransport {
            outbound: outbound_tx,
            closed: AtomicBool::new(false),
        },
        inbound_rx,
        FrontendPeer {
            outbound: outbound_rx,
            inbound: inbound_tx,
        },
    )
}

impl FrontendPeer {
    /// Next message sent by the endpoint, or `None` once the transport is gone.
    pub async fn recv(&mut self) -> Option<OutboundMessage> {
        self.outbound.recv().await
    }

    /// Next message if one is already queued.
    pub fn try_recv(&mut self) -> Option<OutboundMessage> {
        self.outbound.try_recv().ok()
    }

    /// Deliver raw bytes to the endpoint. Returns `false` if nobody is listening.
    pub fn send_raw(&self, message: InboundMessage) -> bool {
        self.inbound.send(message).is_ok()
    }

    /// Deliver a JSON message to the endpoint.
    pub fn send_json(&self, value: Value) -> bool {
        self.send_raw(InboundMessage::json(&value))
    }

    /// Run the handshake: `initializing` then `ready`.
    pub fn ready(&self) -> bool {
        self.send_json(json!({ "init": "initializing" })) && self.send_json(json!({ "init": "ready" }))
    }

    /// Answer a request with a payload.
    pub fn respond(&self, request_id: &str, payload: Value) -> bool {
        self.send_json(json!({ "requestId": request_id, "payload": payload }))
    }

    /// Answer a request with an error message.
    pub fn fail(&self, request_id: &str, message: &str) -> bool {
        self.send_json(json!({ "requestId": request_id, "error": message }))
    }

    /// Ask the endpoint to perform an operation.
    pub fn request(&self, remote_request_id: &str, operation: &str, payload: Value) -> bool {
        self.send_json(json!({
            "remoteRequestId": remote_request_id,
            "operation": operation,
            "payload": payload,
        }))
    }

    /// Signal that the frontend side closed.
    pub fn close(&self) -> bool {
        self.send_json(json!({ "closed": true }))
    }
}

/// Transport writing newline-delimited JSON to any writer
///
/// Binary buffers are inlined as `"buffers": [[u8, ...], ...]`.
pub struct NdjsonTransport<W: Write + Send> {
    writer: Mutex<W>,
    closed: AtomicBool,
}

impl<W: Write + Send> NdjsonTransport<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
            closed: AtomicBool::new(false),
        }
    }
}

impl<W: Write + Send> Transport for NdjsonTransport<W> {
    fn send(&self, mut message: Value, buffers: Vec<Buffer>) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if !buffers.is_empty() {
            if let Value::Object(fields) = &mut message {
                fields.insert("buffers".to_string(), json!(buffers));
            }
        }

        let mut writer = self.writer.lock();
        serde_json::to_writer(&mut *writer, &message)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Err(err) = self.writer.lock().flush() {
            tracing::debug!(error = %err, "flush on close failed");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Read newline-delimited JSON from `reader` into `sink` until EOF.
///
/// Blank lines are skipped. Lines are forwarded undecoded; the endpoint's
/// demultiplexer reports malformed ones. Returns the number of forwarded lines.
pub async fn read_ndjson<R>(reader: R, sink: mpsc::UnboundedSender<InboundMessage>) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0;
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if sink.send(InboundMessage::new(line)).is_err() {
            tracing::debug!("inbound sink closed, stopping reader");
            break;
        }
        forwarded += 1;
    }
    Ok(forwarded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_channel_transport_round_trip() {
        let (transport, mut inbound, mut peer) = channel_pair();
        transport.send(json!({"a": 1}), vec![vec![1, 2]]).unwrap();
        let sent = peer.recv().await.unwrap();
        assert_eq!(sent.message, json!({"a": 1}));
        assert_eq!(sent.buffers, vec![vec![1, 2]]);

        assert!(peer.respond("r1", json!(5)));
        let received = inbound.recv().await.unwrap();
        let value: Value = serde_json::from_slice(&received.data).unwrap();
        assert_eq!(value, json!({"requestId": "r1", "payload": 5}));

        transport.close();
        assert!(matches!(
            transport.send(json!({}), Vec::new()),
            Err(TransportError::Closed)
        ));
    }

    #[test]
    fn test_ndjson_transport_writes_lines() {
        let transport = NdjsonTransport::new(Vec::new());
        transport.send(json!({"a": 1}), Vec::new()).unwrap();
        transport.send(json!({"b": 2}), vec![vec![7]]).unwrap();
        let written = transport.writer.lock().clone();
        let text = String::from_utf8(written).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec![r#"{"a":1}"#, r#"{"b":2,"buffers":[[7]]}"#]);
    }

    #[tokio::test]
    async fn test_read_ndjson_skips_blank_lines() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let input = Cursor::new(b"{\"init\":\"ready\"}\n\n  \n{\"closed\":true}\n".to_vec());
        let count = read_ndjson(input, tx).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(rx.recv().await.unwrap().data, br#"{"init":"ready"}"#.to_vec());
        assert_eq!(rx.recv().await.unwrap().data, br#"{"closed":true}"#.to_vec());
    }
}
