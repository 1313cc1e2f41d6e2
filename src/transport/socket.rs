//! WebSocket transport.
//!
//! A single persistent binary-framed connection replaces the polling
//! request pair. Every frame carries a 4-byte ack header: outbound frames
//! acknowledge bytes we have received, inbound frames acknowledge bytes the
//! relay has received (releasing them from the outbound buffer). The
//! connect URL carries both positions so a dropped socket can resume where
//! it left off.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use crate::core::constants::{COUNTER_MASK, MAX_SOCKET_PAYLOAD};
use crate::core::{CloseReason, TransportError};
use crate::session::{Phase, RelayTransport, SessionCore, SessionOps};
use crate::stream::StreamEvent;

use super::frame::{AckFrame, FrameError, ack_delta, latency_report};
use super::latency::AckLatencyTracker;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// WebSocket transport over a relay session.
pub(crate) struct SocketTransport {
    session: SessionCore,
    /// Write half of the active socket, if connected.
    writer: Arc<AsyncMutex<Option<WsSink>>>,
    /// Reader task driving the active socket.
    reader: Mutex<Option<JoinHandle<()>>>,
    /// A socket is connecting or connected.
    socket_active: AtomicBool,
    /// Consecutive connect attempts since the last successful open.
    connect_attempts: AtomicU32,
    /// Ack round-trip sampling.
    latency: Mutex<AckLatencyTracker>,
}

impl SocketTransport {
    pub(crate) fn new(session: SessionCore) -> Self {
        Self {
            session,
            writer: Arc::new(AsyncMutex::new(None)),
            reader: Mutex::new(None),
            socket_active: AtomicBool::new(false),
            connect_attempts: AtomicU32::new(0),
            latency: Mutex::new(AckLatencyTracker::new()),
        }
    }

    fn connect_url(
        &self,
        sid: &str,
        ack: u64,
        pos: u64,
        attempt: u32,
    ) -> Result<reqwest::Url, TransportError> {
        let mut url = self
            .session
            .endpoint("connect")
            .map_err(|e| TransportError::Endpoint(e.to_string()))?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| TransportError::Endpoint(format!("cannot use scheme {scheme}")))?;
        url.query_pairs_mut()
            .append_pair("sid", sid)
            .append_pair("ack", &ack.to_string())
            .append_pair("pos", &pos.to_string());
        if attempt > 1 {
            url.query_pairs_mut()
                .append_pair("try", &attempt.to_string());
        }
        Ok(url)
    }

    async fn connect(self: Arc<Self>, sid: String, ack: u64, pos: u64, attempt: u32) {
        let url = match self.connect_url(&sid, ack, pos, attempt) {
            Ok(url) => url,
            Err(err) => {
                warn!(error = %err, "cannot build websocket url");
                self.socket_active.store(false, Ordering::SeqCst);
                self.on_request_error(false);
                return;
            }
        };

        debug!(attempt, ack, pos, "opening relay websocket");
        match connect_async(url.as_str()).await {
            Ok((socket, _response)) => {
                let (sink, stream) = socket.split();
                *self.writer.lock().await = Some(sink);
                self.connect_attempts.store(0, Ordering::SeqCst);

                let still_open = {
                    let mut st = self.session.state.lock();
                    if st.phase == Phase::Open {
                        // Unacknowledged bytes are resent on the fresh
                        // socket; the relay dedups by position.
                        st.outbound.rewind();
                        true
                    } else {
                        false
                    }
                };
                if !still_open {
                    *self.writer.lock().await = None;
                    self.socket_active.store(false, Ordering::SeqCst);
                    return;
                }

                info!("relay websocket connected");
                let reader = tokio::spawn(Arc::clone(&self).read_loop(stream));
                *self.reader.lock() = Some(reader);
                self.on_request_success(false);
            }
            Err(err) => {
                warn!(error = %err, attempt, "websocket connect failed");
                self.socket_active.store(false, Ordering::SeqCst);
                self.on_request_error(false);
            }
        }
    }

    async fn read_loop(self: Arc<Self>, mut stream: SplitStream<WsStream>) {
        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Binary(data)) => {
                    if let Err(err) = Arc::clone(&self).handle_frame(&data) {
                        warn!(error = %err, "fatal frame from relay");
                        self.close_with(CloseReason::ProtocolViolation);
                        return;
                    }
                }
                Ok(Message::Text(text)) => {
                    debug!(%text, "ignoring relay text message");
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(err) => {
                    debug!(error = %err, "websocket read failed");
                    break;
                }
            }
        }
        self.socket_closed().await;
    }

    /// Apply one inbound frame: release acknowledged outbound bytes,
    /// deliver payload, and feed the latency tracker.
    fn handle_frame(self: Arc<Self>, data: &[u8]) -> Result<(), FrameError> {
        let frame = AckFrame::parse(data)?;

        let (payload, acked_total, report) = {
            let mut st = self.session.state.lock();
            if st.phase != Phase::Open {
                return Ok(());
            }

            let delta = ack_delta(st.write_count, frame.ack);
            let acked_total = if delta > 0 {
                st.outbound.ack(delta as usize);
                st.write_count += delta;
                Some(st.write_count)
            } else {
                None
            };

            let payload = if frame.payload.is_empty() {
                None
            } else {
                st.read_count += frame.payload.len() as u64;
                Some(frame.payload.to_vec())
            };

            let report = self.latency.lock().on_ack(frame.ack, Instant::now());
            (payload, acked_total, report)
        };

        if let Some(bytes) = payload {
            let _ = self.session.events.send(StreamEvent::Data(bytes));
        }
        if let Some(total) = acked_total {
            debug!(total, "relay acknowledged outbound bytes");
            let _ = self.session.events.send(StreamEvent::WriteAcked { total });
        }
        if let Some(average) = report {
            self.report_latency(average);
        }

        // The socket pushes reads on its own; only the write side needs a
        // success signal.
        self.on_request_success(false);
        Ok(())
    }

    /// Send the periodic latency report as a text control message.
    fn report_latency(&self, average: Duration) {
        if !self.session.config.report_ack_latency {
            return;
        }
        let average_ms = (average.as_secs_f64() * 1000.0).round() as u64;
        debug!(average_ms, "reporting ack round-trip average");

        let writer = Arc::clone(&self.writer);
        tokio::spawn(async move {
            let mut guard = writer.lock().await;
            if let Some(sink) = guard.as_mut() {
                let _ = sink.send(Message::text(latency_report(average_ms))).await;
            }
        });
    }

    /// Drain the outbound buffer over the socket, one frame per chunk.
    async fn drain_outbound(self: Arc<Self>) {
        loop {
            let frame = {
                let mut st = self.session.state.lock();
                if st.phase != Phase::Open {
                    st.write_busy = false;
                    return;
                }
                let chunk = st.outbound.read(MAX_SOCKET_PAYLOAD);
                if chunk.is_empty() {
                    st.write_busy = false;
                    return;
                }
                let ack = (st.read_count & COUNTER_MASK) as u32;
                // The relay's ack will land at our write position plus
                // everything read-but-unacked, this chunk included.
                let expected =
                    ((st.write_count + st.outbound.read_offset() as u64) & COUNTER_MASK) as u32;
                self.latency.lock().on_send(expected, Instant::now());
                AckFrame::encode(ack, &chunk)
            };

            let sent = {
                let mut guard = self.writer.lock().await;
                match guard.as_mut() {
                    Some(sink) => sink.send(Message::binary(frame)).await.is_ok(),
                    None => {
                        // No socket yet: a connect is in flight or a retry
                        // is scheduled. Either path rewinds the buffer and
                        // re-drives the send, so just stand down.
                        self.session.state.lock().write_busy = false;
                        debug!("no socket; deferring send");
                        return;
                    }
                }
            };

            if !sent {
                self.session.state.lock().write_busy = false;
                debug!("websocket send failed");
                self.socket_closed().await;
                return;
            }
        }
    }

    /// The socket dropped (read loop ended or a send failed).
    ///
    /// If the stream is resumable this routes through the standard
    /// error/backoff path, which reconnects; otherwise the stream closes
    /// permanently. The atomic swap makes the two failure paths converge
    /// on one teardown.
    async fn socket_closed(self: Arc<Self>) {
        if !self.socket_active.swap(false, Ordering::SeqCst) {
            return;
        }
        *self.writer.lock().await = None;

        let resumable = {
            let st = self.session.state.lock();
            self.session.config.resume && st.session_id.is_some() && st.phase == Phase::Open
        };
        if resumable {
            debug!("websocket closed; scheduling reconnect");
            self.on_request_error(false);
        } else {
            self.close_with(CloseReason::ConnectionLost);
        }
    }
}

impl RelayTransport for SocketTransport {
    fn session(&self) -> &SessionCore {
        &self.session
    }

    fn resume_read(self: Arc<Self>) {
        if self
            .socket_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let params = {
            let st = self.session.state.lock();
            match &st.session_id {
                Some(sid) if !st.backoff.is_scheduled() && st.phase == Phase::Open => Some((
                    sid.clone(),
                    st.read_count & COUNTER_MASK,
                    st.write_count & COUNTER_MASK,
                )),
                _ => None,
            }
        };
        let Some((sid, ack, pos)) = params else {
            self.socket_active.store(false, Ordering::SeqCst);
            return;
        };

        let attempt = self.connect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::spawn(async move {
            self.connect(sid, ack, pos, attempt).await;
        });
    }

    fn send_write(self: Arc<Self>) {
        {
            let mut st = self.session.state.lock();
            if st.write_busy || st.backoff.is_scheduled() || st.phase != Phase::Open {
                return;
            }
            if st.outbound.unread_len() == 0 {
                return;
            }
            st.write_busy = true;
        }

        tokio::spawn(async move {
            self.drain_outbound().await;
        });
    }

    fn halt(&self) {
        self.socket_active.store(false, Ordering::SeqCst);
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }

        // Close the socket from an async context; skip the graceful close
        // if the runtime is already gone.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let writer = Arc::clone(&self.writer);
            handle.spawn(async move {
                let mut guard = writer.lock().await;
                if let Some(mut sink) = guard.take() {
                    let _ = sink.close().await;
                }
            });
        }
    }
}
