//! HTTP polling transport.
//!
//! Two independent long-poll-style channels, read and write, each limited
//! to one in-flight request. The read channel repeatedly issues
//! `GET /read?sid=..&rcnt=..`; the write channel drains the outbound
//! buffer in chunks of up to 1024 bytes, URL-safe base64 encoded, via
//! `GET /write?sid=..&wcnt=..&data=..`. A 410 from either channel means
//! the relay evicted the session.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use reqwest::{StatusCode, Url};
use tracing::{debug, warn};

use crate::core::constants::MAX_POLL_PAYLOAD;
use crate::core::{CloseReason, TransportError};
use crate::session::{Phase, RelayTransport, SessionCore, SessionOps};
use crate::stream::StreamEvent;

/// Outcome of a single poll request.
enum PollStatus {
    /// 200 with a (possibly empty) decoded body.
    Ok(Vec<u8>),
    /// 410: the relay evicted the session.
    Gone,
}

/// HTTP polling transport over a relay session.
pub(crate) struct PollingTransport {
    session: SessionCore,
}

impl PollingTransport {
    pub(crate) fn new(session: SessionCore) -> Self {
        Self { session }
    }

    fn read_url(&self, sid: &str, rcnt: u64) -> Result<Url, TransportError> {
        let mut url = self
            .session
            .endpoint("read")
            .map_err(|e| TransportError::Endpoint(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("sid", sid)
            .append_pair("rcnt", &rcnt.to_string());
        Ok(url)
    }

    fn write_url(&self, sid: &str, wcnt: u64, chunk: &[u8]) -> Result<Url, TransportError> {
        let mut url = self
            .session
            .endpoint("write")
            .map_err(|e| TransportError::Endpoint(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("sid", sid)
            .append_pair("wcnt", &wcnt.to_string())
            .append_pair("data", &URL_SAFE.encode(chunk));
        Ok(url)
    }

    /// Issue one poll request and classify the response.
    async fn poll(&self, url: Url) -> Result<PollStatus, TransportError> {
        let response = self.session.http.get(url).send().await?;
        match response.status() {
            StatusCode::GONE => Ok(PollStatus::Gone),
            StatusCode::OK => {
                let body = response.text().await?;
                let trimmed = body.trim().trim_end_matches('=');
                let decoded = URL_SAFE_NO_PAD
                    .decode(trimmed)
                    .map_err(|e| TransportError::Encoding(e.to_string()))?;
                Ok(PollStatus::Ok(decoded))
            }
            status => Err(TransportError::Status(status.as_u16())),
        }
    }

    async fn read_cycle(self: Arc<Self>, sid: String, rcnt: u64) {
        let result = match self.read_url(&sid, rcnt) {
            Ok(url) => self.poll(url).await,
            Err(err) => Err(err),
        };
        self.session.state.lock().read_busy = false;

        match result {
            Ok(PollStatus::Gone) => {
                warn!("relay reports session gone on read channel");
                self.close_with(CloseReason::Gone);
            }
            Ok(PollStatus::Ok(bytes)) => {
                {
                    let mut st = self.session.state.lock();
                    if st.phase != Phase::Open {
                        return;
                    }
                    st.read_count += bytes.len() as u64;
                }
                if !bytes.is_empty() {
                    debug!(bytes = bytes.len(), "read poll delivered payload");
                    let _ = self.session.events.send(StreamEvent::Data(bytes));
                }
                self.on_request_success(true);
            }
            Err(err) => {
                debug!(error = %err, "read poll failed");
                self.on_request_error(true);
            }
        }
    }

    async fn write_cycle(self: Arc<Self>, sid: String, wcnt: u64, chunk: Vec<u8>) {
        let result = match self.write_url(&sid, wcnt, &chunk) {
            Ok(url) => self.poll(url).await,
            Err(err) => Err(err),
        };
        self.session.state.lock().write_busy = false;

        match result {
            Ok(PollStatus::Gone) => {
                warn!("relay reports session gone on write channel");
                self.close_with(CloseReason::Gone);
            }
            Ok(PollStatus::Ok(_)) => {
                let total = {
                    let mut st = self.session.state.lock();
                    if st.phase != Phase::Open {
                        return;
                    }
                    st.outbound.ack(chunk.len());
                    st.write_count += chunk.len() as u64;
                    st.write_count
                };
                debug!(bytes = chunk.len(), total, "write chunk acknowledged");
                let _ = self.session.events.send(StreamEvent::WriteAcked { total });
                self.on_request_success(false);
            }
            Err(err) => {
                debug!(error = %err, "write poll failed");
                self.on_request_error(false);
            }
        }
    }
}

impl RelayTransport for PollingTransport {
    fn session(&self) -> &SessionCore {
        &self.session
    }

    fn resume_read(self: Arc<Self>) {
        let (sid, rcnt) = {
            let mut st = self.session.state.lock();
            if st.read_busy || st.backoff.is_scheduled() || st.phase != Phase::Open {
                return;
            }
            let Some(sid) = st.session_id.clone() else {
                return;
            };
            st.read_busy = true;
            (sid, st.read_count)
        };

        tokio::spawn(async move {
            self.read_cycle(sid, rcnt).await;
        });
    }

    fn send_write(self: Arc<Self>) {
        let (sid, wcnt, chunk) = {
            let mut st = self.session.state.lock();
            if st.write_busy || st.backoff.is_scheduled() || st.phase != Phase::Open {
                return;
            }
            if st.outbound.unread_len() == 0 {
                return;
            }
            let Some(sid) = st.session_id.clone() else {
                return;
            };
            let chunk = st.outbound.read(MAX_POLL_PAYLOAD);
            st.write_busy = true;
            (sid, st.write_count, chunk)
        };

        tokio::spawn(async move {
            self.write_cycle(sid, wcnt, chunk).await;
        });
    }

    fn halt(&self) {
        // In-flight poll requests complete on their own and observe the
        // closed phase when they land.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::{HashMap, VecDeque};
    use std::future::IntoFuture;
    use std::time::Duration;

    use axum::Router;
    use axum::extract::{Query, State};
    use axum::http::StatusCode as HttpStatus;
    use axum::routing::get;
    use parking_lot::Mutex;
    use tokio::time::{sleep, timeout};

    use crate::stream::{RelayOptions, RelayStream, StreamEvents, TransportMode};

    const SESSION_ID: &str = "poll-test-session";

    #[derive(Default)]
    struct RelayStub {
        /// Decoded payloads of successful write requests, in arrival order.
        writes: Mutex<Vec<Vec<u8>>>,
        /// Base64url bodies served to read polls, then empty responses.
        reads: Mutex<VecDeque<String>>,
        /// Number of write requests to fail with a 500 before succeeding.
        fail_writes: Mutex<u32>,
        /// When set, every poll answers 410.
        gone: Mutex<bool>,
    }

    async fn proxy_handler() -> &'static str {
        SESSION_ID
    }

    async fn read_handler(
        State(stub): State<Arc<RelayStub>>,
        Query(params): Query<HashMap<String, String>>,
    ) -> (HttpStatus, String) {
        if *stub.gone.lock() || params.get("sid").map(String::as_str) != Some(SESSION_ID) {
            return (HttpStatus::GONE, String::new());
        }
        if let Some(body) = stub.reads.lock().pop_front() {
            return (HttpStatus::OK, body);
        }
        // Hold the poll briefly, like a long-poll relay with no data.
        sleep(Duration::from_millis(50)).await;
        (HttpStatus::OK, String::new())
    }

    async fn write_handler(
        State(stub): State<Arc<RelayStub>>,
        Query(params): Query<HashMap<String, String>>,
    ) -> (HttpStatus, String) {
        if *stub.gone.lock() || params.get("sid").map(String::as_str) != Some(SESSION_ID) {
            return (HttpStatus::GONE, String::new());
        }
        {
            let mut fails = stub.fail_writes.lock();
            if *fails > 0 {
                *fails -= 1;
                return (HttpStatus::INTERNAL_SERVER_ERROR, String::new());
            }
        }
        let data = params.get("data").cloned().unwrap_or_default();
        let decoded = URL_SAFE_NO_PAD
            .decode(data.trim_end_matches('='))
            .expect("stub received invalid base64url payload");
        stub.writes.lock().push(decoded);
        (HttpStatus::OK, String::new())
    }

    async fn start_stub(stub: Arc<RelayStub>) -> Url {
        let app = Router::new()
            .route("/proxy", get(proxy_handler))
            .route("/read", get(read_handler))
            .route("/write", get(write_handler))
            .with_state(stub);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(axum::serve(listener, app).into_future());
        Url::parse(&format!("http://{addr}/")).unwrap()
    }

    async fn open_stream(stub: &Arc<RelayStub>) -> (RelayStream, StreamEvents) {
        let base = start_stub(Arc::clone(stub)).await;
        let options = RelayOptions::builder(base, "localhost", 22)
            .mode(TransportMode::Polling)
            .build();
        RelayStream::open(options).await.unwrap()
    }

    async fn next_write_ack(events: &mut StreamEvents) -> u64 {
        loop {
            let event = timeout(Duration::from_secs(5), events.recv())
                .await
                .expect("timed out waiting for write ack")
                .expect("event channel closed");
            if let StreamEvent::WriteAcked { total } = event {
                return total;
            }
        }
    }

    #[tokio::test]
    async fn test_write_chunks_at_payload_limit() {
        let stub = Arc::new(RelayStub::default());
        let (stream, mut events) = open_stream(&stub).await;

        stream.write(&[7u8; 2000]);

        // 2000 bytes leave as a 1024-byte chunk, then the 976 remainder.
        assert_eq!(next_write_ack(&mut events).await, 1024);
        assert_eq!(next_write_ack(&mut events).await, 2000);

        let writes = stub.writes.lock();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].len(), 1024);
        assert_eq!(writes[1].len(), 976);
        assert!(writes.iter().flatten().all(|&b| b == 7));
    }

    #[tokio::test]
    async fn test_read_polls_deliver_in_order() {
        let stub = Arc::new(RelayStub::default());
        stub.reads.lock().push_back(URL_SAFE.encode(b"hello "));
        stub.reads.lock().push_back(URL_SAFE.encode(b"relay"));
        let (_stream, mut events) = open_stream(&stub).await;

        let mut received = Vec::new();
        while received.len() < 11 {
            let event = timeout(Duration::from_secs(5), events.recv())
                .await
                .expect("timed out waiting for data")
                .expect("event channel closed");
            if let StreamEvent::Data(bytes) = event {
                received.extend_from_slice(&bytes);
            }
        }
        assert_eq!(received, b"hello relay");
    }

    #[tokio::test]
    async fn test_gone_closes_stream() {
        let stub = Arc::new(RelayStub::default());
        let (_stream, mut events) = open_stream(&stub).await;
        *stub.gone.lock() = true;

        loop {
            let event = timeout(Duration::from_secs(5), events.recv())
                .await
                .expect("timed out waiting for close")
                .expect("event channel closed");
            if let StreamEvent::Closed { reason } = event {
                assert_eq!(reason, CloseReason::Gone);
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_failed_write_is_retransmitted() {
        let stub = Arc::new(RelayStub::default());
        *stub.fail_writes.lock() = 1;
        let (stream, mut events) = open_stream(&stub).await;

        stream.write(&[3u8; 500]);

        // The first attempt fails, backoff fires, and the same chunk is
        // re-read from the buffer and resent.
        assert_eq!(next_write_ack(&mut events).await, 500);

        let writes = stub.writes.lock();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0], vec![3u8; 500]);
    }
}
