//! Shared test infrastructure for sync-client integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use unison_protocol::{ClientRequest, ResponseData, TimeSyncReply};
use unison_sync_client::{Transport, TransportError};

/// Scripted transport: queued responses, recorded requests, controllable
/// connectivity and connect outcomes.
///
/// Time sync probes are answered automatically (with a configurable
/// server offset) so higher-level flows that trigger clock sync rounds
/// don't need ten scripted replies each.
pub struct MockTransport {
    responses: Mutex<VecDeque<Result<Option<ResponseData>, TransportError>>>,
    requests: Mutex<Vec<ClientRequest>>,
    connected: AtomicBool,
    connect_results: Mutex<VecDeque<Result<(), TransportError>>>,
    connect_attempts: AtomicU32,
    server_offset_ms: AtomicI64,
    request_delay: Mutex<Option<Duration>>,
}

impl MockTransport {
    pub fn connected() -> Self {
        Self::with_connectivity(true)
    }

    pub fn disconnected() -> Self {
        Self::with_connectivity(false)
    }

    fn with_connectivity(connected: bool) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            connected: AtomicBool::new(connected),
            connect_results: Mutex::new(VecDeque::new()),
            connect_attempts: AtomicU32::new(0),
            server_offset_ms: AtomicI64::new(0),
            request_delay: Mutex::new(None),
        }
    }

    pub fn push_response(&self, response: Result<Option<ResponseData>, TransportError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn push_connect_result(&self, result: Result<(), TransportError>) {
        self.connect_results.lock().unwrap().push_back(result);
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn set_server_offset_ms(&self, offset: i64) {
        self.server_offset_ms.store(offset, Ordering::SeqCst);
    }

    /// Delay every request by `delay` (for in-flight and timeout tests)
    pub fn set_request_delay(&self, delay: Duration) {
        *self.request_delay.lock().unwrap() = Some(delay);
    }

    pub fn requests(&self) -> Vec<ClientRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    /// How many non-time-sync requests were made
    pub fn non_probe_request_count(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| !matches!(r, ClientRequest::TimeSyncRequest { .. }))
            .count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(
        &self,
        request: ClientRequest,
    ) -> Result<Option<ResponseData>, TransportError> {
        let delay = *self.request_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.requests.lock().unwrap().push(request.clone());

        if let ClientRequest::TimeSyncRequest { client_send_ms } = request {
            let server_time = client_send_ms + self.server_offset_ms.load(Ordering::SeqCst);
            return Ok(Some(ResponseData::Time(TimeSyncReply {
                client_send_ms,
                server_receive_ms: server_time,
                server_send_ms: server_time,
            })));
        }

        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Failed("no scripted response".to_string())))
    }

    async fn connect(&self) -> Result<(), TransportError> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        let result = self
            .connect_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()));
        if result.is_ok() {
            self.connected.store(true, Ordering::SeqCst);
        }
        result
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
