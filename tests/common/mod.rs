//! Shared fixtures for integration tests: a recording mock HTTP server and
//! in-process fakes for adapters, wallets, card processors and stores.
#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use busan_donations::chain::{AdapterRegistry, ChainError, ChainResult, Network, NetworkAdapter, ObservedTransfer, PollStatus};
use busan_donations::currency::{Converter, Currency, PaymentValidator};
use busan_donations::payments::waiter::WaiterConfig;
use busan_donations::payments::{
    DonationService, LedgerEntry, LedgerFilter, LedgerStatus, LedgerStore, MemoryLedgerStore, NewLedgerRecord,
    RefundRequest, StoreError, StoreResult,
};
use busan_donations::processor::{
    CardConfirmation, CardConfirmer, CardProcessor, CardRefund, PaymentIntent, ProcessorError, ProcessorResult,
};
use busan_donations::wallet::{TransferRequest, WalletResult, WalletSigner};

pub const RECIPIENT: &str = "0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
pub const OTHER_RECIPIENT: &str = "0xBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB";
pub const PAYER: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

/// One request as seen by [`MockServer`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// Path including the query string.
    pub target: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

/// Programmable HTTP/1.1 server on an ephemeral port. Every request is
/// recorded; the handler picks `(status, body)`.
pub struct MockServer {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockServer {
    pub async fn start<F, Fut>(handler: F) -> Self
    where
        F: Fn(RecordedRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = (u16, String)> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler = Arc::new(handler);

        let recorded = requests.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let handler = handler.clone();
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    let _ = serve_connection(socket, handler, recorded).await;
                });
            }
        });

        Self { addr, requests }
    }

    /// Always answer with the same status and body.
    pub async fn fixed(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        Self::start(move |_| {
            let body = body.clone();
            async move { (status, body) }
        })
        .await
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn serve_connection<F, Fut>(
    mut socket: TcpStream,
    handler: Arc<F>,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
) -> std::io::Result<()>
where
    F: Fn(RecordedRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let target = request_line.next().unwrap_or_default().to_string();
    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let content_length: usize = headers.get("content-length").and_then(|v| v.parse().ok()).unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buf[header_end..]).to_string();

    let request = RecordedRequest { method, target, headers, body };
    recorded.lock().unwrap().push(request.clone());

    let (status, body) = handler(request).await;
    let status_text = match status {
        200 => "200 OK",
        201 => "201 Created",
        204 => "204 No Content",
        400 => "400 Bad Request",
        401 => "401 Unauthorized",
        402 => "402 Payment Required",
        404 => "404 Not Found",
        409 => "409 Conflict",
        429 => "429 Too Many Requests",
        500 => "500 Internal Server Error",
        503 => "503 Service Unavailable",
        _ => "200 OK",
    };
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_text,
        body.len(),
        body
    );
    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await
}

/// Adapter that replays scripted poll results, repeating the last one.
pub struct ScriptedAdapter {
    network: Network,
    required: u64,
    script: Mutex<VecDeque<ChainResult<PollStatus>>>,
    last: Mutex<Option<PollStatus>>,
    pub polls: AtomicU32,
}

impl ScriptedAdapter {
    pub fn new(network: Network, script: Vec<ChainResult<PollStatus>>) -> Arc<Self> {
        Arc::new(Self {
            network,
            required: 1,
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            polls: AtomicU32::new(0),
        })
    }

    pub fn polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NetworkAdapter for ScriptedAdapter {
    fn network(&self) -> Network {
        self.network
    }

    fn required_confirmations(&self) -> u64 {
        self.required
    }

    async fn poll(&self, _reference: &str) -> ChainResult<PollStatus> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(status)) => {
                *self.last.lock().unwrap() = Some(status.clone());
                Ok(status)
            }
            Some(Err(e)) => Err(e),
            None => Ok(self.last.lock().unwrap().clone().unwrap_or(PollStatus::NotFound)),
        }
    }
}

pub fn succeeded(amount: Decimal, currency: &str, recipient: &str) -> ChainResult<PollStatus> {
    Ok(PollStatus::Succeeded {
        confirmations: 1,
        transfer: ObservedTransfer {
            amount: Some(amount),
            currency: Some(Currency::from(currency)),
            recipient: Some(recipient.to_string()),
            block_or_slot: Some(19_000_000),
        },
    })
}

pub fn unavailable(network: Network) -> ChainResult<PollStatus> {
    Err(ChainError::Unavailable {
        network,
        operation: "get_receipt",
        reason: "connection refused".to_string(),
    })
}

/// EVM wallet that records transfers and returns a fixed hash.
#[derive(Default)]
pub struct FakeWallet {
    pub sent: Mutex<Vec<TransferRequest>>,
    pub reject: bool,
}

pub const TX_HASH: &str = "0x5c504ed432cb51138bcf09aa5e8a410dd4a1e204ef84bfed1be16dfba1b22060";

#[async_trait]
impl WalletSigner for FakeWallet {
    fn kind(&self) -> &str {
        "fake"
    }

    fn supports(&self, network: Network) -> bool {
        network.is_evm()
    }

    async fn request_accounts(&self) -> WalletResult<Vec<String>> {
        Ok(vec![PAYER.to_string()])
    }

    async fn sign_and_send(&self, request: &TransferRequest) -> WalletResult<String> {
        if self.reject {
            return Err(busan_donations::wallet::WalletError::UserRejected);
        }
        self.sent.lock().unwrap().push(request.clone());
        Ok(TX_HASH.to_string())
    }
}

/// Card processor and confirmer in one; records refunds.
#[derive(Default)]
pub struct FakeCard {
    pub refunds: Mutex<Vec<(String, Option<i64>)>>,
}

#[async_trait]
impl CardProcessor for FakeCard {
    async fn create_payment_intent(
        &self,
        amount_minor: i64,
        currency: &Currency,
        metadata: &HashMap<String, String>,
    ) -> ProcessorResult<PaymentIntent> {
        Ok(PaymentIntent {
            id: "pi_test_1".to_string(),
            client_secret: Some("pi_test_1_secret".to_string()),
            status: "requires_confirmation".to_string(),
            amount: amount_minor,
            amount_received: None,
            currency: currency.as_str().to_lowercase(),
            metadata: metadata.clone(),
        })
    }

    async fn retrieve_payment_intent(&self, id: &str) -> ProcessorResult<PaymentIntent> {
        Ok(PaymentIntent {
            id: id.to_string(),
            client_secret: None,
            status: "succeeded".to_string(),
            amount: 2500,
            amount_received: Some(2500),
            currency: "usd".to_string(),
            metadata: HashMap::new(),
        })
    }

    async fn refund(&self, payment_intent_id: &str, amount_minor: Option<i64>) -> ProcessorResult<CardRefund> {
        self.refunds.lock().unwrap().push((payment_intent_id.to_string(), amount_minor));
        Ok(CardRefund {
            id: "re_test_1".to_string(),
            status: "succeeded".to_string(),
            amount: amount_minor.unwrap_or(2500),
        })
    }
}

#[async_trait]
impl CardConfirmer for FakeCard {
    async fn confirm(&self, intent: &PaymentIntent) -> ProcessorResult<CardConfirmation> {
        Ok(CardConfirmation {
            status: "succeeded".to_string(),
            id: intent.id.clone(),
        })
    }
}

pub fn declined() -> ProcessorError {
    ProcessorError::Rejected {
        processor: "stripe",
        message: "Your card was declined.".to_string(),
    }
}

/// Store whose writes always fail; reads see nothing.
pub struct FailingStore;

#[async_trait]
impl LedgerStore for FailingStore {
    fn backend(&self) -> &'static str {
        "failing"
    }

    async fn upsert(&self, _record: NewLedgerRecord) -> StoreResult<LedgerEntry> {
        Err(StoreError::Unavailable("database is down".to_string()))
    }

    async fn get(&self, _reference: &str) -> StoreResult<Option<LedgerEntry>> {
        Ok(None)
    }

    async fn list(&self, _filter: &LedgerFilter) -> StoreResult<Vec<LedgerEntry>> {
        Ok(Vec::new())
    }

    async fn transition(
        &self,
        reference: &str,
        _from: LedgerStatus,
        _to: LedgerStatus,
    ) -> StoreResult<Option<LedgerEntry>> {
        Err(StoreError::NotFound(reference.to_string()))
    }

    async fn insert_refund_request(&self, _request: &RefundRequest) -> StoreResult<()> {
        Err(StoreError::Unavailable("database is down".to_string()))
    }

    async fn list_refund_requests(&self) -> StoreResult<Vec<RefundRequest>> {
        Ok(Vec::new())
    }
}

pub fn waiter_config(max_attempts: u32) -> WaiterConfig {
    WaiterConfig {
        poll_interval: std::time::Duration::from_secs(5),
        max_attempts,
        timeout: None,
    }
}

/// Service over one scripted adapter and the given store.
pub fn service_with(
    adapter: Arc<dyn NetworkAdapter>,
    store: Arc<dyn LedgerStore>,
    max_attempts: u32,
) -> DonationService {
    DonationService::new(
        Arc::new(PaymentValidator::default()),
        Arc::new(Converter::default()),
        AdapterRegistry::new().with(adapter),
        store,
        waiter_config(max_attempts),
        30,
    )
}

pub fn memory_store() -> Arc<MemoryLedgerStore> {
    Arc::new(MemoryLedgerStore::new(None))
}
