//! Fakes for driving the pipeline and scheduler without a network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;

use super::pipeline::CheckPipeline;
use super::probes::{DomainExpiryProbe, HttpProbe, ProbeError, TlsExpiryProbe};
use super::transition::SUCCESS_STATUS;
use crate::db::store::memory::MemoryStore;
use crate::notifications::models::{NotificationTemplates, OutgoingMessage};
use crate::notifications::senders::{NotificationSender, SenderError};
use crate::notifications::NotificationService;

/// Returns queued statuses in order, then `SUCCESS_STATUS`.
#[derive(Default)]
pub struct ScriptedHttpProbe {
    script: Mutex<VecDeque<i32>>,
    calls: AtomicUsize,
}

impl ScriptedHttpProbe {
    pub fn new(statuses: &[i32]) -> Self {
        Self {
            script: Mutex::new(statuses.iter().copied().collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpProbe for ScriptedHttpProbe {
    async fn probe(&self, _url: &str) -> i32 {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(SUCCESS_STATUS)
    }
}

/// Blocks every probe until a permit is released.
pub struct GatedHttpProbe {
    gate: Semaphore,
    status: i32,
    started: AtomicUsize,
}

impl GatedHttpProbe {
    pub fn new(status: i32) -> Self {
        Self {
            gate: Semaphore::new(0),
            status,
            started: AtomicUsize::new(0),
        }
    }

    pub fn release(&self, count: usize) {
        self.gate.add_permits(count);
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpProbe for GatedHttpProbe {
    async fn probe(&self, _url: &str) -> i32 {
        self.started.fetch_add(1, Ordering::SeqCst);
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
        self.status
    }
}

#[derive(Default)]
pub struct FakeTlsProbe {
    expiry: Mutex<Option<DateTime<Utc>>>,
    failing: AtomicBool,
}

impl FakeTlsProbe {
    pub fn set_expiry(&self, expiry: Option<DateTime<Utc>>) {
        *self.expiry.lock().unwrap() = expiry;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl TlsExpiryProbe for FakeTlsProbe {
    async fn probe(&self, _url: &str) -> Result<Option<DateTime<Utc>>, ProbeError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProbeError::Tls("handshake failed".to_string()));
        }
        Ok(*self.expiry.lock().unwrap())
    }
}

/// `None` makes the probe fail.
#[derive(Default)]
pub struct FakeDomainProbe {
    expiry: Mutex<Option<DateTime<Utc>>>,
}

impl FakeDomainProbe {
    pub fn set_expiry(&self, expiry: Option<DateTime<Utc>>) {
        *self.expiry.lock().unwrap() = expiry;
    }
}

#[async_trait]
impl DomainExpiryProbe for FakeDomainProbe {
    async fn probe(&self, _url: &str) -> Result<DateTime<Utc>, ProbeError> {
        let expiry = *self.expiry.lock().unwrap();
        expiry.ok_or_else(|| ProbeError::Whois("no expiry date".to_string()))
    }
}

#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<OutgoingMessage>>,
    failing: AtomicBool,
}

impl RecordingSender {
    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), SenderError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SenderError::SendFailed("relay unavailable".to_string()));
        }
        self.sent.lock().unwrap().push(OutgoingMessage {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "recording"
    }
}

/// A pipeline wired to an in-memory store and fakes.
pub struct Harness<H> {
    pub store: Arc<MemoryStore>,
    pub http: Arc<H>,
    pub tls: Arc<FakeTlsProbe>,
    pub domain: Arc<FakeDomainProbe>,
    pub sender: Arc<RecordingSender>,
    pub pipeline: Arc<CheckPipeline>,
}

impl<H: HttpProbe + 'static> Harness<H> {
    pub fn new(http: H) -> Self {
        let store = Arc::new(MemoryStore::new());
        let http = Arc::new(http);
        let tls = Arc::new(FakeTlsProbe::default());
        let domain = Arc::new(FakeDomainProbe::default());
        let sender = Arc::new(RecordingSender::default());
        let notifications =
            NotificationService::new(sender.clone(), NotificationTemplates::default());
        let pipeline = Arc::new(CheckPipeline::new(
            store.clone(),
            http.clone(),
            tls.clone(),
            domain.clone(),
            notifications,
        ));

        Self {
            store,
            http,
            tls,
            domain,
            sender,
            pipeline,
        }
    }
}
