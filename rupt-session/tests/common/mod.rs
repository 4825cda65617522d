//! Recording collaborators for controller tests

#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream::StreamExt;
use rupt_client::{ApiRequest, ByteStream, StreamConnector, Transport};
use rupt_core::{
    config_error, ClientPlatform, Credentials, DeviceDetails, DeviceInfo, DeviceMetadataProvider,
    DeviceRecord, KeyValueStore, MemoryStore, OsInfo, Presenter, RealtimeConfig, RuptResult,
    SessionConfig, VendorSignal,
};
use rupt_session::{EventKind, SessionController, SessionDeps, SessionEvent, SessionOptions};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Everything observable from outside the controller, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Show,
    Hide,
    Render {
        devices: Vec<String>,
        current: Option<String>,
    },
    Event(SessionEvent),
}

pub type Journal = Arc<Mutex<Vec<Entry>>>;

pub struct RecordingPresenter {
    journal: Journal,
}

impl Presenter for RecordingPresenter {
    fn show_blocking_surface(&self) {
        self.journal.lock().unwrap().push(Entry::Show);
    }

    fn hide_blocking_surface(&self) {
        self.journal.lock().unwrap().push(Entry::Hide);
    }

    fn render_attached_devices(&self, devices: &[DeviceRecord], current_device_id: Option<&str>) {
        self.journal.lock().unwrap().push(Entry::Render {
            devices: devices.iter().map(|d| d.id.clone()).collect(),
            current: current_device_id.map(str::to_string),
        });
    }
}

#[derive(Default)]
pub struct FakeTransport {
    responses: Mutex<VecDeque<Option<Vec<u8>>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl FakeTransport {
    pub fn push_json(&self, body: serde_json::Value) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Some(serde_json::to_vec(&body).unwrap()));
    }

    pub fn push_raw(&self, body: Option<&[u8]>) {
        self.responses
            .lock()
            .unwrap()
            .push_back(body.map(|b| b.to_vec()));
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.path).collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn request(
        &self,
        credentials: Option<&Credentials>,
        request: ApiRequest,
    ) -> RuptResult<Option<Vec<u8>>> {
        if credentials.map_or(true, |c| c.client_id.is_empty()) {
            return Err(config_error!("clientID must not be nil", "fake_transport"));
        }
        self.requests.lock().unwrap().push(request);
        Ok(self.responses.lock().unwrap().pop_front().flatten())
    }
}

pub struct StaticMetadata;

impl DeviceMetadataProvider for StaticMetadata {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            os: Some(OsInfo {
                name: Some("iOS".to_string()),
                version: Some("17.0".to_string()),
            }),
            device: Some(DeviceDetails {
                vendor: Some("Apple".to_string()),
                device_type: Some("mobile".to_string()),
                model: Some("iPhone".to_string()),
            }),
        }
    }

    fn vendor_signal(&self) -> VendorSignal {
        VendorSignal::new("iosVendorIdentifier", "vendor-1")
    }

    fn client_platform(&self) -> ClientPlatform {
        ClientPlatform::Ios
    }
}

struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeConnector {
    connects: AtomicUsize,
    live: Arc<AtomicUsize>,
    urls: Mutex<Vec<String>>,
    feeds: Mutex<Vec<mpsc::UnboundedSender<RuptResult<Vec<u8>>>>>,
}

impl FakeConnector {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }

    pub fn send(&self, chunk: &str) {
        let feeds = self.feeds.lock().unwrap();
        let _ = feeds
            .last()
            .expect("no stream opened yet")
            .send(Ok(chunk.as_bytes().to_vec()));
    }
}

#[async_trait]
impl StreamConnector for FakeConnector {
    async fn connect(&self, url: &str) -> RuptResult<ByteStream> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());

        let (tx, rx) = mpsc::unbounded_channel();
        self.feeds.lock().unwrap().push(tx);
        let guard = LiveGuard(self.live.clone());

        Ok(futures::stream::unfold((rx, guard), |(mut rx, guard)| async move {
            rx.recv().await.map(|item| (item, (rx, guard)))
        })
        .boxed())
    }
}

pub struct Harness {
    pub controller: SessionController,
    pub transport: Arc<FakeTransport>,
    pub connector: Arc<FakeConnector>,
    pub store: Arc<MemoryStore>,
    pub journal: Journal,
}

impl Harness {
    pub async fn new(config: SessionConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new())).await
    }

    pub async fn with_store(config: SessionConfig, store: Arc<MemoryStore>) -> Self {
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let transport = Arc::new(FakeTransport::default());
        let connector = Arc::new(FakeConnector::default());
        let deps = SessionDeps {
            transport: transport.clone(),
            store: store.clone() as Arc<dyn KeyValueStore>,
            device_metadata: Arc::new(StaticMetadata),
            presenter: Arc::new(RecordingPresenter {
                journal: journal.clone(),
            }),
            connector: connector.clone(),
        };
        let options = SessionOptions {
            base_url: "http://rupt.test".to_string(),
            realtime: RealtimeConfig {
                reconnect_initial_delay_ms: 10,
                reconnect_max_delay_ms: 40,
            },
            ..Default::default()
        };

        let controller = SessionController::new(deps, options);
        controller.configure(config).await;
        controller.set_account_id(Some("user-1".to_string())).await;

        let sink = journal.clone();
        controller.subscribe(&EventKind::ALL, move |event| {
            sink.lock().unwrap().push(Entry::Event(event.clone()));
        });

        Self {
            controller,
            transport,
            connector,
            store,
            journal,
        }
    }

    pub fn journal(&self) -> Vec<Entry> {
        self.journal.lock().unwrap().clone()
    }

    pub fn clear_journal(&self) {
        self.journal.lock().unwrap().clear();
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.journal()
            .into_iter()
            .filter_map(|entry| match entry {
                Entry::Event(event) => Some(event),
                _ => None,
            })
            .collect()
    }
}

pub fn config() -> SessionConfig {
    SessionConfig::new("client-1").with_secret("secret-1")
}

pub fn attach_response(device_id: &str, attached: u32) -> serde_json::Value {
    json!({"device_id": device_id, "attached_devices": attached, "success": true})
}

pub fn record_json(id: &str) -> serde_json::Value {
    json!({
        "_id": id,
        "info": {"os": {"name": "iOS"}},
        "user": "user-1",
        "createdAt": "2022-07-11T09:30:00.000Z",
        "updatedAt": "2022-07-11T09:30:00.000Z"
    })
}

pub fn record(id: &str) -> DeviceRecord {
    serde_json::from_value(record_json(id)).unwrap()
}

pub fn device_list(ids: &[&str]) -> serde_json::Value {
    serde_json::Value::Array(ids.iter().map(|id| record_json(id)).collect())
}

pub async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
