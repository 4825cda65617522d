//! Shared fakes for client integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream::StreamExt;
use rupt_client::{ApiRequest, ByteStream, StreamConnector, Transport};
use rupt_core::{
    config_error, network_error, ClientPlatform, Credentials, DeviceDetails, DeviceInfo,
    DeviceMetadataProvider, OsInfo, RuptResult, VendorSignal,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub fn credentials() -> Credentials {
    Credentials {
        client_id: "client-1".to_string(),
        secret: Some("secret-1".to_string()),
    }
}

/// A request as seen by the fake transport
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub credentials: Credentials,
    pub request: ApiRequest,
}

/// Transport that replays scripted bodies and records every request
#[derive(Default)]
pub struct FakeTransport {
    responses: Mutex<VecDeque<Option<Vec<u8>>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_json(&self, body: serde_json::Value) {
        self.push_raw(Some(serde_json::to_vec(&body).unwrap()));
    }

    pub fn push_raw(&self, body: Option<Vec<u8>>) {
        self.responses.lock().unwrap().push_back(body);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_body(&self) -> serde_json::Value {
        self.requests()
            .last()
            .and_then(|r| r.request.json_body())
            .expect("no request with a body was recorded")
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn request(
        &self,
        credentials: Option<&Credentials>,
        request: ApiRequest,
    ) -> RuptResult<Option<Vec<u8>>> {
        let Some(credentials) = credentials.filter(|c| !c.client_id.is_empty()) else {
            return Err(config_error!("clientID must not be nil", "fake_transport"));
        };
        self.requests.lock().unwrap().push(RecordedRequest {
            credentials: credentials.clone(),
            request,
        });
        Ok(self.responses.lock().unwrap().pop_front().flatten())
    }
}

/// Fixed device description
pub struct StaticMetadata;

impl DeviceMetadataProvider for StaticMetadata {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            os: Some(OsInfo {
                name: Some("iOS".to_string()),
                version: Some("16.1".to_string()),
            }),
            device: Some(DeviceDetails {
                vendor: Some("Apple".to_string()),
                device_type: Some("mobile".to_string()),
                model: Some("iPhone".to_string()),
            }),
        }
    }

    fn vendor_signal(&self) -> VendorSignal {
        VendorSignal::new("iosVendorIdentifier", "vendor-uuid")
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

/// Connector whose streams are fed by the test and counted while alive
#[derive(Default)]
pub struct FakeConnector {
    connects: AtomicUsize,
    failing: AtomicBool,
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

    /// Push a chunk into the most recently opened stream
    pub fn send(&self, chunk: &str) {
        let feeds = self.feeds.lock().unwrap();
        let feed = feeds.last().expect("no stream opened yet");
        let _ = feed.send(Ok(chunk.as_bytes().to_vec()));
    }

    /// End the most recently opened stream as if the server closed it
    pub fn end_stream(&self) {
        self.feeds.lock().unwrap().pop();
    }

    /// Interrupt the most recently opened stream with a transport error
    pub fn fail_stream(&self) {
        let feeds = self.feeds.lock().unwrap();
        let feed = feeds.last().expect("no stream opened yet");
        let _ = feed.send(Err(network_error!("connection reset", "fake_connector")));
    }

    /// Make every subsequent connect attempt fail until reset
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl StreamConnector for FakeConnector {
    async fn connect(&self, url: &str) -> RuptResult<ByteStream> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(network_error!("connection refused", "fake_connector"));
        }
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

/// Poll `condition` until it holds or two seconds pass
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
