//! Session orchestration
//!
//! `SessionController` composes the device operations, the limit policy and
//! the realtime channel behind the public contract, and owns the UI-facing
//! state. Methods take `&self`; state locks are never held across a network
//! call, so overlapping calls are allowed and the last response wins.

use crate::events::{EventBus, EventKind, ListenerId, SessionEvent};
use crate::limit::{LimitInputs, LimitPolicy};
use crate::state::DeviceListState;
use rupt_client::{
    AttachContext, ChannelState, DeviceSession, HttpStreamConnector, HttpTransport,
    RealtimeChannel, RealtimeSignal, StreamConnector, Transport,
};
use rupt_core::{
    log_operation_error, log_operation_start, log_operation_success, AttachOutcome,
    CallbackFlags, ClientSettings, Credentials, DeviceIdentity, DeviceMetadataProvider,
    DeviceRecord, IdentityStore, KeyValueStore, Metadata, Outcome, Presenter, RealtimeConfig,
    RuptResult, SessionConfig, DEFAULT_BASE_URL,
};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Collaborators supplied by the host application
#[derive(Clone)]
pub struct SessionDeps {
    pub transport: Arc<dyn Transport>,
    pub store: Arc<dyn KeyValueStore>,
    pub device_metadata: Arc<dyn DeviceMetadataProvider>,
    pub presenter: Arc<dyn Presenter>,
    pub connector: Arc<dyn StreamConnector>,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Service root, used to build the realtime subscription URL
    pub base_url: String,
    pub realtime: RealtimeConfig,
    /// Advertised on every attach
    pub callbacks: CallbackFlags,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            realtime: RealtimeConfig::default(),
            callbacks: CallbackFlags::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct AccountContext {
    account_id: Option<String>,
    email: Option<String>,
    phone: Option<String>,
}

struct Inner {
    session: DeviceSession,
    presenter: Arc<dyn Presenter>,
    connector: Arc<dyn StreamConnector>,
    options: SessionOptions,
    config: RwLock<Option<SessionConfig>>,
    account: RwLock<AccountContext>,
    state: RwLock<DeviceListState>,
    events: EventBus,
    /// Present only while realtime logout is enabled
    realtime: Mutex<Option<Arc<RealtimeChannel>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Explicitly constructed session, owned by the host's composition root
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    pub fn new(deps: SessionDeps, options: SessionOptions) -> Self {
        Self::build(deps, options, None)
    }

    /// HTTP-backed controller, configured from a settings file
    pub fn from_settings(
        settings: &ClientSettings,
        store: Arc<dyn KeyValueStore>,
        device_metadata: Arc<dyn DeviceMetadataProvider>,
        presenter: Arc<dyn Presenter>,
    ) -> RuptResult<Self> {
        settings.validate()?;

        let transport = HttpTransport::new(&settings.base_url, settings.request_timeout_seconds)?;
        let deps = SessionDeps {
            transport: Arc::new(transport),
            store,
            device_metadata,
            presenter,
            connector: Arc::new(HttpStreamConnector::new()?),
        };
        let options = SessionOptions {
            base_url: settings.base_url.clone(),
            realtime: settings.realtime,
            callbacks: settings.callbacks,
        };

        Ok(Self::build(deps, options, Some(settings.session_config())))
    }

    fn build(deps: SessionDeps, options: SessionOptions, config: Option<SessionConfig>) -> Self {
        let identity = IdentityStore::new(deps.store);
        let session = DeviceSession::new(deps.transport, identity, deps.device_metadata);
        let state = DeviceListState {
            current_device_id: session.device_id(),
            limit_config: config.as_ref().and_then(|c| c.limit),
            ..Default::default()
        };

        Self {
            inner: Arc::new(Inner {
                session,
                presenter: deps.presenter,
                connector: deps.connector,
                options,
                config: RwLock::new(config),
                account: RwLock::new(AccountContext::default()),
                state: RwLock::new(state),
                events: EventBus::new(),
                realtime: Mutex::new(None),
            }),
        }
    }

    /// Merge `config` into the current configuration.
    ///
    /// An empty client id or a missing secret keeps the previous value;
    /// appearance and limit overrides replace the previous ones only when set.
    pub async fn configure(&self, config: SessionConfig) {
        let mut current = self.inner.config.write().await;
        let merged = match current.take() {
            Some(previous) => SessionConfig {
                client_id: if config.client_id.is_empty() {
                    previous.client_id
                } else {
                    config.client_id
                },
                secret: config.secret.or(previous.secret),
                appearance: config.appearance.or(previous.appearance),
                limit: config.limit.or(previous.limit),
            },
            None => config,
        };

        debug!(
            client_id = %merged.client_id,
            has_secret = merged.secret.is_some(),
            "Session configured"
        );
        self.inner.state.write().await.limit_config = merged.limit;
        *current = Some(merged);
    }

    /// `None` clears the account, e.g. on logout
    pub async fn set_account_id(&self, account_id: Option<String>) {
        self.inner.account.write().await.account_id = account_id;
    }

    pub async fn set_email(&self, email: Option<String>) {
        self.inner.account.write().await.email = email;
    }

    pub async fn set_phone(&self, phone: Option<String>) {
        self.inner.account.write().await.phone = phone;
    }

    pub async fn account_id(&self) -> Option<String> {
        self.inner.account.read().await.account_id.clone()
    }

    /// Persisted server-assigned device id
    pub fn device_id(&self) -> Option<String> {
        self.inner.session.device_id()
    }

    /// Persisted identity fingerprint
    pub fn identity(&self) -> Option<String> {
        self.inner.session.device_identity()
    }

    pub async fn config(&self) -> Option<SessionConfig> {
        self.inner.config.read().await.clone()
    }

    pub async fn state(&self) -> DeviceListState {
        self.inner.state.read().await.clone()
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn subscribe<F>(&self, kinds: &[EventKind], listener: F) -> ListenerId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(kinds, listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    async fn credentials(&self) -> Option<Credentials> {
        self.inner
            .config
            .read()
            .await
            .as_ref()
            .map(SessionConfig::credentials)
    }

    /// Attach this device to the current account and act on the limit decision.
    ///
    /// When the limit is exceeded and blocking applies, the blocking surface
    /// is opened before the limit-exceeded event fires, then the attached
    /// list is fetched to populate it.
    pub async fn attach(&self, metadata: Option<Metadata>) -> Outcome<AttachOutcome> {
        log_operation_start!("attach");

        let config = self.inner.config.read().await.clone();
        let credentials = config.as_ref().map(SessionConfig::credentials);
        let context = {
            let account = self.inner.account.read().await;
            AttachContext {
                account_id: account.account_id.clone(),
                email: account.email.clone(),
                phone: account.phone.clone(),
                metadata,
                callbacks: self.inner.options.callbacks,
            }
        };

        let outcome = self.inner.session.attach(credentials.as_ref(), context).await;
        let Some(response) = outcome.as_applied().cloned() else {
            return outcome;
        };

        let decision = LimitPolicy::evaluate(&LimitInputs {
            attached_count: response.attached_device_count,
            configured_overall_limit: config
                .as_ref()
                .and_then(|c| c.limit)
                .map(|l| l.overall_limit),
            server_default_limit: response.default_device_limit,
            server_block_flag: response.block_over_usage,
            appearance_block_flag: config
                .as_ref()
                .and_then(|c| c.appearance)
                .map(|a| a.show_blocking_dialog),
        });

        {
            let mut state = self.inner.state.write().await;
            state.current_device_id = Some(response.device_id.clone());
            if decision.effective_limit.is_some() {
                state.default_device_limit = decision.effective_limit;
            }
        }

        self.refresh_realtime(credentials.as_ref(), &response.device_id);

        let limit_exceeded = SessionEvent::LimitExceeded {
            attached_count: response.attached_device_count,
        };
        if decision.should_block {
            self.open_blocking_surface().await;
            self.inner.events.emit(limit_exceeded);
            if let Outcome::Skipped(reason) = self.get_user_attached_devices().await {
                log_operation_error!(
                    "attach",
                    reason.message(),
                    step = "list_attached_devices"
                );
            }
            self.inner.state.write().await.detach_loading = false;
        } else if decision.exceeded {
            self.inner.events.emit(limit_exceeded);
        }

        log_operation_success!(
            "attach",
            device_id = %response.device_id,
            attached = response.attached_device_count,
            limit = ?decision.effective_limit,
            exceeded = decision.exceeded,
            blocking = decision.should_block
        );
        outcome
    }

    pub async fn identify(&self, metadata: Option<Metadata>) -> RuptResult<DeviceIdentity> {
        let credentials = self.credentials().await;
        self.inner.session.identify(credentials.as_ref(), metadata).await
    }

    /// Refresh the attached list. `loading_devices` is set for the duration.
    ///
    /// A failed fetch leaves the cached list unchanged.
    pub async fn get_user_attached_devices(&self) -> Outcome<Vec<DeviceRecord>> {
        let credentials = self.credentials().await;
        let account_id = self.account_id().await;

        self.inner.state.write().await.loading_devices = true;
        let outcome = self
            .inner
            .session
            .list_attached(credentials.as_ref(), account_id.as_deref())
            .await;

        let current_device_id = {
            let mut state = self.inner.state.write().await;
            state.loading_devices = false;
            if let Outcome::Applied(devices) = &outcome {
                state.attached_devices = devices.clone();
            }
            state.current_device_id.clone()
        };

        if let Outcome::Applied(devices) = &outcome {
            self.inner
                .presenter
                .render_attached_devices(devices, current_device_id.as_deref());
        }
        outcome
    }

    /// Detach by id without touching the local state
    pub async fn detach_device_id(&self, device_id: &str) -> Outcome<AttachOutcome> {
        let credentials = self.credentials().await;
        let account_id = self.account_id().await;
        self.inner
            .session
            .detach(credentials.as_ref(), account_id.as_deref(), device_id)
            .await
    }

    /// Detach `record` and reconcile the local state.
    ///
    /// Only a response with `success` mutates anything: the record leaves the
    /// attached set, the cached default limit is refreshed, other devices get
    /// a logout-other-device event, and the blocking surface closes once the
    /// remaining count is within the limit.
    pub async fn detach(&self, record: &DeviceRecord) -> Outcome<AttachOutcome> {
        let outcome = self.detach_device_id(&record.id).await;
        let Some(response) = outcome.as_applied().cloned() else {
            return outcome;
        };
        if !response.success {
            warn!(device_id = %record.id, "Detach was not accepted, local state unchanged");
            return outcome;
        }

        let configured_limit = self
            .inner
            .config
            .read()
            .await
            .as_ref()
            .and_then(|c| c.limit)
            .map(|l| l.overall_limit);

        let (is_current, limit) = {
            let mut state = self.inner.state.write().await;
            state.remove_device(&record.id);
            if response.default_device_limit.is_some() {
                state.default_device_limit = response.default_device_limit;
            }
            (
                state.is_current_device(&record.id),
                LimitPolicy::effective_limit(configured_limit, state.default_device_limit),
            )
        };

        info!(
            device_id = %record.id,
            current = is_current,
            remaining = response.attached_device_count,
            "Device detached"
        );

        if !is_current {
            self.inner.events.emit(SessionEvent::LogoutOtherDevice {
                device: record.clone(),
            });
        }

        if limit.is_some() && LimitPolicy::within_limit(response.attached_device_count, limit) {
            self.close_blocking_surface().await;
        }
        outcome
    }

    /// Detach each record in order, as the blocking surface's confirm action does
    pub async fn detach_many(&self, records: &[DeviceRecord]) -> Vec<Outcome<AttachOutcome>> {
        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            outcomes.push(self.detach(record).await);
        }
        outcomes
    }

    async fn open_blocking_surface(&self) {
        {
            let mut state = self.inner.state.write().await;
            state.detach_loading = true;
            state.blocking_visible = true;
        }
        self.inner.presenter.show_blocking_surface();
    }

    async fn close_blocking_surface(&self) {
        {
            let mut state = self.inner.state.write().await;
            state.blocking_visible = false;
            state.detach_loading = false;
        }
        self.inner.presenter.hide_blocking_surface();
    }

    /// Open the realtime logout channel for the current device.
    ///
    /// The channel lives as long as the returned handle. Enabling again
    /// supersedes the previous channel.
    pub async fn enable_realtime_logout(&self) -> RealtimeLogout {
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        let channel = Arc::new(RealtimeChannel::new(
            self.inner.options.base_url.clone(),
            self.inner.connector.clone(),
            self.inner.options.realtime,
            signals_tx,
        ));

        let previous = lock(&self.inner.realtime).replace(channel.clone());
        if let Some(previous) = previous {
            previous.stop();
        }

        let credentials = self.credentials().await;
        let device_id = self.device_id();
        if !channel.start(credentials.as_ref(), device_id.as_deref()) {
            debug!("Realtime logout enabled, waiting for a device id");
        }

        let dispatcher = tokio::spawn(dispatch_signals(Arc::downgrade(&self.inner), signals_rx));
        RealtimeLogout {
            channel,
            dispatcher,
            controller: Arc::downgrade(&self.inner),
        }
    }

    /// Point an enabled channel at `device_id` unless it already listens there
    fn refresh_realtime(&self, credentials: Option<&Credentials>, device_id: &str) {
        let channel = lock(&self.inner.realtime).clone();
        let Some(channel) = channel else {
            return;
        };
        let listening = channel.active_device_id();
        if channel.state() == ChannelState::Closed || listening.as_deref() != Some(device_id) {
            channel.start(credentials, Some(device_id));
        }
    }

    async fn handle_realtime_signal(&self, signal: RealtimeSignal) {
        match signal {
            RealtimeSignal::Logout { device_id } => {
                let device = {
                    let state = self.inner.state.read().await;
                    state
                        .current_device()
                        .or_else(|| state.find_device(&device_id))
                        .cloned()
                };
                info!(
                    device_id = %device_id,
                    cached = device.is_some(),
                    "Current device logged out remotely"
                );
                self.inner
                    .events
                    .emit(SessionEvent::LogoutCurrentDevice { device });
                self.close_blocking_surface().await;
            }
        }
    }
}

/// Applies realtime signals. The single mutation context for push events.
async fn dispatch_signals(
    controller: Weak<Inner>,
    mut signals: mpsc::UnboundedReceiver<RealtimeSignal>,
) {
    while let Some(signal) = signals.recv().await {
        let Some(inner) = controller.upgrade() else {
            break;
        };
        SessionController { inner }.handle_realtime_signal(signal).await;
    }
    debug!("Realtime dispatcher finished");
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("session", &self.inner.session)
            .field("options", &self.inner.options)
            .field("realtime_enabled", &lock(&self.inner.realtime).is_some())
            .finish_non_exhaustive()
    }
}

/// Live realtime logout subscription. Dropping it closes the channel.
pub struct RealtimeLogout {
    channel: Arc<RealtimeChannel>,
    dispatcher: JoinHandle<()>,
    controller: Weak<Inner>,
}

impl RealtimeLogout {
    pub fn state(&self) -> ChannelState {
        self.channel.state()
    }

    /// Device id the channel currently listens for
    pub fn device_id(&self) -> Option<String> {
        self.channel.active_device_id()
    }

    pub fn dispose(self) {}
}

impl Drop for RealtimeLogout {
    fn drop(&mut self) {
        self.channel.stop();
        self.dispatcher.abort();

        if let Some(inner) = self.controller.upgrade() {
            let mut slot = lock(&inner.realtime);
            if slot
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, &self.channel))
            {
                *slot = None;
            }
        }
        debug!("Realtime logout disabled");
    }
}

impl std::fmt::Debug for RealtimeLogout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeLogout")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}
