//! Collaborator traits implemented by the host application

use crate::error::RuptResult;
use crate::types::*;

/// Durable string key/value storage, e.g. user defaults or a settings file
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> RuptResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> RuptResult<()>;

    fn remove(&self, key: &str) -> RuptResult<()>;
}

/// Source of the device description sent with access and identity calls
pub trait DeviceMetadataProvider: Send + Sync {
    /// OS name/version plus vendor, model and form factor
    fn device_info(&self) -> DeviceInfo;

    /// Platform vendor identifier, forwarded opaquely under `signals`
    fn vendor_signal(&self) -> VendorSignal;

    fn client_platform(&self) -> ClientPlatform;
}

/// Presentation layer hooks. Implementations must not block.
pub trait Presenter: Send + Sync {
    /// Open the modal surface that forces the user to detach devices
    fn show_blocking_surface(&self);

    fn hide_blocking_surface(&self);

    /// Render the attached list; `current_device_id` marks this device
    fn render_attached_devices(&self, devices: &[DeviceRecord], current_device_id: Option<&str>);
}

/// Presenter for headless hosts
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPresenter;

impl Presenter for NoopPresenter {
    fn show_blocking_surface(&self) {}

    fn hide_blocking_surface(&self) {}

    fn render_attached_devices(
        &self,
        _devices: &[DeviceRecord],
        _current_device_id: Option<&str>,
    ) {
    }
}
