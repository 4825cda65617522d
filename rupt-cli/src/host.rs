//! Host collaborators for terminal use

use rupt_core::{
    ClientPlatform, DeviceDetails, DeviceInfo, DeviceMetadataProvider, DeviceRecord, DeviceType,
    KeyValueStore, OsInfo, Presenter, RuptResult, VendorSignal,
};
use tracing::info;

/// Store key of the generated vendor identifier
pub const VENDOR_ID_KEY: &str = "rupt_vendor_id";

/// Describes the machine the CLI runs on
#[derive(Debug, Clone)]
pub struct HostMetadataProvider {
    os: &'static str,
    vendor_id: String,
}

impl HostMetadataProvider {
    /// Terminal hosts have no platform vendor identifier, so one is generated
    /// on first use and kept in `store` for every later run.
    pub fn load(store: &dyn KeyValueStore) -> RuptResult<Self> {
        let vendor_id = match store.get(VENDOR_ID_KEY)? {
            Some(existing) if !existing.is_empty() => existing,
            _ => {
                let generated = uuid::Uuid::new_v4().to_string();
                store.set(VENDOR_ID_KEY, &generated)?;
                info!(vendor_id = %generated, "Generated vendor identifier");
                generated
            }
        };

        Ok(Self {
            os: std::env::consts::OS,
            vendor_id,
        })
    }

    fn device_type(&self) -> DeviceType {
        match self.os {
            "ios" | "android" => DeviceType::Mobile,
            _ => DeviceType::Computer,
        }
    }
}

impl DeviceMetadataProvider for HostMetadataProvider {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            os: Some(OsInfo {
                name: Some(self.os.to_string()),
                version: None,
            }),
            device: Some(DeviceDetails {
                vendor: None,
                device_type: Some(self.device_type().as_str().to_string()),
                model: Some(std::env::consts::ARCH.to_string()),
            }),
        }
    }

    fn vendor_signal(&self) -> VendorSignal {
        VendorSignal::new(format!("{}VendorIdentifier", self.os), &self.vendor_id)
    }

    fn client_platform(&self) -> ClientPlatform {
        match self.os {
            "ios" => ClientPlatform::Ios,
            "macos" => ClientPlatform::Mac,
            "android" => ClientPlatform::Android,
            "linux" => ClientPlatform::Linux,
            "windows" => ClientPlatform::Windows,
            "" => ClientPlatform::Unspecified,
            other => ClientPlatform::Other(other.to_string()),
        }
    }
}

/// Prints the blocking surface and device list to stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsolePresenter;

impl Presenter for ConsolePresenter {
    fn show_blocking_surface(&self) {
        println!("⛔ Device limit reached. Detach a device to continue using this account.");
    }

    fn hide_blocking_surface(&self) {
        println!("✅ Device limit satisfied");
    }

    fn render_attached_devices(&self, devices: &[DeviceRecord], current_device_id: Option<&str>) {
        println!("📱 Attached devices ({}):", devices.len());
        for device in devices {
            let marker = if current_device_id == Some(device.id.as_str()) {
                "*"
            } else {
                " "
            };
            println!("{} {}  {}", marker, device.id, describe(device));
        }
    }
}

fn describe(device: &DeviceRecord) -> String {
    let os = device.info.os.as_ref();
    let details = device.info.device.as_ref();
    let parts: Vec<&str> = [
        os.and_then(|o| o.name.as_deref()),
        os.and_then(|o| o.version.as_deref()),
        details.and_then(|d| d.vendor.as_deref()),
        details.and_then(|d| d.model.as_deref()),
    ]
    .into_iter()
    .flatten()
    .collect();

    let label = if parts.is_empty() {
        "unknown device".to_string()
    } else {
        parts.join(" ")
    };
    format!(
        "{} (since {})",
        label,
        device.created_at.format("%Y-%m-%d %H:%M")
    )
}
