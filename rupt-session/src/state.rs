//! UI-facing session state
//!
//! Snapshot consumed by the presentation layer. Mutated only by the
//! controller; readers get a clone through `SessionController::state`.

use rupt_core::{DeviceRecord, LimitConfig};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceListState {
    pub current_device_id: Option<String>,
    /// Replaced wholesale by a successful list, entries removed on detach
    pub attached_devices: Vec<DeviceRecord>,
    pub limit_config: Option<LimitConfig>,
    pub loading_devices: bool,
    /// Set while the blocking surface is being prepared
    pub detach_loading: bool,
    pub default_device_limit: Option<u32>,
    pub blocking_visible: bool,
}

impl DeviceListState {
    pub fn find_device(&self, device_id: &str) -> Option<&DeviceRecord> {
        self.attached_devices.iter().find(|d| d.id == device_id)
    }

    /// Cached record of this device, if the list has been fetched
    pub fn current_device(&self) -> Option<&DeviceRecord> {
        self.current_device_id
            .as_deref()
            .and_then(|id| self.find_device(id))
    }

    pub fn is_current_device(&self, device_id: &str) -> bool {
        self.current_device_id.as_deref() == Some(device_id)
    }

    /// Returns whether a record was removed
    pub fn remove_device(&mut self, device_id: &str) -> bool {
        let before = self.attached_devices.len();
        self.attached_devices.retain(|d| d.id != device_id);
        self.attached_devices.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rupt_core::DeviceInfo;

    fn record(id: &str) -> DeviceRecord {
        DeviceRecord {
            id: id.to_string(),
            info: DeviceInfo::default(),
            user: "user-1".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_current_device_lookup() {
        let mut state = DeviceListState {
            current_device_id: Some("dev-2".to_string()),
            attached_devices: vec![record("dev-1"), record("dev-2")],
            ..Default::default()
        };
        assert_eq!(state.current_device().map(|d| d.id.as_str()), Some("dev-2"));
        assert!(state.is_current_device("dev-2"));

        assert!(state.remove_device("dev-2"));
        assert!(!state.remove_device("dev-2"));
        assert!(state.current_device().is_none());
        assert_eq!(state.attached_devices.len(), 1);
    }
}
