use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Device capability needed for a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    Camera,
    Microphone,
    /// Bluetooth headsets on Android 12 and later
    NearbyDevices,
}

/// Android API level from which nearby-devices access is a runtime permission
pub const NEARBY_DEVICES_MIN_API: u32 = 31;

/// Facts about the host platform that decide what to ask for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlatformProfile {
    pub android_api_level: Option<u32>,
}

impl PlatformProfile {
    pub fn required_capabilities(&self) -> Vec<Capability> {
        let mut capabilities = vec![Capability::Camera, Capability::Microphone];
        if self
            .android_api_level
            .is_some_and(|level| level >= NEARBY_DEVICES_MIN_API)
        {
            capabilities.push(Capability::NearbyDevices);
        }
        capabilities
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionOutcome {
    Granted,
    Denied(Vec<Capability>),
}

/// Prompts the user for device access
#[async_trait]
pub trait DevicePermissions: Send + Sync {
    async fn request(&self, capabilities: &[Capability]) -> PermissionOutcome;
}

/// For headless clients with no device prompts
#[derive(Debug, Clone, Copy, Default)]
pub struct GrantAll;

#[async_trait]
impl DevicePermissions for GrantAll {
    async fn request(&self, _capabilities: &[Capability]) -> PermissionOutcome {
        PermissionOutcome::Granted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearby_devices_on_recent_android() {
        let old = PlatformProfile {
            android_api_level: Some(30),
        };
        let recent = PlatformProfile {
            android_api_level: Some(33),
        };

        assert_eq!(
            old.required_capabilities(),
            vec![Capability::Camera, Capability::Microphone]
        );
        assert!(recent
            .required_capabilities()
            .contains(&Capability::NearbyDevices));
        assert_eq!(PlatformProfile::default().required_capabilities().len(), 2);
    }
}
