use serde::Serialize;
use thiserror::Error;

/// Permissions the native blocker needs before it can intercept apps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionStatus {
    pub accessibility: bool,
    pub usage_stats: bool,
    pub overlay: bool,
    pub all_granted: bool,
}

impl PermissionStatus {
    pub fn new(accessibility: bool, usage_stats: bool, overlay: bool) -> Self {
        Self {
            accessibility,
            usage_stats,
            overlay,
            all_granted: accessibility && usage_stats && overlay,
        }
    }
}

#[derive(Debug, Error)]
pub enum EnforcementError {
    #[error("App blocking is not supported on this platform")]
    Unsupported,

    #[error("Enforcement surface failed: {0}")]
    Surface(String),
}

/// The OS-level app blocker. Pushes are full replacements, so repeating one
/// is harmless.
pub trait EnforcementSurface: Send + Sync {
    /// Replace the blocked package set. Returns how many are now blocked.
    fn set_blocked_apps(&self, packages: &[String]) -> Result<usize, EnforcementError>;
    /// Returns whether monitoring is running afterwards.
    fn start_monitoring(&self) -> Result<bool, EnforcementError>;
    /// Returns whether monitoring was stopped.
    fn stop_monitoring(&self) -> Result<bool, EnforcementError>;
    fn check_permissions(&self) -> Result<PermissionStatus, EnforcementError>;
}
