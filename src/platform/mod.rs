pub mod types;

pub use types::{EnforcementError, EnforcementSurface, PermissionStatus};

/// Surface for hosts without native app blocking. Pushes are accepted and
/// dropped; monitoring never starts.
#[derive(Debug, Default)]
pub struct UnsupportedSurface;

impl EnforcementSurface for UnsupportedSurface {
    fn set_blocked_apps(&self, packages: &[String]) -> Result<usize, EnforcementError> {
        log::debug!("No native blocker, ignoring {} package(s)", packages.len());
        Ok(0)
    }

    fn start_monitoring(&self) -> Result<bool, EnforcementError> {
        Err(EnforcementError::Unsupported)
    }

    fn stop_monitoring(&self) -> Result<bool, EnforcementError> {
        Ok(false)
    }

    fn check_permissions(&self) -> Result<PermissionStatus, EnforcementError> {
        Ok(PermissionStatus::default())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_status_all_granted() {
        assert!(PermissionStatus::new(true, true, true).all_granted);
        assert!(!PermissionStatus::new(true, false, true).all_granted);
    }

    #[test]
    fn test_unsupported_surface() {
        let surface = UnsupportedSurface;
        assert_eq!(surface.set_blocked_apps(&["a".to_string()]).unwrap(), 0);
        assert!(matches!(surface.start_monitoring(), Err(EnforcementError::Unsupported)));
        assert!(!surface.stop_monitoring().unwrap());
        assert!(!surface.check_permissions().unwrap().all_granted);
    }
}
