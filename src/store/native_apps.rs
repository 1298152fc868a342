use super::DomainStore;
use crate::bus::ChangeKind;
use crate::constants::keys;
use crate::error::AppError;
use crate::models::NativeAppMode;
use crate::validation::validate_package_name;
use serde_json::Value;

fn package_name(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl DomainStore {
    /// Packages blocked only while focus is enforced.
    pub fn session_apps(&self) -> Vec<String> {
        self.read_collection(keys::SESSION_APPS, package_name)
    }

    /// Packages blocked whenever monitoring runs.
    pub fn persistent_apps(&self) -> Vec<String> {
        self.read_collection(keys::PERSISTENT_APPS, package_name)
    }

    /// Move `package` into the list for `mode`, removing it from the other.
    pub fn toggle_native_app(&self, package: &str, mode: NativeAppMode) -> Result<(), AppError> {
        let package = validate_package_name(package)?;
        {
            let _guard = self.lock_writes();
            let mut session = self.session_apps();
            let mut persistent = self.persistent_apps();
            session.retain(|p| p != package);
            persistent.retain(|p| p != package);
            match mode {
                NativeAppMode::Session => session.push(package.to_string()),
                NativeAppMode::Persistent => persistent.push(package.to_string()),
                NativeAppMode::Off => {}
            }
            self.write_json(keys::SESSION_APPS, &session)?;
            self.write_json(keys::PERSISTENT_APPS, &persistent)?;
        }
        log::debug!("Native app {package} set to {mode}");
        self.publish(ChangeKind::BlockedSites);
        Ok(())
    }

    pub fn native_app_mode(&self, package: &str) -> NativeAppMode {
        if self.persistent_apps().iter().any(|p| p == package) {
            NativeAppMode::Persistent
        } else if self.session_apps().iter().any(|p| p == package) {
            NativeAppMode::Session
        } else {
            NativeAppMode::Off
        }
    }
}
