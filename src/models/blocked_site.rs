use super::lenient::{coerce_bool, non_empty_str};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockMode {
    Always,
    /// Blocked only while a focus session is running.
    #[default]
    Focus,
}

impl BlockMode {
    /// Anything unrecognized is focus-only: never promote to always-blocked.
    pub fn from_value(value: Option<&Value>) -> Self {
        match value.and_then(Value::as_str) {
            Some("always") => BlockMode::Always,
            Some(_) | None => BlockMode::Focus,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            BlockMode::Always => BlockMode::Focus,
            BlockMode::Focus => BlockMode::Always,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedSite {
    pub id: String,
    pub name: String,
    pub url: String,
    pub is_enabled: bool,
    pub block_mode: BlockMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl BlockedSite {
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url: url.into(),
            is_enabled: true,
            block_mode: BlockMode::default(),
            icon: None,
        }
    }

    /// Sanitizing read of one stored record. Records without id or URL are
    /// dropped; `isEnabled` falls back to the legacy `blocked` flag.
    pub fn from_value(value: &Value) -> Option<Self> {
        let id = non_empty_str(value.get("id"))?;
        let url = non_empty_str(value.get("url"))?;
        let is_enabled = value
            .get("isEnabled")
            .and_then(coerce_bool)
            .or_else(|| value.get("blocked").and_then(coerce_bool))
            .unwrap_or(false);

        Some(Self {
            name: non_empty_str(value.get("name")).unwrap_or_else(|| url.clone()),
            id,
            url,
            is_enabled,
            block_mode: BlockMode::from_value(value.get("blockMode")),
            icon: non_empty_str(value.get("icon")),
        })
    }

    /// Whether the site must be blocked right now.
    pub fn is_effective(&self, session_active: bool) -> bool {
        self.is_enabled && (self.block_mode == BlockMode::Always || session_active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_invalid_block_mode_fails_toward_focus() {
        let site = BlockedSite::from_value(&json!({
            "id": "1", "name": "Reddit", "url": "reddit.com", "isEnabled": true, "blockMode": "forever"
        }))
        .unwrap();
        assert_eq!(site.block_mode, BlockMode::Focus);

        let site = BlockedSite::from_value(&json!({"id": "1", "url": "reddit.com"})).unwrap();
        assert_eq!(site.block_mode, BlockMode::Focus);
        assert!(!site.is_enabled);
        assert_eq!(site.name, "reddit.com");
    }

    #[test]
    fn test_legacy_blocked_flag_is_coerced() {
        let site = BlockedSite::from_value(&json!({"id": "1", "url": "x.com", "blocked": "true"})).unwrap();
        assert!(site.is_enabled);

        let site = BlockedSite::from_value(&json!({
            "id": "1", "url": "x.com", "blocked": true, "isEnabled": false
        }))
        .unwrap();
        assert!(!site.is_enabled);
    }

    #[test]
    fn test_missing_url_is_dropped() {
        assert!(BlockedSite::from_value(&json!({"id": "1", "name": "x"})).is_none());
    }

    #[test]
    fn test_is_effective() {
        let mut site = BlockedSite::new("1", "Reddit", "reddit.com");
        assert!(!site.is_effective(false));
        assert!(site.is_effective(true));

        site.block_mode = BlockMode::Always;
        assert!(site.is_effective(false));

        site.is_enabled = false;
        assert!(!site.is_effective(true));
    }

    #[test]
    fn test_serializes_camel_case() {
        let value = serde_json::to_value(BlockedSite::new("1", "r", "reddit.com")).unwrap();
        assert_eq!(value["isEnabled"], true);
        assert_eq!(value["blockMode"], "focus");
    }
}
