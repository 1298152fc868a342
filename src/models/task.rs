use super::lenient::{de_bool, non_empty_str};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }
}

// Unknown priorities read back as medium instead of rejecting the task.
impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(value.as_str().and_then(Priority::parse).unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default, alias = "notes", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, alias = "datetime", skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, deserialize_with = "de_bool")]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>, created_at: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            due_date: None,
            priority: Priority::default(),
            completed: false,
            created_at: Some(created_at.into()),
            completed_at: None,
        }
    }

    /// Sanitizing read of one stored record. Records without an id are dropped.
    pub fn from_value(value: &Value) -> Option<Self> {
        non_empty_str(value.get("id"))?;
        match serde_json::from_value::<Task>(value.clone()) {
            Ok(task) => Some(task),
            Err(e) => {
                log::debug!("Dropping malformed task: {e}");
                None
            }
        }
    }

    /// Calendar day (`YYYY-MM-DD`) the task was completed on, falling back to
    /// the creation day for records written before completion was stamped.
    pub fn completion_day(&self) -> Option<&str> {
        if !self.completed {
            return None;
        }
        self.completed_at
            .as_deref()
            .or(self.created_at.as_deref())
            .and_then(|ts| ts.get(..10))
    }
}
