use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which native block list a package belongs to. The two lists are disjoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NativeAppMode {
    /// Blocked only while focus is enforced.
    Session,
    /// Blocked whenever monitoring runs.
    Persistent,
    Off,
}

impl fmt::Display for NativeAppMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NativeAppMode::Session => "session",
            NativeAppMode::Persistent => "persistent",
            NativeAppMode::Off => "off",
        })
    }
}

impl FromStr for NativeAppMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "session" => Ok(NativeAppMode::Session),
            "persistent" => Ok(NativeAppMode::Persistent),
            "off" => Ok(NativeAppMode::Off),
            other => Err(format!("Unknown native app mode: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse_and_display() {
        for mode in [NativeAppMode::Session, NativeAppMode::Persistent, NativeAppMode::Off] {
            assert_eq!(mode.to_string().parse::<NativeAppMode>().unwrap(), mode);
        }
        assert!("always".parse::<NativeAppMode>().is_err());
    }
}
