//! Adapter composition modes.

use serde::{Deserialize, Serialize};

/// Which stages the adapter registers after transcoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterMode {
    /// Parse, resolve, dispatch to the resource engine and materialize.
    #[default]
    FullDispatch,
    /// Hand the transcoded JSON request to a downstream handler.
    Passthrough,
}

impl AdapterMode {
    /// Returns the mode name as used in configuration.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FullDispatch => "full_dispatch",
            Self::Passthrough => "passthrough",
        }
    }
}

impl std::fmt::Display for AdapterMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_serde_names() {
        assert_eq!(
            serde_json::to_string(&AdapterMode::Passthrough).unwrap(),
            "\"passthrough\""
        );
        let mode: AdapterMode = serde_json::from_str("\"full_dispatch\"").unwrap();
        assert_eq!(mode, AdapterMode::default());
    }
}
