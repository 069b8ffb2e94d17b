//! Secret version stage labels

use serde::{Deserialize, Serialize};

/// Stage label attached to a secret version
///
/// Each label is held by at most one version of a secret. The wire names are
/// the managed store's native labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VersionStage {
    /// Staged by an in-flight rotation, invisible to readers of the secret
    #[serde(rename = "AWSPENDING")]
    Pending,
    /// Served to readers
    #[serde(rename = "AWSCURRENT")]
    Current,
    /// The version that was current before the last promotion
    #[serde(rename = "AWSPREVIOUS")]
    Previous,
}

impl VersionStage {
    /// Native label string
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "AWSPENDING",
            Self::Current => "AWSCURRENT",
            Self::Previous => "AWSPREVIOUS",
        }
    }

    /// Parse a native label; unknown custom labels yield `None`
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "AWSPENDING" => Some(Self::Pending),
            "AWSCURRENT" => Some(Self::Current),
            "AWSPREVIOUS" => Some(Self::Previous),
            _ => None,
        }
    }
}

impl std::fmt::Display for VersionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_round_trip() {
        for stage in [
            VersionStage::Pending,
            VersionStage::Current,
            VersionStage::Previous,
        ] {
            assert_eq!(VersionStage::from_label(stage.label()), Some(stage));
        }
        assert_eq!(VersionStage::from_label("custom"), None);
    }

    #[test]
    fn test_serde_uses_native_labels() {
        let json = serde_json::to_string(&VersionStage::Current).unwrap();
        assert_eq!(json, "\"AWSCURRENT\"");
    }
}
