//! Annotation privacy levels.

use serde::{Deserialize, Serialize};

/// How widely an annotation is visible.
///
/// Stored as the numeric code in both schemas; gaps between codes leave
/// room for intermediate levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum PrivacyLevel {
    /// Visible only to the owner.
    Private,
    /// Shared; follows list memberships.
    Shared,
    /// Shared and pinned against automatic list-driven changes.
    SharedProtected,
}

impl PrivacyLevel {
    /// The stored numeric code.
    pub fn code(self) -> i64 {
        match self {
            PrivacyLevel::Private => 100,
            PrivacyLevel::Shared => 200,
            PrivacyLevel::SharedProtected => 300,
        }
    }

    /// Parses a stored code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            100 => Some(PrivacyLevel::Private),
            200 => Some(PrivacyLevel::Shared),
            300 => Some(PrivacyLevel::SharedProtected),
            _ => None,
        }
    }

    /// Returns true if the annotation is visible beyond its owner.
    pub fn is_shared(self) -> bool {
        matches!(self, PrivacyLevel::Shared | PrivacyLevel::SharedProtected)
    }
}

impl From<PrivacyLevel> for i64 {
    fn from(level: PrivacyLevel) -> i64 {
        level.code()
    }
}

impl TryFrom<i64> for PrivacyLevel {
    type Error = String;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        PrivacyLevel::from_code(code).ok_or_else(|| format!("invalid privacy level code: {code}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_roundtrip() {
        for level in [
            PrivacyLevel::Private,
            PrivacyLevel::Shared,
            PrivacyLevel::SharedProtected,
        ] {
            assert_eq!(PrivacyLevel::from_code(level.code()), Some(level));
        }
        assert_eq!(PrivacyLevel::from_code(150), None);
    }

    #[test]
    fn shared_predicate() {
        assert!(!PrivacyLevel::Private.is_shared());
        assert!(PrivacyLevel::Shared.is_shared());
        assert!(PrivacyLevel::SharedProtected.is_shared());
    }
}
