//! Resource identity and progress markers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of versions minted from a sequence number.
///
/// 20 digits holds any `u64`, so lexicographic order equals numeric order.
const SEQUENCE_WIDTH: usize = 20;

/// Identity of a live resource: the owning cloud account and the resource name.
///
/// Used as the cache's map key. Displays as `account_id/name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    /// Cloud account (namespace) that owns the resource.
    pub account_id: String,
    /// Resource name, unique within the account.
    pub name: String,
}

impl ResourceKey {
    /// Creates a new resource key.
    pub fn new(account_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account_id, self.name)
    }
}

/// Opaque, totally ordered progress marker assigned by the remote API.
///
/// Ordering is byte-wise lexicographic. The empty version means
/// "no version known yet".
#[derive(
    Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ResourceVersion(String);

impl ResourceVersion {
    /// Creates a version from its string form.
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    /// Mints a version from a sequence number.
    ///
    /// The result is zero-padded so that lexicographic and numeric order agree.
    pub fn from_sequence(sequence: u64) -> Self {
        Self(format!("{sequence:0width$}", width = SEQUENCE_WIDTH))
    }

    /// Parses the version back into a sequence number.
    ///
    /// The empty version parses as 0. Returns `None` for non-numeric versions.
    pub fn sequence(&self) -> Option<u64> {
        if self.0.is_empty() {
            return Some(0);
        }
        self.0.parse().ok()
    }

    /// Returns the string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if no version is known.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ResourceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceVersion {
    fn from(version: &str) -> Self {
        Self::new(version)
    }
}

impl From<String> for ResourceVersion {
    fn from(version: String) -> Self {
        Self(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn key_display() {
        let key = ResourceKey::new("123456789012", "vpc1");
        assert_eq!(key.to_string(), "123456789012/vpc1");
    }

    #[test]
    fn key_ordering_is_account_first() {
        let a = ResourceKey::new("a", "z");
        let b = ResourceKey::new("b", "a");
        assert!(a < b);
    }

    #[test]
    fn version_lexicographic_order() {
        assert!(ResourceVersion::new("11") < ResourceVersion::new("12"));
        // Lexicographic, not numeric, for arbitrary strings.
        assert!(ResourceVersion::new("9") > ResourceVersion::new("10"));
        assert!(ResourceVersion::default() < ResourceVersion::new("0"));
    }

    #[test]
    fn version_sequence_parsing() {
        assert_eq!(ResourceVersion::default().sequence(), Some(0));
        assert_eq!(ResourceVersion::new("11").sequence(), Some(11));
        assert_eq!(ResourceVersion::from_sequence(42).sequence(), Some(42));
        assert_eq!(ResourceVersion::new("abc").sequence(), None);
        assert_eq!(ResourceVersion::from_sequence(7).as_str().len(), 20);
    }

    proptest! {
        #[test]
        fn minted_versions_order_like_their_sequences(a in any::<u64>(), b in any::<u64>()) {
            let va = ResourceVersion::from_sequence(a);
            let vb = ResourceVersion::from_sequence(b);
            prop_assert_eq!(va.cmp(&vb), a.cmp(&b));
        }
    }
}
