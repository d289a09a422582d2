//! Shared domain types

use serde::{Deserialize, Serialize};

/// Identifier of a remote channel.
///
/// Channels are referred to by whatever handle the remote source uses: a
/// public name (`rustlang`), or a signed numeric id (`-1001234567`). The
/// identifier doubles as the channel's storage namespace, so path separators
/// are rejected at construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    /// Create a channel id, rejecting identifiers that cannot serve as a
    /// storage directory name.
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(crate::GleanerError::config("channel id must not be empty"));
        }
        if id.contains('/') || id.contains('\\') || id == "." || id == ".." {
            return Err(crate::GleanerError::config(format!(
                "channel id '{}' contains path characters",
                id
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ChannelId {
    type Err = crate::GleanerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_names_and_numeric_ids() {
        assert!(ChannelId::new("rustlang").is_ok());
        assert!(ChannelId::new("-1001234567").is_ok());
        assert!(ChannelId::new("@handle").is_ok());
    }

    #[test]
    fn test_rejects_path_like_ids() {
        assert!(ChannelId::new("").is_err());
        assert!(ChannelId::new("a/b").is_err());
        assert!(ChannelId::new("..").is_err());
    }

    #[test]
    fn test_serde_transparent() {
        let id = ChannelId::new("rustlang").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"rustlang\"");
        let back: ChannelId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
