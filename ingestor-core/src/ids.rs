//! Opaque identifiers threaded through every component.
//!
//! Each id is a newtype over `String` so call sites can't accidentally pass
//! a `StoreId` where a `JobId` is expected; none of them are interpreted
//! outside their owning component.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! opaque_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

opaque_id!(StoreId);
opaque_id!(DocumentId);
opaque_id!(JobId);

/// Generates a random-ish, printable id: 16 hex chars of randomness prefixed
/// by a short tag so ids stay visually distinguishable in logs.
pub fn generate_id(tag: &str) -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let mut buf = [0u8; 8];
    getrandom::fill(&mut buf).expect("OS RNG unavailable");
    let rand = u64::from_le_bytes(buf);
    format!("{tag}-{nanos:x}-{rand:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_roundtrip_through_serde() {
        let id = StoreId::from("abc");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abc\"");
        let back: StoreId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = generate_id("job");
        let b = generate_id("job");
        assert_ne!(a, b);
        assert!(a.starts_with("job-"));
    }
}
