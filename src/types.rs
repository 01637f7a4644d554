//! NewType wrappers for identities that cross the gateway.
//!
//! The external id (what Telegram calls the user) and the subject id (what a
//! token is bound to) are kept as distinct types so a raw string from a token
//! can never be used as a storage key without being parsed first.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Macro to generate a NewType wrapper with standard trait implementations.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner String.
            pub fn into_inner(self) -> String {
                self.0
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

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

newtype_string!(
    /// Subject a session token is bound to (the `sub` claim).
    ///
    /// Always the decimal rendering of an [`ExternalUserId`] when minted by
    /// this service, but validated tokens only promise a string, so it has to
    /// be parsed back before it can address storage.
    SubjectId
);

newtype_string!(
    /// Expected `iss` claim of session tokens.
    TokenIssuerName
);

newtype_string!(
    /// Expected `aud` claim of session tokens.
    TokenAudience
);

/// Stable user identifier assigned by the identity provider (Telegram user id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalUserId(i64);

impl ExternalUserId {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for ExternalUserId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl FromStr for ExternalUserId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>().map(Self)
    }
}

impl fmt::Display for ExternalUserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ExternalUserId> for SubjectId {
    fn from(id: ExternalUserId) -> Self {
        SubjectId(id.to_string())
    }
}

impl TryFrom<&SubjectId> for ExternalUserId {
    type Error = ParseIntError;

    fn try_from(subject: &SubjectId) -> Result<Self, Self::Error> {
        subject.as_str().parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_from_external_id() {
        let subject = SubjectId::from(ExternalUserId::new(42));
        assert_eq!(subject.as_str(), "42");
    }

    #[test]
    fn test_external_id_from_subject() {
        let subject = SubjectId::new("-1001234");
        let id = ExternalUserId::try_from(&subject).unwrap();
        assert_eq!(id.get(), -1001234);
    }

    #[test]
    fn test_external_id_rejects_garbage() {
        assert!(ExternalUserId::try_from(&SubjectId::new("abc")).is_err());
        assert!(ExternalUserId::try_from(&SubjectId::new("")).is_err());
        assert!(ExternalUserId::try_from(&SubjectId::new("12 ")).is_err());
    }

    #[test]
    fn test_newtype_serde_transparent() {
        let json = serde_json::to_string(&SubjectId::new("7")).unwrap();
        assert_eq!(json, "\"7\"");
        let id: ExternalUserId = serde_json::from_str("7").unwrap();
        assert_eq!(id, ExternalUserId::new(7));
    }
}
