//! Typed identifiers.
//!
//! Every entity id is a distinct newtype over `String` so identifiers cannot
//! be mixed up across tables. Generated ids use the `prefix_timestamp_seq`
//! format produced by the store sequence.

use serde::{Deserialize, Serialize};

macro_rules! declare_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Wrap an existing identifier
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw string
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

declare_id!(
    /// Tenant root: a construction site
    SiteId
);
declare_id!(
    /// Contracting company bound to one or more sites
    ContractorId
);
declare_id!(
    /// Field operative
    WorkerId
);
declare_id!(
    /// Physical zone within a site
    AreaId
);
declare_id!(
    /// Work permit (approved plan of on-site work)
    PermitId
);
declare_id!(
    /// Per-day instantiation of a permit
    DailyTicketId
);
declare_id!(
    /// Per-worker fanout row of a daily ticket
    FanoutId
);
declare_id!(
    /// Training session record
    SessionId
);
declare_id!(
    /// Access grant record
    GrantId
);
declare_id!(
    /// Ingested access event
    EventId
);
declare_id!(
    /// Alert record
    AlertId
);
declare_id!(
    /// Authenticated principal (admin user or worker)
    ActorId
);
declare_id!(
    /// Random identity-check probe issued during training
    ProbeId
);

/// Opaque session token issued when a training session opens.
///
/// Tokens are cryptographically random and act as the serialization key for
/// all session mutations.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(pub String);

impl SessionToken {
    /// Number of random bytes in a token
    pub const TOKEN_BYTES: usize = 16;

    /// Wrap an existing token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Issue a fresh random token
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; Self::TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Borrow the raw string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_roundtrip() {
        let id = SiteId::new("site_0001");
        assert_eq!(id.as_str(), "site_0001");
        assert_eq!(id.to_string(), "site_0001");
        assert_eq!(SiteId::from("site_0001"), id);
    }

    #[test]
    fn test_id_serde_transparent() {
        let id = PermitId::new("permit_0001");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"permit_0001\"");
        let back: PermitId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_session_token_generation() {
        let a = SessionToken::generate();
        let b = SessionToken::generate();
        assert_eq!(a.as_str().len(), SessionToken::TOKEN_BYTES * 2);
        assert_ne!(a, b);
    }
}
