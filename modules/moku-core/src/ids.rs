use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares an opaque-id newtype over a v4 UUID. All of Moku's identifiers
/// are opaque strings; wrapping each kind separately keeps a
/// `WebsiteId` from being handed where a `JobId` is expected.
macro_rules! opaque_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl From<Uuid> for $name {
            fn from(u: Uuid) -> Self {
                Self(u)
            }
        }
    };
}

opaque_id!(ProjectId);
opaque_id!(WebsiteId);
opaque_id!(JobId);
opaque_id!(VersionId);
opaque_id!(SnapshotId);
opaque_id!(ScoreResultId);
opaque_id!(EvidenceItemId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_display_and_parse() {
        let id = WebsiteId::new();
        let parsed: WebsiteId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn distinct_kinds_do_not_compare_equal_by_accident() {
        let uuid = Uuid::new_v4();
        let website = WebsiteId::from(uuid);
        let job = JobId::from(uuid);
        assert_eq!(website.as_uuid(), job.as_uuid());
        // Different types entirely; this line wouldn't compile if they were the same type:
        // let _: WebsiteId = job;
    }
}
