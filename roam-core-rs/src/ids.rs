//! Identifiers for roaming entities
//!
//! Every entity kind is keyed by an opaque, comparable, hashable string id.
//! Parsing the operator-specific id grammars is not done here; the only
//! boundary check is that an id is not blank.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised when constructing an identifier
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("{kind} identifier must not be empty")]
    Empty { kind: &'static str },
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Create an identifier, rejecting blank input
            pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
                let value = value.into();
                if value.trim().is_empty() {
                    return Err(IdError::Empty { kind: $kind });
                }
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifier of a single charge point (EVSE)
    EvseId,
    "EVSE"
);

string_id!(
    /// Identifier of a charging station grouping one or more EVSEs
    ChargingStationId,
    "charging station"
);

string_id!(
    /// Identifier of a charging pool grouping charging stations at one location
    ChargingPoolId,
    "charging pool"
);

string_id!(
    /// Identifier of a charging station operator
    ChargingStationOperatorId,
    "charging station operator"
);

string_id!(
    /// Identifier of a roaming network
    RoamingNetworkId,
    "roaming network"
);

string_id!(
    /// Identifier of a charge detail record
    ChargeDetailRecordId,
    "charge detail record"
);

string_id!(
    /// Correlation id following one change through enqueue, flush and events
    EventTrackingId,
    "event tracking"
);

impl EventTrackingId {
    /// Generate a fresh random tracking id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl ChargeDetailRecordId {
    /// Generate a fresh random record id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}
