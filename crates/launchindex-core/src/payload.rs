//! Typed event payloads.
//!
//! Every event name the launch contracts emit maps to one variant of
//! [`EventPayload`]. Names without a variant decode to
//! [`EventPayload::Unknown`] so they can still be stored and skipped.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, DeserializeOwned, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::error::IndexerError;

pub const LAUNCH_CREATED: &str = "LaunchCreated";
pub const CONTRIBUTION_MADE: &str = "ContributionMade";
pub const GRADUATED: &str = "Graduated";
pub const PROOF_VERIFIED: &str = "ProofVerified";

/// Event names with a typed payload.
pub const KNOWN_EVENTS: [&str; 4] = [LAUNCH_CREATED, CONTRIBUTION_MADE, GRADUATED, PROOF_VERIFIED];

// ─── Numeric wrappers ────────────────────────────────────────────────────────

macro_rules! decimal_newtype {
    ($(#[$meta:meta])* $name:ident, $inner:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub $inner);

        impl $name {
            pub const ZERO: Self = Self(0);

            pub fn checked_add(self, other: Self) -> Option<Self> {
                self.0.checked_add(other.0).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        /// Accepts decimal (`"1500"`) and `0x`/`0X`-prefixed hex (`"0x5dc"`).
        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                    Some(hex) => <$inner>::from_str_radix(hex, 16),
                    None => s.parse::<$inner>(),
                };
                parsed
                    .map(Self)
                    .map_err(|e| format!("invalid {} '{s}': {e}", stringify!($name)))
            }
        }

        impl From<$inner> for $name {
            fn from(v: $inner) -> Self {
                Self(v)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                struct V;

                impl<'de> Visitor<'de> for V {
                    type Value = $name;

                    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                        f.write_str("a non-negative integer or a decimal/hex string")
                    }

                    fn visit_u64<E: de::Error>(self, v: u64) -> Result<$name, E> {
                        <$inner>::try_from(v).map($name).map_err(E::custom)
                    }

                    fn visit_i64<E: de::Error>(self, v: i64) -> Result<$name, E> {
                        <$inner>::try_from(v).map($name).map_err(E::custom)
                    }

                    fn visit_str<E: de::Error>(self, v: &str) -> Result<$name, E> {
                        v.parse().map_err(E::custom)
                    }
                }

                deserializer.deserialize_any(V)
            }
        }
    };
}

decimal_newtype!(
    /// A token or currency amount in base units. Serialised as a decimal string.
    Amount,
    u128
);

decimal_newtype!(
    /// A 64-bit on-chain quantity (gas, timestamps) that may arrive as a string.
    Quantity,
    u64
);

// ─── Payload structs ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchCreated {
    pub token_address: String,
    pub creator: String,
    pub name: String,
    pub symbol: String,
    pub total_supply: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionMade {
    pub token_address: String,
    /// Single-use proof artifact; one contribution per nullifier.
    pub nullifier: String,
    #[serde(default)]
    pub commitment: Option<String>,
    /// Payment received by the launch.
    pub amount: Amount,
    /// Launch tokens sold in exchange.
    pub token_amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Graduated {
    pub token_address: String,
    pub amm_address: String,
    pub liquidity: Amount,
    /// Unix seconds; the processing time is used when absent.
    #[serde(default)]
    pub timestamp: Option<Quantity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofVerified {
    pub proof_hash: String,
    #[serde(default)]
    pub token_address: Option<String>,
    pub verified: bool,
    pub gas_used: Quantity,
}

// ─── EventPayload ────────────────────────────────────────────────────────────

/// The decoded payload of a chain event, keyed by event name.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    LaunchCreated(LaunchCreated),
    ContributionMade(ContributionMade),
    Graduated(Graduated),
    ProofVerified(ProofVerified),
    Unknown { name: String, data: Value },
}

impl EventPayload {
    /// Decode `data` according to `name`.
    ///
    /// Unrecognised names are not an error; a recognised name whose data does
    /// not fit its struct is.
    pub fn decode(name: &str, data: &Value) -> Result<Self, IndexerError> {
        Ok(match name {
            LAUNCH_CREATED => Self::LaunchCreated(typed(name, data)?),
            CONTRIBUTION_MADE => Self::ContributionMade(typed(name, data)?),
            GRADUATED => Self::Graduated(typed(name, data)?),
            PROOF_VERIFIED => Self::ProofVerified(typed(name, data)?),
            other => Self::Unknown {
                name: other.to_string(),
                data: data.clone(),
            },
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Self::LaunchCreated(_) => LAUNCH_CREATED,
            Self::ContributionMade(_) => CONTRIBUTION_MADE,
            Self::Graduated(_) => GRADUATED,
            Self::ProofVerified(_) => PROOF_VERIFIED,
            Self::Unknown { name, .. } => name,
        }
    }
}

fn typed<T: DeserializeOwned>(name: &str, data: &Value) -> Result<T, IndexerError> {
    T::deserialize(data).map_err(|e| IndexerError::Decode {
        event: name.to_string(),
        reason: e.to_string(),
    })
}
