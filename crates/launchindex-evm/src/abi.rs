//! Event ABI table and log decoding.
//!
//! Each tracked event name maps to a parsed Solidity event. Decoded logs are
//! turned into a JSON object keyed by parameter name, which is the shape the
//! core payload types expect.

use std::collections::HashMap;

use alloy_dyn_abi::{DynSolValue, EventExt};
use alloy_json_abi::Event;
use alloy_primitives::{hex, B256};
use serde_json::{Map, Value};

use launchindex_core::error::IndexerError;
use launchindex_core::payload::{CONTRIBUTION_MADE, GRADUATED, LAUNCH_CREATED, PROOF_VERIFIED};

/// Signatures emitted by the launch contracts.
pub const DEFAULT_SIGNATURES: [(&str, &str); 4] = [
    (
        LAUNCH_CREATED,
        "event LaunchCreated(address indexed tokenAddress, address indexed creator, string name, string symbol, uint256 totalSupply)",
    ),
    (
        CONTRIBUTION_MADE,
        "event ContributionMade(address indexed tokenAddress, bytes32 indexed nullifier, bytes32 commitment, uint256 amount, uint256 tokenAmount)",
    ),
    (
        GRADUATED,
        "event Graduated(address indexed tokenAddress, address ammAddress, uint256 liquidity, uint256 timestamp)",
    ),
    (
        PROOF_VERIFIED,
        "event ProofVerified(bytes32 indexed proofHash, address indexed tokenAddress, bool verified, uint256 gasUsed)",
    ),
];

/// Name → parsed event.
#[derive(Debug, Clone, Default)]
pub struct EventAbi {
    events: HashMap<String, Event>,
}

impl EventAbi {
    /// The built-in launch contract events.
    pub fn launch_defaults() -> Result<Self, IndexerError> {
        Self::from_signatures(DEFAULT_SIGNATURES)
    }

    /// Parse `(name, signature)` pairs. The name must match the event name in
    /// the signature.
    pub fn from_signatures<I, N, S>(signatures: I) -> Result<Self, IndexerError>
    where
        I: IntoIterator<Item = (N, S)>,
        N: AsRef<str>,
        S: AsRef<str>,
    {
        let mut abi = Self::default();
        for (name, signature) in signatures {
            abi.insert(name.as_ref(), signature.as_ref())?;
        }
        Ok(abi)
    }

    /// Add or replace one event.
    pub fn insert(&mut self, name: &str, signature: &str) -> Result<(), IndexerError> {
        let event = Event::parse(signature).map_err(|e| {
            IndexerError::Config(format!("invalid signature for '{name}': {e}"))
        })?;
        if event.name != name {
            return Err(IndexerError::Config(format!(
                "signature declares '{}' but is configured as '{name}'",
                event.name
            )));
        }
        self.events.insert(name.to_string(), event);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.events.contains_key(name)
    }

    /// topic0 for `name`.
    pub fn selector(&self, name: &str) -> Option<B256> {
        self.events.get(name).map(Event::selector)
    }

    /// Canonical signatures, sorted by event name.
    pub fn signatures(&self) -> Vec<(String, String)> {
        let mut out: Vec<_> = self
            .events
            .iter()
            .map(|(name, event)| (name.clone(), event.signature()))
            .collect();
        out.sort();
        out
    }

    /// Decode a log's topics and data into a JSON object keyed by parameter
    /// name.
    pub fn decode(&self, name: &str, topics: &[B256], data: &[u8]) -> Result<Value, IndexerError> {
        let decode_err = |reason: String| IndexerError::Decode {
            event: name.to_string(),
            reason,
        };

        let event = self
            .events
            .get(name)
            .ok_or_else(|| decode_err("no ABI registered".into()))?;
        let decoded = event
            .decode_log_parts(topics.iter().copied(), data, true)
            .map_err(|e| decode_err(e.to_string()))?;

        let mut indexed = decoded.indexed.into_iter();
        let mut body = decoded.body.into_iter();
        let mut out = Map::new();
        for (position, param) in event.inputs.iter().enumerate() {
            let value = if param.indexed {
                indexed.next()
            } else {
                body.next()
            }
            .ok_or_else(|| decode_err(format!("missing value for parameter {position}")))?;

            let key = if param.name.is_empty() {
                position.to_string()
            } else {
                param.name.clone()
            };
            out.insert(key, to_json(value));
        }
        Ok(Value::Object(out))
    }
}

/// Addresses and byte strings become lowercase `0x` hex; integers become
/// decimal strings so nothing is lost above 2^53.
pub fn to_json(value: DynSolValue) -> Value {
    match value {
        DynSolValue::Bool(b) => Value::Bool(b),
        DynSolValue::Int(i, _) => Value::String(i.to_string()),
        DynSolValue::Uint(u, _) => Value::String(u.to_string()),
        DynSolValue::FixedBytes(word, size) => Value::String(hex::encode_prefixed(&word[..size])),
        DynSolValue::Bytes(b) => Value::String(hex::encode_prefixed(b)),
        DynSolValue::String(s) => Value::String(s),
        DynSolValue::Address(a) => Value::String(format!("{a:#x}")),
        DynSolValue::Function(f) => Value::String(hex::encode_prefixed(f.as_slice())),
        DynSolValue::Array(vals) | DynSolValue::FixedArray(vals) | DynSolValue::Tuple(vals) => {
            Value::Array(vals.into_iter().map(to_json).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{keccak256, Address, U256};
    use serde_json::json;

    fn token() -> Address {
        Address::repeat_byte(0xAB)
    }

    #[test]
    fn defaults_cover_launch_events() {
        let abi = EventAbi::launch_defaults().unwrap();
        for name in [LAUNCH_CREATED, CONTRIBUTION_MADE, GRADUATED, PROOF_VERIFIED] {
            assert!(abi.contains(name), "{name}");
        }
        assert_eq!(
            abi.selector(LAUNCH_CREATED).unwrap(),
            keccak256("LaunchCreated(address,address,string,string,uint256)")
        );
    }

    #[test]
    fn every_default_signature_parses() {
        let abi = EventAbi::launch_defaults().unwrap();
        assert_eq!(abi.signatures().len(), DEFAULT_SIGNATURES.len());
    }

    #[test]
    fn rejects_mismatched_name() {
        let err = EventAbi::from_signatures([(
            "Graduated",
            "event Launched(address indexed tokenAddress)",
        )])
        .unwrap_err();
        assert!(matches!(err, IndexerError::Config(_)));
    }

    #[test]
    fn rejects_unparseable_signature() {
        let err = EventAbi::from_signatures([("Broken", "event Broken(uint256")]).unwrap_err();
        assert!(matches!(err, IndexerError::Config(_)));
    }

    #[test]
    fn decodes_indexed_and_body_params() {
        let abi = EventAbi::launch_defaults().unwrap();
        let creator = Address::repeat_byte(0x01);
        let topics = [
            abi.selector(LAUNCH_CREATED).unwrap(),
            token().into_word(),
            creator.into_word(),
        ];
        let data = DynSolValue::Tuple(vec![
            DynSolValue::String("Shadow".into()),
            DynSolValue::String("SHD".into()),
            DynSolValue::Uint(U256::from(10u64).pow(U256::from(24u64)), 256),
        ])
        .abi_encode_params();

        let value = abi.decode(LAUNCH_CREATED, &topics, &data).unwrap();
        assert_eq!(
            value,
            json!({
                "tokenAddress": "0xabababababababababababababababababababab",
                "creator": "0x0101010101010101010101010101010101010101",
                "name": "Shadow",
                "symbol": "SHD",
                "totalSupply": "1000000000000000000000000"
            })
        );
    }

    #[test]
    fn decodes_bytes32_and_bool() {
        let abi = EventAbi::launch_defaults().unwrap();
        let proof = B256::repeat_byte(0x0f);
        let topics = [
            abi.selector(PROOF_VERIFIED).unwrap(),
            proof,
            token().into_word(),
        ];
        let data = DynSolValue::Tuple(vec![
            DynSolValue::Bool(true),
            DynSolValue::Uint(U256::from(210_000u64), 256),
        ])
        .abi_encode_params();

        let value = abi.decode(PROOF_VERIFIED, &topics, &data).unwrap();
        assert_eq!(value["proofHash"], format!("0x{}", "0f".repeat(32)));
        assert_eq!(value["verified"], true);
        assert_eq!(value["gasUsed"], "210000");
    }

    #[test]
    fn wrong_topic_count_is_a_decode_error() {
        let abi = EventAbi::launch_defaults().unwrap();
        let topics = [abi.selector(GRADUATED).unwrap()];
        let err = abi.decode(GRADUATED, &topics, &[]).unwrap_err();
        assert!(matches!(err, IndexerError::Decode { .. }));
    }
}
