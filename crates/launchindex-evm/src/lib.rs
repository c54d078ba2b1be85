//! launchindex-evm: reads launch contract events from an EVM JSON-RPC node.
//!
//! ```text
//! EvmEventSource ── eth_blockNumber / eth_getLogs ──▶ RpcTransport (HTTP)
//!        └── EventAbi (alloy) ── topics + data ──▶ JSON payload
//! ```

pub mod abi;
pub mod source;
pub mod transport;

pub use abi::{EventAbi, DEFAULT_SIGNATURES};
pub use source::{EvmEventSource, RawLog};
pub use transport::{HttpTransport, RpcTransport, TransportError};
