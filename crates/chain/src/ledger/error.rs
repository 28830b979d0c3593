//! Low-level ledger failure signals.

use alloy::primitives::{Bytes, B256};
use alloy::transports::TransportError;
use thiserror::Error;

/// JSON-RPC error code wallets use when the user declines a request (EIP-1193).
pub const USER_REJECTED_CODE: i64 = 4001;

/// JSON-RPC error code nodes use for a reverted `eth_call` / `eth_estimateGas`.
pub const EXECUTION_REVERTED_CODE: i64 = 3;

/// Failure signal from the ledger or the wallet.
///
/// This is deliberately undecoded: revert data is carried as raw bytes so the
/// domain layer can map it onto its own taxonomy.
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    /// Node or wallet unreachable, or the request itself failed in transport
    #[error("transport error: {0}")]
    Transport(String),

    /// Execution reverted; `data` holds the ABI-encoded reason when the node returned one
    #[error("execution reverted: {message}")]
    Reverted { data: Option<Bytes>, message: String },

    /// Transaction was mined with a failed status
    #[error("transaction {0} reverted on-chain")]
    FailedReceipt(B256),

    /// Signing was declined
    #[error("user rejected the request")]
    UserRejected,
}

impl LedgerError {
    /// Raw revert payload, if this is a revert that carried one.
    pub fn revert_data(&self) -> Option<&Bytes> {
        match self {
            Self::Reverted { data, .. } => data.as_ref(),
            _ => None,
        }
    }

    /// Whether this failure is a connectivity problem rather than a ledger answer.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Classification uses the error code and structured revert data only.
/// Free-text messages differ between node and wallet implementations and
/// are kept for display, never matched on.
impl From<TransportError> for LedgerError {
    fn from(err: TransportError) -> Self {
        if let Some(payload) = err.as_error_resp() {
            if payload.code == USER_REJECTED_CODE {
                return Self::UserRejected;
            }
            let data = payload.as_revert_data();
            if data.is_some() || payload.code == EXECUTION_REVERTED_CODE {
                return Self::Reverted {
                    data,
                    message: payload.message.to_string(),
                };
            }
        }
        Self::Transport(err.to_string())
    }
}

impl From<alloy::contract::Error> for LedgerError {
    fn from(err: alloy::contract::Error) -> Self {
        match err {
            alloy::contract::Error::TransportError(e) => Self::from(e),
            other => Self::Transport(other.to_string()),
        }
    }
}
