//! Domain error taxonomy and the ledger failure decoder.
//!
//! Every failure an intent or a poll can hit is reported as an [`ErrorKind`].
//! Ledger failures are decoded structurally: the 4-byte selector of the
//! revert payload is matched against a fixed table of known custom errors;
//! anything not in the table is `UnknownRevert` with the raw reason kept.

use alloy::hex;
use alloy::primitives::U256;
use alloy::sol_types::{decode_revert_reason, SolError};
use lendwatch_chain::{FeedId, ILendingProtocol, LedgerError, IERC20};
use thiserror::Error;

/// Failure kinds surfaced to callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    /// Wallet or ledger unreachable
    #[error("connection error: {0}")]
    Connection(String),

    #[error("oracle {feed} is stale ({age_secs}s old, max {max_age_secs}s)")]
    OracleStale {
        feed: FeedId,
        age_secs: u64,
        max_age_secs: u64,
    },

    /// Non-positive answer; the feed is unknown when the ledger reported it
    #[error("oracle reading invalid for {}", feed_label(.feed))]
    OracleInvalid { feed: Option<FeedId> },

    #[error("insufficient collateral on record")]
    InsufficientCollateral,

    #[error("insufficient protocol liquidity")]
    InsufficientLiquidity,

    /// The operation would leave (or fail to bring) a health factor below the bound
    #[error("health factor violation")]
    HealthFactorViolation,

    #[error("account has no debt")]
    NoDebt,

    #[error("account has no collateral")]
    NoCollateral,

    #[error("user rejected the request")]
    UserRejected,

    #[error("unknown revert: {raw}")]
    UnknownRevert { raw: String },

    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("insufficient wallet balance (required {required}, available {available})")]
    InsufficientBalance { required: U256, available: U256 },
}

fn feed_label(feed: &Option<FeedId>) -> &'static str {
    feed.map(|f| f.as_str()).unwrap_or("unknown feed")
}

impl ErrorKind {
    /// Whether retrying the same intent unchanged can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::OracleStale { .. })
    }
}

impl From<LedgerError> for ErrorKind {
    fn from(err: LedgerError) -> Self {
        decode(&err)
    }
}

/// Map a ledger failure signal onto the taxonomy.
pub fn decode(err: &LedgerError) -> ErrorKind {
    match err {
        LedgerError::Transport(msg) => ErrorKind::Connection(msg.clone()),
        LedgerError::UserRejected => ErrorKind::UserRejected,
        LedgerError::Reverted {
            data: Some(data), ..
        } => decode_revert_data(data),
        LedgerError::Reverted { data: None, message } => ErrorKind::UnknownRevert {
            raw: message.clone(),
        },
        LedgerError::FailedReceipt(hash) => ErrorKind::UnknownRevert {
            raw: format!("transaction {hash} reverted"),
        },
    }
}

/// Decode an ABI-encoded revert payload.
pub fn decode_revert_data(data: &[u8]) -> ErrorKind {
    let Some(selector) = data.get(..4) else {
        return unknown(data);
    };

    match selector {
        s if s == ILendingProtocol::LENDINGPROTOCOL__valueMustBeMoreThanZero::SELECTOR => {
            ErrorKind::InvalidAmount
        }
        s if s == ILendingProtocol::LENDINGPROTOCOL__cantWithdrawMoreThanDeposited::SELECTOR => {
            ErrorKind::InsufficientCollateral
        }
        s if s == ILendingProtocol::LENDINGPROTOCOL__insufficientLiquidity::SELECTOR => {
            ErrorKind::InsufficientLiquidity
        }
        s if s == ILendingProtocol::LENDINGPROTOCOL__amountMoreThanAllowed::SELECTOR => {
            ErrorKind::HealthFactorViolation
        }
        s if s == ILendingProtocol::LENDINGPROTOCOL__userHasNoDebt::SELECTOR => ErrorKind::NoDebt,
        s if s == ILendingProtocol::LENDINGPROTOCOL__userHasZeroCollateral::SELECTOR => {
            ErrorKind::NoCollateral
        }
        s if s == ILendingProtocol::LENDINGPROTOCOL__oracleError::SELECTOR => {
            ErrorKind::OracleInvalid { feed: None }
        }
        s if s == IERC20::ERC20InsufficientBalance::SELECTOR => {
            match IERC20::ERC20InsufficientBalance::abi_decode(data, true) {
                Ok(e) => ErrorKind::InsufficientBalance {
                    required: e.needed,
                    available: e.balance,
                },
                Err(_) => unknown(data),
            }
        }
        _ => unknown(data),
    }
}

fn unknown(data: &[u8]) -> ErrorKind {
    let raw = decode_revert_reason(data).unwrap_or_else(|| hex::encode_prefixed(data));
    ErrorKind::UnknownRevert { raw }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, Bytes};
    use alloy::sol_types::Revert;

    fn reverted<E: SolError>(err: E) -> LedgerError {
        LedgerError::Reverted {
            data: Some(Bytes::from(err.abi_encode())),
            message: "execution reverted".to_string(),
        }
    }

    #[test]
    fn test_protocol_errors() {
        use ILendingProtocol::*;
        assert_eq!(
            decode(&reverted(LENDINGPROTOCOL__valueMustBeMoreThanZero {})),
            ErrorKind::InvalidAmount
        );
        assert_eq!(
            decode(&reverted(LENDINGPROTOCOL__cantWithdrawMoreThanDeposited {})),
            ErrorKind::InsufficientCollateral
        );
        assert_eq!(
            decode(&reverted(LENDINGPROTOCOL__insufficientLiquidity {})),
            ErrorKind::InsufficientLiquidity
        );
        assert_eq!(
            decode(&reverted(LENDINGPROTOCOL__amountMoreThanAllowed {})),
            ErrorKind::HealthFactorViolation
        );
        assert_eq!(decode(&reverted(LENDINGPROTOCOL__userHasNoDebt {})), ErrorKind::NoDebt);
        assert_eq!(
            decode(&reverted(LENDINGPROTOCOL__userHasZeroCollateral {})),
            ErrorKind::NoCollateral
        );
        assert_eq!(
            decode(&reverted(LENDINGPROTOCOL__oracleError {})),
            ErrorKind::OracleInvalid { feed: None }
        );
    }

    #[test]
    fn test_erc20_balance_error_carries_amounts() {
        let err = reverted(IERC20::ERC20InsufficientBalance {
            sender: Address::repeat_byte(0x42),
            balance: U256::from(5u64),
            needed: U256::from(9u64),
        });
        assert_eq!(
            decode(&err),
            ErrorKind::InsufficientBalance {
                required: U256::from(9u64),
                available: U256::from(5u64),
            }
        );
    }

    #[test]
    fn test_unmatched_is_unknown_with_raw_reason() {
        let err = reverted(Revert::from("Ownable: caller is not the owner"));
        match decode(&err) {
            ErrorKind::UnknownRevert { raw } => {
                assert!(raw.contains("Ownable: caller is not the owner"))
            }
            other => panic!("unexpected {other:?}"),
        }

        // the reentrancy guard is a known signature but maps to nothing specific
        let err = reverted(ILendingProtocol::ReentrancyGuardReentrantCall {});
        assert!(matches!(decode(&err), ErrorKind::UnknownRevert { .. }));

        let kind = decode_revert_data(&[0xff, 0xfe]);
        assert_eq!(kind, ErrorKind::UnknownRevert { raw: "0xfffe".to_string() });
    }

    #[test]
    fn test_signals_without_revert_data() {
        assert_eq!(decode(&LedgerError::UserRejected), ErrorKind::UserRejected);
        assert!(matches!(
            decode(&LedgerError::Transport("connection refused".into())),
            ErrorKind::Connection(_)
        ));
        assert_eq!(
            decode(&LedgerError::Reverted {
                data: None,
                message: "execution reverted".into()
            }),
            ErrorKind::UnknownRevert {
                raw: "execution reverted".into()
            }
        );
    }
}
