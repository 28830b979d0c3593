//! Common contract interfaces shared by the lending protocol client.
//!
//! ERC20 for the collateral and borrow tokens, and the Chainlink
//! AggregatorV3 interface the protocol's price feeds implement.

use alloy::sol;

// ERC20 interface for token interactions
sol! {
    /// Standard ERC20 interface (subset used by deposits, repayments and liquidations)
    #[sol(rpc)]
    #[derive(Debug)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function decimals() external view returns (uint8);

        error ERC20InsufficientBalance(address sender, uint256 balance, uint256 needed);
        error ERC20InsufficientAllowance(address spender, uint256 allowance, uint256 needed);
    }
}

// Chainlink aggregator interface for oracle reads
sol! {
    /// Chainlink-compatible AggregatorV3 interface
    #[sol(rpc)]
    #[derive(Debug)]
    interface IAggregatorV3 {
        function latestRoundData() external view returns (
            uint80 roundId,
            int256 answer,
            uint256 startedAt,
            uint256 updatedAt,
            uint80 answeredInRound
        );
        function decimals() external view returns (uint8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, U256};
    use alloy::sol_types::{SolCall, SolError};

    #[test]
    fn test_erc20_selectors() {
        // approve(address,uint256): 095ea7b3
        assert_eq!(alloy::hex::encode(IERC20::approveCall::SELECTOR), "095ea7b3");
        // balanceOf(address): 70a08231
        assert_eq!(alloy::hex::encode(IERC20::balanceOfCall::SELECTOR), "70a08231");
    }

    #[test]
    fn test_erc20_error_encoding() {
        let err = IERC20::ERC20InsufficientBalance {
            sender: Address::ZERO,
            balance: U256::from(1u64),
            needed: U256::from(2u64),
        };
        let encoded = err.abi_encode();
        assert_eq!(&encoded[..4], &IERC20::ERC20InsufficientBalance::SELECTOR);
    }
}
