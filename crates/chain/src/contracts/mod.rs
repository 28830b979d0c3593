//! Contract bindings for the lending protocol.
//!
//! The protocol is a single-collateral, single-borrow-asset pool: collateral
//! is deposited, the borrow asset is lent out at a fixed per-second rate and
//! positions whose health factor drops below 1.0 can be liquidated with a
//! bonus. Interfaces are declared inline with `sol!` so calls, custom errors
//! and events are all type-checked.

mod common;

pub use common::{IAggregatorV3, IERC20};

use alloy::sol;

sol! {
    /// Lending protocol surface used by the client.
    #[sol(rpc)]
    #[derive(Debug)]
    interface ILendingProtocol {
        // Writes
        function depositCollateral(uint256 amount) external;
        function withdrawCollateral(uint256 amount) external;
        function borrow(uint256 amount) external;
        function repay(uint256 amount) external;
        function liquidate(address user, uint256 debtToCover) external;

        // Per-account reads
        function userToCollateralDeposited(address user) external view returns (uint256);
        function userToAmountBorrowed(address user) external view returns (uint256);
        function lastAccrued(address user) external view returns (uint256);
        function getHealthFactor(address user) external view returns (uint256);

        // Protocol-wide reads
        function totalBorrowed() external view returns (uint256);
        function priceFeed() external view returns (address);
        function borrowPriceFeed() external view returns (address);
        function collateralToken() external view returns (address);
        function borrowToken() external view returns (address);

        // Protocol constants
        function BORROW_RATE_PER_SECOND() external view returns (uint256);
        function LIQUIDATION_BONUS() external view returns (uint256);
        function LIQUIDATION_THRESHOLD() external view returns (uint256);
        function MAX_PRICE_AGE() external view returns (uint256);
        function PRECISION() external view returns (uint256);
        function SECONDS_PER_YEAR() external view returns (uint256);

        // Custom errors
        error LENDINGPROTOCOL__amountMoreThanAllowed();
        error LENDINGPROTOCOL__cantWithdrawMoreThanDeposited();
        error LENDINGPROTOCOL__insufficientLiquidity();
        error LENDINGPROTOCOL__oracleError();
        error LENDINGPROTOCOL__userHasNoDebt();
        error LENDINGPROTOCOL__userHasZeroCollateral();
        error LENDINGPROTOCOL__valueMustBeMoreThanZero();
        error ReentrancyGuardReentrantCall();

        // Events
        event userAddedCollateral(address indexed user, uint256 collateralAmount);
        event userBorrowedToken(address indexed user, uint256 borrowAmount);
        event userRepaidDebt(address indexed user, uint256 repaidAmount);
    }
}
