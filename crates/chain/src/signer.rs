//! Local private-key wallet.
//!
//! Nonces are tracked locally so back-to-back steps of a compound operation
//! (approve then deposit) do not race the node's pending-count.
//!
//! A receipt carries no revert reason, so a failed transaction is replayed
//! with `eth_call` at its block to recover one.

use crate::ledger::{Confirmation, ContractSet, LedgerCall, LedgerError, WalletProvider};
use crate::provider::trial_call;
use alloy::eips::BlockId;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, B256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Interval between receipt polls while waiting for confirmation.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Cached nonce counter.
pub struct NonceManager {
    current: AtomicU64,
}

impl NonceManager {
    pub fn new(initial_nonce: u64) -> Self {
        Self {
            current: AtomicU64::new(initial_nonce),
        }
    }

    /// Get next nonce and increment counter.
    #[inline]
    pub fn next(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst)
    }

    #[inline]
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    /// Force the chain's count (after a submission failure).
    pub fn reset(&self, chain_nonce: u64) {
        self.current.store(chain_nonce, Ordering::SeqCst);
    }
}

/// Wallet backed by a local private key and an HTTP endpoint.
pub struct LocalWallet {
    rpc_url: Url,
    wallet: EthereumWallet,
    address: Address,
    contracts: ContractSet,
    nonce_manager: NonceManager,
    /// Submitted calls awaiting their receipt, kept for revert replay
    in_flight: DashMap<B256, LedgerCall>,
}

impl LocalWallet {
    /// Build from a hex private key (with or without `0x`), fetching the starting nonce.
    pub async fn new(
        private_key: &str,
        rpc_url: &str,
        contracts: ContractSet,
    ) -> anyhow::Result<Self> {
        let signer: PrivateKeySigner = private_key.trim_start_matches("0x").parse()?;
        let address = signer.address();
        let wallet = EthereumWallet::from(signer);

        let rpc_url: Url = rpc_url.parse()?;
        let provider = ProviderBuilder::new().on_http(rpc_url.clone());
        let initial_nonce = provider.get_transaction_count(address).await?;

        info!(address = %address, initial_nonce, "Local wallet initialized");

        Ok(Self {
            rpc_url,
            wallet,
            address,
            contracts,
            nonce_manager: NonceManager::new(initial_nonce),
            in_flight: DashMap::new(),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Re-read the nonce from chain after a failed submission.
    async fn sync_nonce(&self) {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.clone());
        match provider.get_transaction_count(self.address).await {
            Ok(chain_nonce) => {
                self.nonce_manager.reset(chain_nonce);
                debug!(nonce = chain_nonce, "Nonce synced from chain");
            }
            Err(e) => warn!(error = %e, "Failed to sync nonce from chain"),
        }
    }

    /// Replay a failed call at the block it was mined in.
    async fn replay<P: Provider>(
        &self,
        provider: &P,
        tx_hash: B256,
        block_number: u64,
    ) -> Result<(), LedgerError> {
        let Some((_, call)) = self.in_flight.remove(&tx_hash) else {
            return Ok(());
        };
        trial_call(
            provider,
            &self.contracts,
            self.address,
            &call,
            BlockId::number(block_number),
        )
        .await
    }
}

/// Failure to report for a mined transaction with a failed status, given the
/// outcome of replaying it. Only a replay that reverts explains the failure.
fn receipt_failure(tx_hash: B256, replay: Result<(), LedgerError>) -> LedgerError {
    match replay {
        Err(err @ LedgerError::Reverted { .. }) => err,
        Err(err) => {
            debug!(tx_hash = %tx_hash, error = %err, "Revert replay failed");
            LedgerError::FailedReceipt(tx_hash)
        }
        Ok(()) => LedgerError::FailedReceipt(tx_hash),
    }
}

#[async_trait]
impl WalletProvider for LocalWallet {
    async fn connect(&self) -> Result<Address, LedgerError> {
        Ok(self.address)
    }

    async fn sign_and_submit(&self, call: &LedgerCall) -> Result<B256, LedgerError> {
        let to = call.target(&self.contracts);
        let nonce = self.nonce_manager.next();

        // Gas and fees are left to the provider's fillers.
        let tx = TransactionRequest::default()
            .with_from(self.address)
            .with_to(to)
            .with_input(call.calldata(&self.contracts))
            .with_nonce(nonce);

        info!(call = call.name(), to = %to, nonce, "Sending transaction");

        let provider = ProviderBuilder::new()
            .wallet(self.wallet.clone())
            .on_http(self.rpc_url.clone());

        match provider.send_transaction(tx).await {
            Ok(pending) => {
                let tx_hash = *pending.tx_hash();
                info!(tx_hash = %tx_hash, call = call.name(), "Transaction submitted");
                self.in_flight.insert(tx_hash, call.clone());
                Ok(tx_hash)
            }
            Err(e) => {
                warn!(error = %e, call = call.name(), "Submission failed, syncing nonce");
                self.sync_nonce().await;
                Err(LedgerError::from(e))
            }
        }
    }

    async fn wait_for_confirmation(&self, tx_hash: B256) -> Result<Confirmation, LedgerError> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.clone());

        // No upper bound: the transaction is out of our hands once broadcast.
        loop {
            if let Some(receipt) = provider.get_transaction_receipt(tx_hash).await? {
                let block_number = receipt.block_number.unwrap_or_default();
                if receipt.status() {
                    self.in_flight.remove(&tx_hash);
                    info!(
                        tx_hash = %tx_hash,
                        block = block_number,
                        gas_used = receipt.gas_used,
                        "Transaction confirmed"
                    );
                    return Ok(Confirmation {
                        tx_hash,
                        block_number,
                    });
                }
                let replay = self.replay(&provider, tx_hash, block_number).await;
                let err = receipt_failure(tx_hash, replay);
                warn!(tx_hash = %tx_hash, block = block_number, error = %err, "Transaction reverted");
                return Err(err);
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }
}

impl std::fmt::Debug for LocalWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalWallet")
            .field("address", &self.address)
            .field("rpc_url", &self.rpc_url.as_str())
            .finish_non_exhaustive()
    }
}
