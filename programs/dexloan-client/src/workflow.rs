use std::sync::Arc;
use anchor_lang::prelude::Pubkey;
use anchor_lang::solana_program::instruction::Instruction;
use async_trait::async_trait;
use parking_lot::Mutex;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::transaction::Transaction;
use tracing::{error, info, instrument};
use crate::client::{DexloanClient, QueryKey};
use crate::error::{PreconditionError, Result, TransportError};
use crate::instructions::{init_listing, ListingOptions};
use crate::state::NftResult;
use crate::utils::{months_to_seconds, rate_to_basis_points, sol_to_lamports};

/// Signs, sends and confirms transactions for one wallet
#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
    fn pubkey(&self) -> Pubkey;

    async fn submit(&self, instructions: Vec<Instruction>) -> std::result::Result<Signature, TransportError>;
}

/// Submits with a local keypair as fee payer and sole signer
pub struct RpcSubmitter {
    rpc: Arc<RpcClient>,
    payer: Keypair,
}

impl RpcSubmitter {
    pub fn new(rpc: Arc<RpcClient>, payer: Keypair) -> Self {
        Self { rpc, payer }
    }
}

#[async_trait]
impl TransactionSubmitter for RpcSubmitter {
    fn pubkey(&self) -> Pubkey {
        self.payer.pubkey()
    }

    #[instrument(skip_all, fields(payer = %self.payer.pubkey(), instructions = instructions.len()))]
    async fn submit(&self, instructions: Vec<Instruction>) -> std::result::Result<Signature, TransportError> {
        let blockhash = self.rpc.get_latest_blockhash().await?;
        let transaction = Transaction::new_signed_with_payer(
            &instructions,
            Some(&self.payer.pubkey()),
            &[&self.payer],
            blockhash,
        );

        let signature = self.rpc.send_and_confirm_transaction(&transaction).await?;

        Ok(signature)
    }
}

/// Loan terms as entered by the user
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ListingTerms {
    /// Principal in SOL
    pub amount_sol: f64,
    /// Annual rate, 0.1 for 10%
    pub apy: f64,
    pub duration_months: u32,
}

impl ListingTerms {
    /// Converts to lamports, basis points and seconds (30-day months)
    pub fn to_options(&self) -> std::result::Result<ListingOptions, PreconditionError> {
        let amount = sol_to_lamports(self.amount_sol).ok_or(PreconditionError::InvalidAmount(self.amount_sol))?;
        let basis_points = rate_to_basis_points(self.apy).ok_or(PreconditionError::InvalidRate(self.apy))?;

        if self.duration_months == 0 {
            return Err(PreconditionError::InvalidDuration(self.duration_months));
        }

        Ok(ListingOptions {
            amount,
            duration: months_to_seconds(self.duration_months),
            basis_points,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    Submitting,
    Settled,
    Failed,
}

/// How the most recent submission ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkflowOutcome {
    Settled { mint: Pubkey, signature: Signature },
    Failed { mint: Pubkey, message: String },
}

/// Puts an owned NFT up as collateral for a new listing
pub struct CreateListingWorkflow {
    client: DexloanClient,
    state: Mutex<WorkflowState>,
    last_outcome: Mutex<Option<WorkflowOutcome>>,
}

impl CreateListingWorkflow {
    pub fn new(client: DexloanClient) -> Self {
        Self {
            client,
            state: Mutex::new(WorkflowState::Idle),
            last_outcome: Mutex::new(None),
        }
    }

    pub fn state(&self) -> WorkflowState {
        *self.state.lock()
    }

    pub fn last_outcome(&self) -> Option<WorkflowOutcome> {
        self.last_outcome.lock().clone()
    }

    /// Submits `init_listing` for `nft`. Preconditions are checked before
    /// anything is sent or cached state touched. On success the NFT leaves
    /// the signer's owned NFTs and listing queries go stale. The workflow is
    /// idle again once this returns or is dropped, whatever the outcome.
    /// Only one submission runs at a time.
    #[instrument(skip_all, fields(mint = ?nft.map(|nft| nft.mint)))]
    pub async fn submit(
        &self,
        signer: Option<&dyn TransactionSubmitter>,
        nft: Option<&NftResult>,
        terms: &ListingTerms,
    ) -> Result<Signature> {
        let signer = signer.ok_or(PreconditionError::SignerMissing)?;
        let nft = nft
            .filter(|nft| nft.mint != Pubkey::default() && nft.token_account != Pubkey::default())
            .ok_or(PreconditionError::NftMissing)?;
        let options = terms.to_options()?;

        let borrower = signer.pubkey();
        let instruction = init_listing(
            self.client.program_id(),
            &borrower,
            &nft.token_account,
            &nft.mint,
            options,
        )?;

        let _submission = Submission::begin(&self.state)?;

        let result = signer.submit(vec![instruction]).await;

        let outcome = match result {
            Ok(signature) => {
                self.set_state(WorkflowState::Settled);
                info!(%signature, amount = options.amount, "listing created");

                let token_account = nft.token_account;
                let key = QueryKey::wallet_nfts(&borrower);
                let was_fetching = self.client.nft_cache().is_fetching(&key);
                let mutated = self.client.nft_cache().mutate(&key, |nfts| {
                    nfts.iter()
                        .filter(|owned| owned.token_account != token_account)
                        .cloned()
                        .collect()
                });
                if !mutated && was_fetching {
                    // the disowned fetch read the wallet before the escrow transfer
                    self.client.query_owned_nfts(Some(&borrower));
                }
                self.client.invalidate_listings();

                *self.last_outcome.lock() = Some(WorkflowOutcome::Settled {
                    mint: nft.mint,
                    signature,
                });
                Ok(signature)
            }
            Err(err) => {
                self.set_state(WorkflowState::Failed);
                error!(error = %err, "listing failed");

                *self.last_outcome.lock() = Some(WorkflowOutcome::Failed {
                    mint: nft.mint,
                    message: err.to_string(),
                });
                Err(err.into())
            }
        };

        outcome
    }

    fn set_state(&self, state: WorkflowState) {
        *self.state.lock() = state;
    }
}

/// Holds the workflow in `Submitting` and returns it to `Idle` when dropped,
/// including when the submitting future is cancelled
struct Submission<'a> {
    state: &'a Mutex<WorkflowState>,
}

impl<'a> Submission<'a> {
    fn begin(state: &'a Mutex<WorkflowState>) -> std::result::Result<Self, PreconditionError> {
        let mut current = state.lock();
        if *current == WorkflowState::Submitting {
            return Err(PreconditionError::SubmissionInProgress);
        }
        *current = WorkflowState::Submitting;

        Ok(Self { state })
    }
}

impl Drop for Submission<'_> {
    fn drop(&mut self) {
        *self.state.lock() = WorkflowState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_terms_to_program_units() {
        let terms = ListingTerms {
            amount_sol: 1.5,
            apy: 0.10,
            duration_months: 3,
        };

        assert_eq!(
            terms.to_options().unwrap(),
            ListingOptions {
                amount: 1_500_000_000,
                duration: 7_776_000,
                basis_points: 1_000,
            }
        );
    }

    #[test]
    fn rejects_unusable_terms() {
        let valid = ListingTerms {
            amount_sol: 2.0,
            apy: 0.5,
            duration_months: 1,
        };

        assert_eq!(
            ListingTerms { amount_sol: 0.0, ..valid }.to_options(),
            Err(PreconditionError::InvalidAmount(0.0))
        );
        assert_eq!(
            ListingTerms { apy: -0.1, ..valid }.to_options(),
            Err(PreconditionError::InvalidRate(-0.1))
        );
        assert_eq!(
            ListingTerms { duration_months: 0, ..valid }.to_options(),
            Err(PreconditionError::InvalidDuration(0))
        );
    }
}
