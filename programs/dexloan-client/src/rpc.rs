use anchor_lang::prelude::Pubkey;
use async_trait::async_trait;
use solana_account_decoder::UiAccountEncoding;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcAccountInfoConfig, RpcProgramAccountsConfig};
use solana_client::rpc_filter::{Memcmp, RpcFilterType};
use solana_sdk::commitment_config::CommitmentConfig;
use tracing::{debug, instrument, warn};
use crate::constants::{TOKEN_ACCOUNT_LEN, TOKEN_ACCOUNT_OWNER_OFFSET};
use crate::error::TransportError;
use crate::filters::MemcmpFilter;
use crate::state::*;

/// `getMultipleAccounts` accepts at most this many keys
const MAX_MULTIPLE_ACCOUNTS: usize = 100;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccountFilter {
    DataSize(u64),
    Memcmp(MemcmpFilter),
}

impl AccountFilter {
    pub fn matches(&self, data: &[u8]) -> bool {
        match self {
            AccountFilter::DataSize(size) => data.len() as u64 == *size,
            AccountFilter::Memcmp(filter) => filter.matches(data),
        }
    }
}

impl From<MemcmpFilter> for AccountFilter {
    fn from(filter: MemcmpFilter) -> Self {
        AccountFilter::Memcmp(filter)
    }
}

impl From<&AccountFilter> for RpcFilterType {
    fn from(filter: &AccountFilter) -> Self {
        match filter {
            AccountFilter::DataSize(size) => RpcFilterType::DataSize(*size),
            AccountFilter::Memcmp(filter) => {
                RpcFilterType::Memcmp(Memcmp::new_base58_encoded(filter.offset, &filter.bytes))
            }
        }
    }
}

/// `getProgramAccounts` parameters: the filters as sent to the node, base64 data
fn program_accounts_config(filters: &[AccountFilter], commitment: CommitmentConfig) -> RpcProgramAccountsConfig {
    RpcProgramAccountsConfig {
        filters: Some(filters.iter().map(RpcFilterType::from).collect()),
        account_config: RpcAccountInfoConfig {
            encoding: Some(UiAccountEncoding::Base64),
            commitment: Some(commitment),
            ..RpcAccountInfoConfig::default()
        },
        ..RpcProgramAccountsConfig::default()
    }
}

/// Raw account data paired with its address
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyedAccount {
    pub pubkey: Pubkey,
    pub data: Vec<u8>,
}

/// Read side of the ledger RPC. Implementations do not retry.
#[async_trait]
pub trait AccountSource: Send + Sync {
    async fn get_program_accounts(
        &self,
        program_id: &Pubkey,
        filters: &[AccountFilter],
    ) -> Result<Vec<KeyedAccount>, TransportError>;

    /// One entry per key, `None` where no account exists
    async fn get_multiple_accounts(
        &self,
        pubkeys: &[Pubkey],
    ) -> Result<Vec<Option<Vec<u8>>>, TransportError>;
}

#[async_trait]
impl AccountSource for RpcClient {
    async fn get_program_accounts(
        &self,
        program_id: &Pubkey,
        filters: &[AccountFilter],
    ) -> Result<Vec<KeyedAccount>, TransportError> {
        let config = program_accounts_config(filters, self.commitment());
        let accounts = self.get_program_accounts_with_config(program_id, config).await?;

        Ok(accounts
            .into_iter()
            .map(|(pubkey, account)| KeyedAccount {
                pubkey,
                data: account.data,
            })
            .collect())
    }

    async fn get_multiple_accounts(
        &self,
        pubkeys: &[Pubkey],
    ) -> Result<Vec<Option<Vec<u8>>>, TransportError> {
        let mut accounts = Vec::with_capacity(pubkeys.len());

        for chunk in pubkeys.chunks(MAX_MULTIPLE_ACCOUNTS) {
            let chunk_accounts = RpcClient::get_multiple_accounts(self, chunk).await?;
            accounts.extend(chunk_accounts.into_iter().map(|account| account.map(|account| account.data)));
        }

        Ok(accounts)
    }
}

/// Fetches and decodes every listing matching `filters`.
///
/// A record that decodes badly is logged and skipped. A record the node
/// could not have matched (too short for the filtered ranges, or differing
/// bytes) means the response itself is broken and fails the whole query.
#[instrument(skip_all, fields(program = %program_id, filters = filters.len()))]
pub async fn fetch_listings(
    source: &dyn AccountSource,
    program_id: &Pubkey,
    filters: &[MemcmpFilter],
    discriminator: &ListingDiscriminator,
) -> Result<Vec<ListingAccount>, TransportError> {
    let account_filters: Vec<AccountFilter> = filters.iter().cloned().map(AccountFilter::from).collect();
    let accounts = source.get_program_accounts(program_id, &account_filters).await?;
    let covered = filters.iter().map(MemcmpFilter::end).max().unwrap_or(0);

    let mut listings = Vec::with_capacity(accounts.len());

    for account in accounts {
        if account.data.len() < covered {
            return Err(TransportError::MalformedResponse {
                pubkey: account.pubkey,
                reason: format!("{} bytes cannot cover filtered range ending at {}", account.data.len(), covered),
            });
        }

        if !filters.iter().all(|filter| filter.matches(&account.data)) {
            return Err(TransportError::MalformedResponse {
                pubkey: account.pubkey,
                reason: "account does not match requested filters".to_string(),
            });
        }

        match Listing::decode(&account.data, discriminator) {
            Ok(listing) => listings.push(ListingAccount {
                pubkey: account.pubkey,
                listing,
            }),
            Err(err) => warn!(pubkey = %account.pubkey, error = %err, "skipping undecodable listing"),
        }
    }

    debug!(count = listings.len(), "fetched listings");

    Ok(listings)
}

/// NFTs held by `owner`: token accounts with an amount of one that have a
/// metadata account for their mint.
#[instrument(skip_all, fields(owner = %owner))]
pub async fn fetch_owned_nfts(
    source: &dyn AccountSource,
    owner: &Pubkey,
) -> Result<Vec<NftResult>, TransportError> {
    let filters = [
        AccountFilter::DataSize(TOKEN_ACCOUNT_LEN),
        AccountFilter::Memcmp(MemcmpFilter::new(TOKEN_ACCOUNT_OWNER_OFFSET, owner.to_bytes().to_vec())),
    ];
    let accounts = source.get_program_accounts(&anchor_spl::token::ID, &filters).await?;

    let holdings: Vec<(Pubkey, TokenHolding)> = accounts
        .into_iter()
        .filter_map(|account| match TokenHolding::decode(&account.data) {
            Ok(holding) if holding.is_nft() => Some((account.pubkey, holding)),
            Ok(_) => None,
            Err(err) => {
                warn!(pubkey = %account.pubkey, error = %err, "skipping undecodable token account");
                None
            }
        })
        .collect();

    let addresses: Vec<Pubkey> = holdings.iter().map(|(_, holding)| metadata_address(&holding.mint)).collect();
    let metadata_accounts = source.get_multiple_accounts(&addresses).await?;

    if metadata_accounts.len() != addresses.len() {
        return Err(TransportError::MalformedResponse {
            pubkey: *owner,
            reason: format!("requested {} metadata accounts, got {}", addresses.len(), metadata_accounts.len()),
        });
    }

    let nfts: Vec<NftResult> = holdings
        .into_iter()
        .zip(metadata_accounts)
        .filter_map(|((token_account, holding), data)| {
            let Some(data) = data else {
                debug!(mint = %holding.mint, "no metadata account");
                return None;
            };

            match decode_metadata(&data) {
                Ok(metadata) if metadata.mint == holding.mint => Some(NftResult::new(token_account, &metadata)),
                Ok(_) => {
                    warn!(mint = %holding.mint, "metadata mint mismatch");
                    None
                }
                Err(err) => {
                    warn!(mint = %holding.mint, error = %err, "skipping undecodable metadata");
                    None
                }
            }
        })
        .collect();

    debug!(count = nfts.len(), "fetched owned nfts");

    Ok(nfts)
}
