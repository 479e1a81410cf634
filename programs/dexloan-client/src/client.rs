use std::collections::HashSet;
use std::sync::Arc;
use anchor_lang::prelude::Pubkey;
use tracing::{debug, info, instrument};
use crate::cache::{QueryCache, QueryState, SharedError};
use crate::config::ClientConfig;
use crate::error::{DexloanError, Result};
use crate::filters::{Counterparty, ListingPredicate};
use crate::metadata::{HttpMetadataFetcher, MetadataFetcher};
use crate::rpc::{fetch_listings, fetch_owned_nfts, AccountSource};
use crate::state::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Listings,
    Loans,
    Borrowings,
    WalletNfts,
    MetadataFile,
}

/// Cache key: what is being queried and for whom
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub kind: QueryKind,
    /// Wallet address, URI, or the predicate for general listing queries
    pub scope: Option<String>,
}

impl QueryKey {
    pub fn new(kind: QueryKind, scope: Option<String>) -> Self {
        Self { kind, scope }
    }

    pub fn wallet_nfts(owner: &Pubkey) -> Self {
        Self::new(QueryKind::WalletNfts, Some(owner.to_string()))
    }

    pub fn metadata_file(uri: &str) -> Self {
        Self::new(QueryKind::MetadataFile, Some(uri.to_string()))
    }

    pub fn for_predicate(predicate: &ListingPredicate) -> Self {
        match (predicate.state, predicate.counterparty) {
            (ListingState::Listed, None) => Self::new(QueryKind::Listings, None),
            (ListingState::Active, Some(Counterparty::Lender(lender))) => {
                Self::new(QueryKind::Loans, Some(lender.to_string()))
            }
            (ListingState::Active, Some(Counterparty::Borrower(borrower))) => {
                Self::new(QueryKind::Borrowings, Some(borrower.to_string()))
            }
            (state, None) => Self::new(QueryKind::Listings, Some(format!("{:?}", state))),
            (state, Some(counterparty)) => {
                Self::new(QueryKind::Listings, Some(format!("{:?}/{:?}", state, counterparty)))
            }
        }
    }

    /// Keys whose values are decoded listing accounts
    pub fn is_listing_query(&self) -> bool {
        matches!(self.kind, QueryKind::Listings | QueryKind::Loans | QueryKind::Borrowings)
    }
}

/// Read side of the marketplace. Cheap to clone; clones share caches.
#[derive(Clone)]
pub struct DexloanClient {
    source: Arc<dyn AccountSource>,
    metadata: Arc<dyn MetadataFetcher>,
    program_id: Pubkey,
    discriminator: ListingDiscriminator,
    listings: QueryCache<QueryKey, Vec<ListingAccount>>,
    nfts: QueryCache<QueryKey, Vec<NftResult>>,
    metadata_files: QueryCache<QueryKey, MetadataFile>,
}

impl DexloanClient {
    pub fn new(
        source: Arc<dyn AccountSource>,
        metadata: Arc<dyn MetadataFetcher>,
        program_id: Pubkey,
        discriminator: ListingDiscriminator,
    ) -> Self {
        Self {
            source,
            metadata,
            program_id,
            discriminator,
            listings: QueryCache::new(),
            nfts: QueryCache::new(),
            metadata_files: QueryCache::new(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let rpc = config.rpc_client()?;

        info!(rpc_url = %config.rpc_url, program_id = %config.program_id, "client configured");

        Ok(Self::new(
            Arc::new(rpc),
            Arc::new(HttpMetadataFetcher::default()),
            config.program_id()?,
            config.discriminator()?,
        ))
    }

    pub fn program_id(&self) -> &Pubkey {
        &self.program_id
    }

    pub fn listing_cache(&self) -> &QueryCache<QueryKey, Vec<ListingAccount>> {
        &self.listings
    }

    pub fn nft_cache(&self) -> &QueryCache<QueryKey, Vec<NftResult>> {
        &self.nfts
    }

    pub fn metadata_cache(&self) -> &QueryCache<QueryKey, MetadataFile> {
        &self.metadata_files
    }

    /// Listings matching `predicate`. An unfilterable predicate fails here,
    /// before any request is made.
    pub fn query_listings(&self, predicate: &ListingPredicate) -> Result<QueryState<Vec<ListingAccount>>> {
        let filters = predicate.filters()?;
        let source = Arc::clone(&self.source);
        let program_id = self.program_id;
        let discriminator = self.discriminator;

        Ok(self.listings.query(QueryKey::for_predicate(predicate), move || async move {
            fetch_listings(source.as_ref(), &program_id, &filters, &discriminator)
                .await
                .map_err(DexloanError::from)
        }))
    }

    /// Open listings created by `owner`; idle without a wallet
    pub fn query_listings_by_owner(&self, owner: Option<&Pubkey>) -> Result<QueryState<Vec<ListingAccount>>> {
        match owner {
            Some(owner) => self.query_listings(&ListingPredicate::listed_by(*owner)),
            None => Ok(QueryState::Idle),
        }
    }

    /// Active loans funded by `lender`; idle without a wallet
    pub fn query_loans(&self, lender: Option<&Pubkey>) -> Result<QueryState<Vec<ListingAccount>>> {
        match lender {
            Some(lender) => self.query_listings(&ListingPredicate::lent_by(*lender)),
            None => Ok(QueryState::Idle),
        }
    }

    /// Active loans collateralised by `borrower`; idle without a wallet
    pub fn query_borrowings(&self, borrower: Option<&Pubkey>) -> Result<QueryState<Vec<ListingAccount>>> {
        match borrower {
            Some(borrower) => self.query_listings(&ListingPredicate::borrowed_by(*borrower)),
            None => Ok(QueryState::Idle),
        }
    }

    pub fn query_owned_nfts(&self, owner: Option<&Pubkey>) -> QueryState<Vec<NftResult>> {
        let Some(owner) = owner.copied() else {
            debug!("no wallet, owned nfts disabled");
            return QueryState::Idle;
        };
        let source = Arc::clone(&self.source);

        self.nfts.query(QueryKey::wallet_nfts(&owner), move || async move {
            fetch_owned_nfts(source.as_ref(), &owner).await.map_err(DexloanError::from)
        })
    }

    pub fn query_metadata_file(&self, uri: Option<&str>) -> QueryState<MetadataFile> {
        let Some(uri) = uri.filter(|uri| !uri.is_empty()).map(str::to_string) else {
            return QueryState::Idle;
        };
        let metadata = Arc::clone(&self.metadata);

        self.metadata_files.query(QueryKey::metadata_file(&uri), move || async move {
            metadata.fetch_metadata_file(&uri).await.map_err(DexloanError::from)
        })
    }

    /// Awaits the listings for `predicate`, joining a fetch already in flight
    #[instrument(skip(self))]
    pub async fn fetch_listings(
        &self,
        predicate: &ListingPredicate,
    ) -> std::result::Result<Vec<ListingAccount>, SharedError> {
        let filters = predicate.filters().map_err(|err| Arc::new(DexloanError::from(err)))?;
        let source = Arc::clone(&self.source);
        let program_id = self.program_id;
        let discriminator = self.discriminator;

        self.listings
            .fetch(QueryKey::for_predicate(predicate), move || async move {
                fetch_listings(source.as_ref(), &program_id, &filters, &discriminator)
                    .await
                    .map_err(DexloanError::from)
            })
            .await
    }

    /// Like [`DexloanClient::fetch_listings`] but splits a borrower-or-lender
    /// predicate into one query per role and merges the results.
    pub async fn fetch_listings_involving(
        &self,
        predicate: &ListingPredicate,
    ) -> std::result::Result<Vec<ListingAccount>, SharedError> {
        let mut seen = HashSet::new();
        let mut merged = Vec::new();

        for part in predicate.decompose() {
            for account in self.fetch_listings(&part).await? {
                if seen.insert(account.pubkey) {
                    merged.push(account);
                }
            }
        }

        Ok(merged)
    }

    #[instrument(skip(self))]
    pub async fn fetch_owned_nfts(&self, owner: &Pubkey) -> std::result::Result<Vec<NftResult>, SharedError> {
        let source = Arc::clone(&self.source);
        let owner = *owner;

        self.nfts
            .fetch(QueryKey::wallet_nfts(&owner), move || async move {
                fetch_owned_nfts(source.as_ref(), &owner).await.map_err(DexloanError::from)
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn fetch_metadata_file(&self, uri: &str) -> std::result::Result<MetadataFile, SharedError> {
        let metadata = Arc::clone(&self.metadata);
        let owned_uri = uri.to_string();

        self.metadata_files
            .fetch(QueryKey::metadata_file(uri), move || async move {
                metadata.fetch_metadata_file(&owned_uri).await.map_err(DexloanError::from)
            })
            .await
    }

    /// Marks every listing, loan and borrowing query stale
    pub fn invalidate_listings(&self) {
        self.listings.invalidate_where(QueryKey::is_listing_query);
    }

    /// Drops every cached value, e.g. when the wallet changes
    pub fn clear(&self) {
        self.listings.clear();
        self.nfts.clear();
        self.metadata_files.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_queries_get_named_keys() {
        let wallet = Pubkey::new_unique();

        assert_eq!(
            QueryKey::for_predicate(&ListingPredicate::listed()),
            QueryKey::new(QueryKind::Listings, None)
        );
        assert_eq!(
            QueryKey::for_predicate(&ListingPredicate::lent_by(wallet)),
            QueryKey::new(QueryKind::Loans, Some(wallet.to_string()))
        );
        assert_eq!(
            QueryKey::for_predicate(&ListingPredicate::borrowed_by(wallet)),
            QueryKey::new(QueryKind::Borrowings, Some(wallet.to_string()))
        );
    }

    #[test]
    fn distinct_predicates_get_distinct_keys() {
        let wallet = Pubkey::new_unique();
        let keys: HashSet<QueryKey> = [
            ListingPredicate::listed(),
            ListingPredicate::listed_by(wallet),
            ListingPredicate::new(ListingState::Repaid),
            ListingPredicate::new(ListingState::Active),
            ListingPredicate::lent_by(wallet),
            ListingPredicate::borrowed_by(wallet),
        ]
        .iter()
        .map(QueryKey::for_predicate)
        .collect();

        assert_eq!(keys.len(), 6);
    }

    #[test]
    fn only_listing_kinds_are_listing_queries() {
        assert!(QueryKey::new(QueryKind::Loans, None).is_listing_query());
        assert!(!QueryKey::wallet_nfts(&Pubkey::new_unique()).is_listing_query());
        assert!(!QueryKey::metadata_file("https://arweave.net/x").is_listing_query());
    }
}
