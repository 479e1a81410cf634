#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use anchor_lang::prelude::Pubkey;
use anchor_lang::solana_program::instruction::Instruction;
use anchor_lang::solana_program::program_pack::Pack;
use anchor_spl::token::spl_token;
use async_trait::async_trait;
use parking_lot::Mutex;
use solana_client::client_error::ClientErrorKind;
use solana_sdk::signature::Signature;
use tokio::sync::Notify;
use dexloan_client::constants::PROGRAM_ID;
use dexloan_client::metadata::MetadataFetcher;
use dexloan_client::rpc::{AccountFilter, AccountSource, KeyedAccount};
use dexloan_client::state::*;
use dexloan_client::workflow::TransactionSubmitter;
use dexloan_client::{DexloanClient, TransportError};

/// In-memory ledger that applies filters the way a node does
#[derive(Default)]
pub struct MemorySource {
    programs: Mutex<HashMap<Pubkey, Vec<KeyedAccount>>>,
    accounts: Mutex<HashMap<Pubkey, Vec<u8>>>,
    program_calls: AtomicUsize,
    gate: Mutex<Option<Arc<Notify>>>,
    offline: AtomicBool,
    ignore_filters: AtomicBool,
}

impl MemorySource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_program_account(&self, owner: Pubkey, pubkey: Pubkey, data: Vec<u8>) {
        self.programs.lock().entry(owner).or_default().push(KeyedAccount { pubkey, data });
    }

    pub fn add_listing(&self, listing: &Listing) -> Pubkey {
        let pubkey = Pubkey::new_unique();
        self.add_program_account(PROGRAM_ID, pubkey, listing.encode(&LISTING_DISCRIMINATOR));
        pubkey
    }

    pub fn add_account(&self, pubkey: Pubkey, data: Vec<u8>) {
        self.accounts.lock().insert(pubkey, data);
    }

    /// A wallet's token account for `mint` plus the mint's metadata account
    pub fn add_nft(&self, owner: &Pubkey, name: &str) -> (Pubkey, Pubkey) {
        let mint = Pubkey::new_unique();
        let token_account = Pubkey::new_unique();

        self.add_program_account(anchor_spl::token::ID, token_account, token_account_data(&mint, owner, 1));
        self.add_account(metadata_address(&mint), metadata_data(&mint, name, "https://arweave.net/nft.json"));

        (token_account, mint)
    }

    /// Drops an account from a program, as a transfer out of the wallet would
    pub fn remove_program_account(&self, owner: &Pubkey, pubkey: &Pubkey) {
        if let Some(accounts) = self.programs.lock().get_mut(owner) {
            accounts.retain(|account| account.pubkey != *pubkey);
        }
    }

    /// Holds every program-accounts response until the returned handle is
    /// notified. The accounts are read before waiting.
    pub fn gate(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock() = Some(Arc::clone(&notify));
        notify
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Returns every account regardless of filters, like a broken node
    pub fn set_ignore_filters(&self, ignore: bool) {
        self.ignore_filters.store(ignore, Ordering::SeqCst);
    }

    pub fn program_calls(&self) -> usize {
        self.program_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccountSource for MemorySource {
    async fn get_program_accounts(
        &self,
        program_id: &Pubkey,
        filters: &[AccountFilter],
    ) -> Result<Vec<KeyedAccount>, TransportError> {
        self.program_calls.fetch_add(1, Ordering::SeqCst);

        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError::Rpc(ClientErrorKind::Custom("connection refused".to_string()).into()));
        }

        let ignore_filters = self.ignore_filters.load(Ordering::SeqCst);

        let accounts: Vec<KeyedAccount> = self
            .programs
            .lock()
            .get(program_id)
            .map(|accounts| {
                accounts
                    .iter()
                    .filter(|account| ignore_filters || filters.iter().all(|filter| filter.matches(&account.data)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        // the snapshot is taken before the gate, like a response on the wire
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        Ok(accounts)
    }

    async fn get_multiple_accounts(&self, pubkeys: &[Pubkey]) -> Result<Vec<Option<Vec<u8>>>, TransportError> {
        let accounts = self.accounts.lock();
        Ok(pubkeys.iter().map(|pubkey| accounts.get(pubkey).cloned()).collect())
    }
}

#[derive(Default)]
pub struct MemoryMetadata {
    files: Mutex<HashMap<String, MetadataFile>>,
    calls: AtomicUsize,
}

impl MemoryMetadata {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, uri: &str, file: MetadataFile) {
        self.files.lock().insert(uri.to_string(), file);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataFetcher for MemoryMetadata {
    async fn fetch_metadata_file(&self, uri: &str) -> Result<MetadataFile, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        self.files
            .lock()
            .get(uri)
            .cloned()
            .ok_or_else(|| TransportError::Rpc(ClientErrorKind::Custom(format!("404 {}", uri)).into()))
    }
}

/// Records what it is asked to submit and succeeds unless told otherwise
pub struct MockSubmitter {
    pub pubkey: Pubkey,
    pub submitted: Mutex<Vec<Vec<Instruction>>>,
    fail_with: Option<String>,
    stalled: bool,
}

impl MockSubmitter {
    pub fn new(pubkey: Pubkey) -> Self {
        Self {
            pubkey,
            submitted: Mutex::new(Vec::new()),
            fail_with: None,
            stalled: false,
        }
    }

    /// Never hears back from the network
    pub fn stalled(pubkey: Pubkey) -> Self {
        Self {
            stalled: true,
            ..Self::new(pubkey)
        }
    }

    pub fn failing(pubkey: Pubkey, message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::new(pubkey)
        }
    }

    pub fn submissions(&self) -> usize {
        self.submitted.lock().len()
    }
}

#[async_trait]
impl TransactionSubmitter for MockSubmitter {
    fn pubkey(&self) -> Pubkey {
        self.pubkey
    }

    async fn submit(&self, instructions: Vec<Instruction>) -> Result<Signature, TransportError> {
        self.submitted.lock().push(instructions);

        if self.stalled {
            futures::future::pending::<()>().await;
        }

        match &self.fail_with {
            Some(message) => Err(TransportError::Transaction(message.clone())),
            None => Ok(Signature::new_unique()),
        }
    }
}

pub fn client(source: Arc<MemorySource>, metadata: Arc<MemoryMetadata>) -> DexloanClient {
    DexloanClient::new(source, metadata, PROGRAM_ID, LISTING_DISCRIMINATOR)
}

pub fn listing(status: ListingStatus, borrower: Pubkey) -> Listing {
    Listing {
        status,
        amount: 2_000_000_000,
        borrower,
        basis_points: 1_500,
        duration: 2_592_000,
        escrow: Pubkey::new_unique(),
        mint: Pubkey::new_unique(),
        bump: 254,
        escrow_bump: 253,
    }
}

pub fn active(lender: Pubkey) -> ListingStatus {
    ListingStatus::Active(ActiveLoan {
        lender,
        start_date: 1_650_000_000,
    })
}

pub fn token_account_data(mint: &Pubkey, owner: &Pubkey, amount: u64) -> Vec<u8> {
    let account = spl_token::state::Account {
        mint: *mint,
        owner: *owner,
        amount,
        state: spl_token::state::AccountState::Initialized,
        ..Default::default()
    };
    let mut data = vec![0u8; spl_token::state::Account::LEN];
    spl_token::state::Account::pack(account, &mut data).unwrap();
    data
}

/// Borsh layout of a v1 metadata account with a verified collection
pub fn metadata_data(mint: &Pubkey, name: &str, uri: &str) -> Vec<u8> {
    fn string(data: &mut Vec<u8>, value: &str, width: usize) {
        let mut padded = value.as_bytes().to_vec();
        padded.resize(width.max(padded.len()), 0);
        data.extend_from_slice(&(padded.len() as u32).to_le_bytes());
        data.extend_from_slice(&padded);
    }

    let mut data = vec![4u8];
    data.extend_from_slice(Pubkey::new_unique().as_ref());
    data.extend_from_slice(mint.as_ref());
    string(&mut data, name, 32);
    string(&mut data, "DEX", 10);
    string(&mut data, uri, 200);
    data.extend_from_slice(&500u16.to_le_bytes());
    data.push(0); // creators
    data.push(1); // primary_sale_happened
    data.push(1); // is_mutable
    data.push(0); // edition_nonce
    data.push(0); // token_standard
    data.push(1); // collection
    data.push(1);
    data.extend_from_slice(Pubkey::new_unique().as_ref());
    data.push(0); // uses
    data.push(0); // collection_details
    data.push(0); // programmable_config
    data
}
