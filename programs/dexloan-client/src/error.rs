use anchor_lang::prelude::Pubkey;
use thiserror::Error;
use crate::state::ListingState;

/// A single account could not be read. Fatal to that record only.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Account data too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },
    #[error("Discriminator mismatch: expected {expected:?}, got {actual:?}")]
    DiscriminatorMismatch { expected: Vec<u8>, actual: Vec<u8> },
    #[error("Unknown listing state {0}")]
    UnknownState(u8),
    #[error("Invalid token account")]
    InvalidTokenAccount,
    #[error("Invalid metadata account: {0}")]
    InvalidMetadata(String),
}

/// The predicate cannot be expressed as a conjunction of memcmp filters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("Borrower-or-lender is a disjunction, query each role separately")]
    Disjunction,
    #[error("Lender filter requires state Active, got {0:?}")]
    LenderRequiresActive(ListingState),
    #[error("Borrower filter requires state Listed or Active, got {0:?}")]
    BorrowerRequiresOpenState(ListingState),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("RPC error: {0}")]
    Rpc(#[from] solana_client::client_error::ClientError),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Malformed response for {pubkey}: {reason}")]
    MalformedResponse { pubkey: Pubkey, reason: String },
    #[error("Transaction failed: {0}")]
    Transaction(String),
}

/// Raised before anything is submitted. No state is mutated.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PreconditionError {
    #[error("Wallet not connected")]
    SignerMissing,
    #[error("No NFT selected")]
    NftMissing,
    #[error("Invalid amount {0}")]
    InvalidAmount(f64),
    #[error("Invalid return rate {0}")]
    InvalidRate(f64),
    #[error("Invalid duration {0} months")]
    InvalidDuration(u32),
    #[error("Invalid state {0:?}")]
    InvalidState(ListingState),
    #[error("A listing is already being submitted")]
    SubmissionInProgress,
    #[error("Signer {0} is not the lender")]
    NotLender(Pubkey),
    #[error("Loan is not overdue")]
    NotOverdue,
}

#[derive(Debug, Error)]
pub enum DexloanError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Encode error: {0}")]
    Encode(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DexloanError>;
