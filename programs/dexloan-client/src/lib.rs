pub mod cache;
pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod filters;
pub mod instructions;
pub mod metadata;
pub mod rpc;
pub mod state;
pub mod utils;
pub mod workflow;

pub use cache::{QueryCache, QueryState};
pub use client::{DexloanClient, QueryKey, QueryKind};
pub use config::ClientConfig;
pub use error::*;
pub use filters::{Counterparty, ListingPredicate, MemcmpFilter};
pub use rpc::{AccountFilter, AccountSource, KeyedAccount};
pub use state::*;
pub use workflow::{CreateListingWorkflow, ListingTerms, TransactionSubmitter, WorkflowOutcome, WorkflowState};
