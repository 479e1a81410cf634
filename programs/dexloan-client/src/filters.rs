//! Maps listing predicates onto memcmp filters over the account layout.

use anchor_lang::prelude::Pubkey;
use crate::error::FilterError;
use crate::state::{layout, Field, Listing, ListingState};

/// Remote-side equality check of `bytes` at `offset`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemcmpFilter {
    pub offset: usize,
    pub bytes: Vec<u8>,
}

impl MemcmpFilter {
    pub fn new(offset: usize, bytes: Vec<u8>) -> Self {
        Self { offset, bytes }
    }

    pub fn width(&self) -> usize {
        self.bytes.len()
    }

    pub fn end(&self) -> usize {
        self.offset + self.bytes.len()
    }

    /// Base-58 form for the RPC transport. Comparison stays on the raw bytes.
    pub fn encoded_bytes(&self) -> String {
        bs58::encode(&self.bytes).into_string()
    }

    pub fn matches(&self, data: &[u8]) -> bool {
        data.get(self.offset..self.end()) == Some(&self.bytes[..])
    }
}

/// Which role a counterparty key occupies on the listing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Counterparty {
    Borrower(Pubkey),
    Lender(Pubkey),
    /// Borrower or lender. Not a conjunction; see [`ListingPredicate::decompose`].
    Either(Pubkey),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListingPredicate {
    pub state: ListingState,
    pub counterparty: Option<Counterparty>,
}

impl ListingPredicate {
    pub fn new(state: ListingState) -> Self {
        Self { state, counterparty: None }
    }

    pub fn with_counterparty(self, counterparty: Counterparty) -> Self {
        Self {
            counterparty: Some(counterparty),
            ..self
        }
    }

    /// Open listings anyone can lend against
    pub fn listed() -> Self {
        Self::new(ListingState::Listed)
    }

    /// Open listings created by `borrower`
    pub fn listed_by(borrower: Pubkey) -> Self {
        Self::listed().with_counterparty(Counterparty::Borrower(borrower))
    }

    /// Active loans where `lender` provided the funds
    pub fn lent_by(lender: Pubkey) -> Self {
        Self::new(ListingState::Active).with_counterparty(Counterparty::Lender(lender))
    }

    /// Active loans where `borrower` put up the collateral
    pub fn borrowed_by(borrower: Pubkey) -> Self {
        Self::new(ListingState::Active).with_counterparty(Counterparty::Borrower(borrower))
    }

    /// Filters a node applies conjunctively. State comes first since it is
    /// the cheapest and most selective comparison.
    pub fn filters(&self) -> Result<Vec<MemcmpFilter>, FilterError> {
        let mut filters = vec![state_filter(self.state)];

        match self.counterparty {
            None => {}
            Some(Counterparty::Borrower(borrower)) => {
                if !matches!(self.state, ListingState::Listed | ListingState::Active) {
                    return Err(FilterError::BorrowerRequiresOpenState(self.state));
                }
                filters.push(pubkey_filter(layout::BORROWER, &borrower));
            }
            Some(Counterparty::Lender(lender)) => {
                if self.state != ListingState::Active {
                    return Err(FilterError::LenderRequiresActive(self.state));
                }
                filters.push(pubkey_filter(layout::LENDER, &lender));
            }
            Some(Counterparty::Either(_)) => return Err(FilterError::Disjunction),
        }

        Ok(filters)
    }

    /// Splits an `Either` predicate into one query per role. Halves that
    /// cannot be filtered for this state are dropped.
    pub fn decompose(&self) -> Vec<ListingPredicate> {
        match self.counterparty {
            Some(Counterparty::Either(key)) => [Counterparty::Borrower(key), Counterparty::Lender(key)]
                .into_iter()
                .map(|counterparty| self.with_counterparty(counterparty))
                .filter(|predicate| predicate.filters().is_ok())
                .collect(),
            _ => vec![*self],
        }
    }

    /// The same predicate evaluated against a decoded record
    pub fn matches(&self, listing: &Listing) -> bool {
        if listing.state() != self.state {
            return false;
        }

        match self.counterparty {
            None => true,
            Some(Counterparty::Borrower(key)) => listing.borrower == key,
            Some(Counterparty::Lender(key)) => listing.lender() == Some(key),
            Some(Counterparty::Either(key)) => {
                listing.borrower == key || listing.lender() == Some(key)
            }
        }
    }
}

fn state_filter(state: ListingState) -> MemcmpFilter {
    MemcmpFilter::new(layout::STATE.offset, encode_le(state as u64, layout::STATE.width))
}

fn pubkey_filter(field: Field, key: &Pubkey) -> MemcmpFilter {
    debug_assert_eq!(field.width, 32);
    MemcmpFilter::new(field.offset, key.to_bytes().to_vec())
}

/// Fixed-width little-endian integer
fn encode_le(value: u64, width: usize) -> Vec<u8> {
    value.to_le_bytes()[..width].to_vec()
}
