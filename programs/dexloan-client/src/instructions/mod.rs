use anchor_lang::prelude::Pubkey;
use anchor_lang::solana_program::hash::hash;
use crate::constants::{ESCROW_PREFIX, LISTING_PREFIX};

pub mod listing;
pub mod loan;

pub use listing::*;
pub use loan::*;

/// Anchor instruction selector: the first 8 bytes of sha256("global:<name>")
pub fn sighash(name: &str) -> [u8; 8] {
    let preimage = format!("global:{}", name);
    let mut sighash = [0u8; 8];
    sighash.copy_from_slice(&hash(preimage.as_bytes()).to_bytes()[..8]);
    sighash
}

pub fn listing_address(program_id: &Pubkey, mint: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[LISTING_PREFIX, mint.as_ref()], program_id)
}

pub fn escrow_address(program_id: &Pubkey, mint: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[ESCROW_PREFIX, mint.as_ref()], program_id)
}
