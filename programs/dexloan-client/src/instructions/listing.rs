use anchor_lang::prelude::Pubkey;
use anchor_lang::solana_program::instruction::{AccountMeta, Instruction};
use anchor_lang::solana_program::{system_program, sysvar};
use anchor_lang::prelude::borsh;
use anchor_lang::{AnchorDeserialize, AnchorSerialize};
use crate::error::{PreconditionError, Result};
use crate::state::{ListingAccount, ListingState};
use super::{escrow_address, listing_address, sighash};

/// Loan terms in on-chain units
#[derive(AnchorSerialize, AnchorDeserialize, Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListingOptions {
    /// Lamports
    pub amount: u64,
    /// Seconds
    pub duration: u64,
    pub basis_points: u16,
}

/// Creates the listing and moves the NFT into escrow
pub fn init_listing(
    program_id: &Pubkey,
    borrower: &Pubkey,
    deposit_token_account: &Pubkey,
    mint: &Pubkey,
    options: ListingOptions,
) -> Result<Instruction> {
    let (listing_account, _) = listing_address(program_id, mint);
    let (escrow_account, _) = escrow_address(program_id, mint);

    let mut data = sighash("init_listing").to_vec();
    options.serialize(&mut data)?;

    Ok(Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(*borrower, true),
            AccountMeta::new(*deposit_token_account, false),
            AccountMeta::new(listing_account, false),
            AccountMeta::new(escrow_account, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new_readonly(system_program::ID, false),
            AccountMeta::new_readonly(anchor_spl::token::ID, false),
            AccountMeta::new_readonly(sysvar::rent::ID, false),
        ],
        data,
    })
}

/// Returns the escrowed NFT to the borrower. Only open listings can be cancelled.
pub fn cancel_listing(
    program_id: &Pubkey,
    deposit_token_account: &Pubkey,
    listing: &ListingAccount,
) -> Result<Instruction> {
    if listing.listing.state() != ListingState::Listed {
        return Err(PreconditionError::InvalidState(listing.listing.state()).into());
    }

    Ok(Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new_readonly(listing.listing.borrower, true),
            AccountMeta::new(*deposit_token_account, false),
            AccountMeta::new(listing.pubkey, false),
            AccountMeta::new(listing.listing.escrow, false),
            AccountMeta::new_readonly(listing.listing.mint, false),
            AccountMeta::new_readonly(system_program::ID, false),
            AccountMeta::new_readonly(anchor_spl::token::ID, false),
        ],
        data: sighash("cancel_listing").to_vec(),
    })
}
