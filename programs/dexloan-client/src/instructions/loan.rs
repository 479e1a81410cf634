use anchor_lang::prelude::Pubkey;
use anchor_lang::solana_program::instruction::{AccountMeta, Instruction};
use anchor_lang::solana_program::{system_program, sysvar};
use crate::error::{PreconditionError, Result};
use crate::state::{ListingAccount, ListingStatus};
use super::sighash;

/// Lender funds an open listing
pub fn make_loan(program_id: &Pubkey, lender: &Pubkey, listing: &ListingAccount) -> Result<Instruction> {
    if listing.listing.status != ListingStatus::Listed {
        return Err(PreconditionError::InvalidState(listing.listing.state()).into());
    }

    Ok(Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(listing.listing.borrower, false),
            AccountMeta::new(*lender, true),
            AccountMeta::new(listing.pubkey, false),
            AccountMeta::new_readonly(listing.listing.mint, false),
            AccountMeta::new_readonly(system_program::ID, false),
            AccountMeta::new_readonly(anchor_spl::token::ID, false),
            AccountMeta::new_readonly(sysvar::clock::ID, false),
        ],
        data: sighash("make_loan").to_vec(),
    })
}

/// Borrower pays back principal plus interest and recovers the NFT
pub fn repay_loan(
    program_id: &Pubkey,
    deposit_token_account: &Pubkey,
    listing: &ListingAccount,
) -> Result<Instruction> {
    let ListingStatus::Active(loan) = listing.listing.status else {
        return Err(PreconditionError::InvalidState(listing.listing.state()).into());
    };

    Ok(Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(listing.listing.borrower, true),
            AccountMeta::new(*deposit_token_account, false),
            AccountMeta::new(listing.listing.escrow, false),
            AccountMeta::new(loan.lender, false),
            AccountMeta::new(listing.pubkey, false),
            AccountMeta::new_readonly(listing.listing.mint, false),
            AccountMeta::new_readonly(system_program::ID, false),
            AccountMeta::new_readonly(anchor_spl::token::ID, false),
            AccountMeta::new_readonly(sysvar::clock::ID, false),
        ],
        data: sighash("repay_loan").to_vec(),
    })
}

/// Lender takes the escrowed NFT once the loan has run past its duration.
/// `unix_timestamp` is the caller's view of the cluster clock; the program
/// checks again against its own.
pub fn repossess_collateral(
    program_id: &Pubkey,
    lender: &Pubkey,
    lender_token_account: &Pubkey,
    listing: &ListingAccount,
    unix_timestamp: i64,
) -> Result<Instruction> {
    let ListingStatus::Active(loan) = listing.listing.status else {
        return Err(PreconditionError::InvalidState(listing.listing.state()).into());
    };

    if loan.lender != *lender {
        return Err(PreconditionError::NotLender(*lender).into());
    }

    if !loan.is_overdue(listing.listing.duration, unix_timestamp) {
        return Err(PreconditionError::NotOverdue.into());
    }

    Ok(Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(listing.listing.escrow, false),
            AccountMeta::new(*lender, true),
            AccountMeta::new(*lender_token_account, false),
            AccountMeta::new(listing.pubkey, false),
            AccountMeta::new(listing.listing.mint, false),
            AccountMeta::new_readonly(system_program::ID, false),
            AccountMeta::new_readonly(anchor_spl::token::ID, false),
            AccountMeta::new_readonly(sysvar::clock::ID, false),
            AccountMeta::new_readonly(sysvar::rent::ID, false),
        ],
        data: sighash("repossess_collateral").to_vec(),
    })
}
