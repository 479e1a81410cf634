use anchor_lang::prelude::*;
use anchor_lang::solana_program::pubkey;

/// The listings program on mainnet
pub const PROGRAM_ID: Pubkey = pubkey!("Da2AAtcBWTQ1dQdEQWzqSRpF9tCB6wWVbCAEf2P3iAzb");

pub const DEFAULT_RPC_URL: &str = "https://api.mainnet-beta.solana.com";
pub const DEFAULT_COMMITMENT: &str = "confirmed";

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;
pub const SECONDS_PER_DAY: u64 = 86_400;
pub const SECONDS_PER_YEAR: u64 = 31_536_000;
/// Months are priced as 30 days, not calendar months
pub const DAYS_PER_MONTH: u64 = 30;
pub const BASIS_POINTS_PER_UNIT: u64 = 10_000;

/// Size of an spl-token account
pub const TOKEN_ACCOUNT_LEN: u64 = 165;
/// Offset of the owner field in an spl-token account (after the mint)
pub const TOKEN_ACCOUNT_OWNER_OFFSET: usize = 32;

pub const LISTING_PREFIX: &[u8] = b"listing";
pub const ESCROW_PREFIX: &[u8] = b"escrow";

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn program_id_matches_base58() {
        assert_eq!(
            PROGRAM_ID,
            Pubkey::from_str("Da2AAtcBWTQ1dQdEQWzqSRpF9tCB6wWVbCAEf2P3iAzb").unwrap()
        );
    }
}
