use anchor_lang::prelude::Pubkey;
use anchor_lang::AccountDeserialize;
use anchor_spl::token::TokenAccount;
use mpl_token_metadata::accounts::Metadata;
use serde::{Deserialize, Serialize};
use crate::error::DecodeError;

/// An NFT held by a wallet, joined with its on-chain metadata
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NftResult {
    /// The token account holding the NFT
    pub token_account: Pubkey,
    pub mint: Pubkey,
    pub name: String,
    pub symbol: String,
    /// Off-chain JSON document
    pub uri: String,
    /// Set only when the collection is verified
    pub collection: Option<Pubkey>,
}

impl NftResult {
    pub fn new(token_account: Pubkey, metadata: &Metadata) -> Self {
        NftResult {
            token_account,
            mint: metadata.mint,
            name: trim_padding(&metadata.name),
            symbol: trim_padding(&metadata.symbol),
            uri: trim_padding(&metadata.uri),
            collection: metadata
                .collection
                .as_ref()
                .filter(|collection| collection.verified)
                .map(|collection| collection.key),
        }
    }
}

/// The fields of an spl-token account the client needs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenHolding {
    pub mint: Pubkey,
    pub owner: Pubkey,
    pub amount: u64,
}

impl TokenHolding {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let account = TokenAccount::try_deserialize_unchecked(&mut &data[..])
            .map_err(|_| DecodeError::InvalidTokenAccount)?;

        Ok(TokenHolding {
            mint: account.mint,
            owner: account.owner,
            amount: account.amount,
        })
    }

    pub fn is_nft(&self) -> bool {
        self.amount == 1
    }
}

pub fn metadata_address(mint: &Pubkey) -> Pubkey {
    let (key, _) = Pubkey::find_program_address(
        &[b"metadata", mpl_token_metadata::ID.as_ref(), mint.as_ref()],
        &mpl_token_metadata::ID,
    );

    key
}

pub fn decode_metadata(data: &[u8]) -> Result<Metadata, DecodeError> {
    Metadata::from_bytes(data).map_err(|err| DecodeError::InvalidMetadata(err.to_string()))
}

/// On-chain strings are fixed width and padded with NUL
fn trim_padding(value: &str) -> String {
    value.trim_end_matches('\0').to_string()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetadataAttribute {
    pub trait_type: String,
    pub value: serde_json::Value,
}

/// The JSON document an NFT's `uri` points at
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetadataFile {
    pub image: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub external_url: Option<String>,
    #[serde(default)]
    pub attributes: Vec<MetadataAttribute>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchor_lang::solana_program::program_pack::Pack;
    use anchor_spl::token::spl_token;

    #[test]
    fn reads_token_holding() {
        let mint = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        let account = spl_token::state::Account {
            mint,
            owner,
            amount: 1,
            state: spl_token::state::AccountState::Initialized,
            ..Default::default()
        };
        let mut data = vec![0u8; spl_token::state::Account::LEN];
        spl_token::state::Account::pack(account, &mut data).unwrap();

        let holding = TokenHolding::decode(&data).unwrap();
        assert_eq!(holding, TokenHolding { mint, owner, amount: 1 });
        assert!(holding.is_nft());
    }

    #[test]
    fn rejects_garbage_token_account() {
        assert_eq!(TokenHolding::decode(&[1, 2, 3]), Err(DecodeError::InvalidTokenAccount));
    }

    #[test]
    fn metadata_file_needs_only_an_image() {
        let file: MetadataFile =
            serde_json::from_str(r#"{ "image": "https://arweave.net/abc.png" }"#).unwrap();

        assert_eq!(file.image, "https://arweave.net/abc.png");
        assert_eq!(file.name, None);
        assert!(file.attributes.is_empty());
    }

    #[test]
    fn strips_nul_padding() {
        assert_eq!(trim_padding("Degen #1\0\0\0"), "Degen #1");
    }
}
