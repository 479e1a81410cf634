use std::path::Path;
use std::str::FromStr;
use anchor_lang::prelude::Pubkey;
use serde::{Deserialize, Serialize};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::{CommitmentConfig, CommitmentLevel};
use tracing::debug;
use crate::constants::{DEFAULT_COMMITMENT, DEFAULT_RPC_URL, PROGRAM_ID};
use crate::error::{DexloanError, Result};
use crate::state::{ListingDiscriminator, DISCRIMINATOR_LEN, LISTING_DISCRIMINATOR};

pub const RPC_URL_ENV: &str = "DEXLOAN_RPC_URL";
pub const PROGRAM_ID_ENV: &str = "DEXLOAN_PROGRAM_ID";

/// Client settings, read from TOML:
///
/// ```toml
/// rpc_url = "https://api.devnet.solana.com"
/// program_id = "Da2AAtcBWTQ1dQdEQWzqSRpF9tCB6wWVbCAEf2P3iAzb"
/// commitment = "finalized"
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub rpc_url: String,
    /// Base58
    pub program_id: String,
    pub commitment: String,
    /// Replaces the listing account tag, for forks of the program
    pub discriminator: Option<Vec<u8>>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            program_id: PROGRAM_ID.to_string(),
            commitment: DEFAULT_COMMITMENT.to_string(),
            discriminator: None,
        }
    }
}

impl ClientConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: ClientConfig =
            toml::from_str(source).map_err(|err| DexloanError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path.as_ref())
            .map_err(|err| DexloanError::Config(format!("{}: {}", path.as_ref().display(), err)))?;
        Self::from_toml_str(&source)
    }

    /// Applies `DEXLOAN_RPC_URL` and `DEXLOAN_PROGRAM_ID` from the process environment
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(rpc_url) = lookup(RPC_URL_ENV) {
            debug!(%rpc_url, "rpc url overridden");
            self.rpc_url = rpc_url;
        }

        if let Some(program_id) = lookup(PROGRAM_ID_ENV) {
            debug!(%program_id, "program id overridden");
            self.program_id = program_id;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn program_id(&self) -> Result<Pubkey> {
        Pubkey::from_str(&self.program_id)
            .map_err(|err| DexloanError::Config(format!("program_id {:?}: {}", self.program_id, err)))
    }

    pub fn commitment(&self) -> Result<CommitmentConfig> {
        let commitment = CommitmentLevel::from_str(&self.commitment)
            .map_err(|err| DexloanError::Config(format!("commitment {:?}: {}", self.commitment, err)))?;

        Ok(CommitmentConfig { commitment })
    }

    pub fn discriminator(&self) -> Result<ListingDiscriminator> {
        match &self.discriminator {
            None => Ok(LISTING_DISCRIMINATOR),
            Some(bytes) => bytes.as_slice().try_into().map_err(|_| {
                DexloanError::Config(format!(
                    "discriminator must be {} bytes, got {}",
                    DISCRIMINATOR_LEN,
                    bytes.len()
                ))
            }),
        }
    }

    pub fn rpc_client(&self) -> Result<RpcClient> {
        Ok(RpcClient::new_with_commitment(self.rpc_url.clone(), self.commitment()?))
    }

    fn validate(&self) -> Result<()> {
        if self.rpc_url.is_empty() {
            return Err(DexloanError::Config("rpc_url is empty".to_string()));
        }

        self.program_id()?;
        self.commitment()?;
        self.discriminator()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = ClientConfig::from_toml_str("").unwrap();

        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.program_id().unwrap(), PROGRAM_ID);
        assert_eq!(config.discriminator().unwrap(), LISTING_DISCRIMINATOR);
        assert_eq!(config.commitment().unwrap(), CommitmentConfig::confirmed());
    }

    #[test]
    fn reads_every_field() {
        let config = ClientConfig::from_toml_str(
            r#"
            rpc_url = "http://localhost:8899"
            program_id = "11111111111111111111111111111111"
            commitment = "finalized"
            discriminator = [1, 2, 3, 4, 5, 6, 7]
            "#,
        )
        .unwrap();

        assert_eq!(config.rpc_url, "http://localhost:8899");
        assert_eq!(config.program_id().unwrap(), Pubkey::default());
        assert_eq!(config.commitment().unwrap(), CommitmentConfig::finalized());
        assert_eq!(config.discriminator().unwrap(), [1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(ClientConfig::from_toml_str(r#"program_id = "not a key""#).is_err());
        assert!(ClientConfig::from_toml_str(r#"commitment = "eventually""#).is_err());
        assert!(ClientConfig::from_toml_str("discriminator = [1, 2, 3]").is_err());
        assert!(ClientConfig::from_toml_str(r#"rpc_url = """#).is_err());
    }

    #[test]
    fn overrides_replace_file_values() {
        let program_id = Pubkey::new_unique();
        let config = ClientConfig::default()
            .with_overrides(|name| match name {
                RPC_URL_ENV => Some("http://127.0.0.1:8899".to_string()),
                PROGRAM_ID_ENV => Some(program_id.to_string()),
                _ => None,
            })
            .unwrap();

        assert_eq!(config.rpc_url, "http://127.0.0.1:8899");
        assert_eq!(config.program_id().unwrap(), program_id);

        let unchanged = ClientConfig::default().with_overrides(|_| None).unwrap();
        assert_eq!(unchanged, ClientConfig::default());
    }
}
