use async_trait::async_trait;
use tracing::instrument;
use crate::error::TransportError;
use crate::state::MetadataFile;

/// Fetches the off-chain JSON document an NFT's `uri` points at
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    async fn fetch_metadata_file(&self, uri: &str) -> Result<MetadataFile, TransportError>;
}

#[derive(Clone, Default)]
pub struct HttpMetadataFetcher {
    http: reqwest::Client,
}

impl HttpMetadataFetcher {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl MetadataFetcher for HttpMetadataFetcher {
    #[instrument(skip(self))]
    async fn fetch_metadata_file(&self, uri: &str) -> Result<MetadataFile, TransportError> {
        let file = self
            .http
            .get(uri)
            .send()
            .await?
            .error_for_status()?
            .json::<MetadataFile>()
            .await?;

        Ok(file)
    }
}
