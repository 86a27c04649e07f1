use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::types::{FetchBatch, Marketplace};

/// A listings source the pipeline can poll.
///
/// Implementations log and swallow transient transport errors, returning an
/// empty batch; an `Err` is still tolerated by the caller and treated the
/// same way.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketplaceSource: Send + Sync {
    fn marketplace(&self) -> Marketplace;

    async fn search(&self, keywords: &[String]) -> Result<FetchBatch>;
}

pub(crate) fn build_http_client(timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()?;
    Ok(client)
}
