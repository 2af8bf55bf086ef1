use alloy_provider::{Provider, ProviderBuilder};
use reqwest::Url;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// Error parsing or validating URLs
    #[error("Invalid RPC URL: {0}")]
    InvalidUrl(String),

    /// Error connecting to the RPC endpoint
    #[error("Connection error: {0}")]
    Connection(String),
}

/// Parse an RPC url, accepting only http(s) endpoints.
pub fn parse_rpc_url(rpc_url: &str) -> Result<Url, ClientError> {
    let url: Url = rpc_url
        .trim()
        .parse()
        .map_err(|e| ClientError::InvalidUrl(format!("{rpc_url}: {e}")))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ClientError::InvalidUrl(format!(
            "{rpc_url}: unsupported scheme {other}"
        ))),
    }
}

/// Convenience function to create an ethereum rpc provider from url.
pub async fn create_provider(rpc_url: &str) -> Result<impl Provider + Clone, ClientError> {
    let url = parse_rpc_url(rpc_url)?;
    let provider = ProviderBuilder::new().connect_http(url);

    Ok(provider)
}

/// Create a provider and make sure the endpoint answers.
///
/// Returns the provider together with the chain id it reported.
pub async fn connect_provider(rpc_url: &str) -> Result<(impl Provider + Clone, u64), ClientError> {
    let provider = create_provider(rpc_url).await?;
    let chain_id = provider
        .get_chain_id()
        .await
        .map_err(|e| ClientError::Connection(format!("{rpc_url}: {e}")))?;

    Ok((provider, chain_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_url() {
        let result = create_provider("not a url").await;
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        let err = parse_rpc_url("ws://localhost:8546").unwrap_err();
        assert!(err.to_string().contains("unsupported scheme ws"));
    }

    #[test]
    fn test_accepts_https() {
        let url = parse_rpc_url(" https://sepolia.optimism.io ").unwrap();
        assert_eq!(url.host_str(), Some("sepolia.optimism.io"));
    }
}
