use std::collections::HashSet;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use url::Url;

/// Timeout applied to every chain RPC request.
pub const RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout applied to metrics scrapes. The exporter serves a static text
/// page, so anything slower than this is as good as down.
pub const METRICS_TIMEOUT: Duration = Duration::from_secs(10);

/// A client for a CometBFT node's RPC interface
/// This client only covers the read endpoints the validation suite needs
///
/// ``` no_run
/// use cometbft_client::NodeClient;
///
/// #[tokio::main]
/// async fn main() {
///     let node = NodeClient::new("http://localhost:26657").unwrap();
///     let height = node.latest_block_height().await.unwrap();
///     let block = node.block(height).await.unwrap();
///     println!("{} txs at height {}", block.tx_count, block.height);
/// }
/// ```
#[derive(Debug)]
pub struct NodeClient {
    client: Client,
    base_url: Url,
}

/// A client for the exporter's plain-text metrics endpoint
#[derive(Debug)]
pub struct MetricsClient {
    client: Client,
    url: Url,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("unexpected status {status} from {url}")]
    Status { status: reqwest::StatusCode, url: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Point-in-time facts about one block, reduced to what the validation
/// checks consume. Derived once per fetch and read-only afterwards.
#[derive(Debug, Clone)]
pub struct BlockSummary {
    pub height: u64,
    pub tx_count: usize,
    /// Addresses of the validators whose signature is present in the
    /// block's last commit.
    pub signers: HashSet<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    result: StatusResult,
}

#[derive(Debug, Deserialize)]
struct StatusResult {
    sync_info: SyncInfo,
}

#[derive(Debug, Deserialize)]
struct SyncInfo {
    // CometBFT encodes heights as JSON strings
    latest_block_height: String,
}

#[derive(Debug, Deserialize)]
struct BlockResponse {
    result: BlockResult,
}

#[derive(Debug, Deserialize)]
struct BlockResult {
    block: Block,
}

#[derive(Debug, Deserialize)]
struct Block {
    header: BlockHeader,
    #[serde(default)]
    data: BlockData,
    #[serde(default)]
    last_commit: LastCommit,
}

#[derive(Debug, Deserialize)]
struct BlockHeader {
    height: String,
}

#[derive(Debug, Default, Deserialize)]
struct BlockData {
    #[serde(default)]
    txs: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LastCommit {
    #[serde(default)]
    signatures: Vec<CommitSignature>,
}

#[derive(Debug, Deserialize)]
struct CommitSignature {
    // Absent entries show up as empty strings in the commit
    #[serde(default)]
    validator_address: String,
}

#[derive(Debug, Deserialize)]
struct ValidatorsResponse {
    result: ValidatorsResult,
}

#[derive(Debug, Deserialize)]
struct ValidatorsResult {
    validators: Vec<ValidatorRecord>,
}

#[derive(Debug, Deserialize)]
struct ValidatorRecord {
    address: String,
}

fn parse_height(raw: &str, context: &str) -> Result<u64, ClientError> {
    raw.parse::<u64>().map_err(|_| {
        ClientError::InvalidResponse(format!("{context} is not a block height: {raw:?}"))
    })
}

/// Normalize a base URL so that `Url::join` treats it as a directory.
fn parse_base_url(raw: &str) -> Result<Url, ClientError> {
    let trimmed = raw.trim_end_matches('/');
    Ok(Url::parse(&format!("{trimmed}/"))?)
}

impl NodeClient {
    /// Create a new RPC client against the given base URL
    pub fn new(rpc_url: &str) -> Result<Self, ClientError> {
        let base_url = parse_base_url(rpc_url)?;
        let client = Client::builder()
            .use_rustls_tls()
            .timeout(RPC_TIMEOUT)
            .build()?;

        Ok(Self { client, base_url })
    }

    /// Perform a GET against a path relative to the RPC base URL and
    /// deserialize the JSON body
    async fn get_json<R>(&self, path: &str) -> Result<R, ClientError>
    where
        R: for<'de> Deserialize<'de>,
    {
        let url = self.base_url.join(path)?;
        let response = self.client.get(url.clone()).send().await?;

        if !response.status().is_success() {
            return Err(ClientError::Status {
                status: response.status(),
                url: url.to_string(),
            });
        }

        Ok(response.json().await?)
    }

    /// The base URL requests are issued against
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Latest block height the chain has committed, from `/status`
    pub async fn latest_block_height(&self) -> Result<u64, ClientError> {
        let status: StatusResponse = self.get_json("status").await?;
        parse_height(
            &status.result.sync_info.latest_block_height,
            "sync_info.latest_block_height",
        )
    }

    /// Fetch one block and reduce it to a [`BlockSummary`]
    pub async fn block(&self, height: u64) -> Result<BlockSummary, ClientError> {
        let response: BlockResponse = self.get_json(&format!("block?height={height}")).await?;
        let block = response.result.block;

        let signers = block
            .last_commit
            .signatures
            .into_iter()
            .map(|sig| sig.validator_address)
            .filter(|addr| !addr.is_empty())
            .collect();

        Ok(BlockSummary {
            height: parse_height(&block.header.height, "block.header.height")?,
            tx_count: block.data.txs.len(),
            signers,
        })
    }

    /// Addresses of the current validator set, from `/validators`
    pub async fn validators(&self) -> Result<Vec<String>, ClientError> {
        let response: ValidatorsResponse = self.get_json("validators").await?;
        Ok(response
            .result
            .validators
            .into_iter()
            .map(|v| v.address)
            .collect())
    }
}

impl MetricsClient {
    /// Create a new scrape client for the given metrics endpoint URL
    pub fn new(metrics_url: &str) -> Result<Self, ClientError> {
        let url = Url::parse(metrics_url)?;
        let client = Client::builder()
            .use_rustls_tls()
            .timeout(METRICS_TIMEOUT)
            .build()?;

        Ok(Self { client, url })
    }

    /// The endpoint URL scrapes are issued against
    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Fetch the raw exposition-format text
    pub async fn fetch(&self) -> Result<String, ClientError> {
        let response = self.client.get(self.url.clone()).send().await?;

        if !response.status().is_success() {
            return Err(ClientError::Status {
                status: response.status(),
                url: self.url.to_string(),
            });
        }

        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};
    use pretty_assertions::assert_eq;

    use super::*;

    const STATUS_BODY: &str = r#"{
      "jsonrpc": "2.0",
      "id": -1,
      "result": {
        "node_info": { "network": "testchain-1" },
        "sync_info": {
          "latest_block_height": "12345",
          "catching_up": false
        }
      }
    }"#;

    fn block_body(height: u64) -> String {
        format!(
            r#"{{
              "result": {{
                "block": {{
                  "header": {{ "height": "{height}", "proposer_address": "AAA" }},
                  "data": {{ "txs": ["dHgx", "dHgy"] }},
                  "last_commit": {{
                    "height": "{prev}",
                    "signatures": [
                      {{ "validator_address": "VAL1", "signature": "sig1" }},
                      {{ "validator_address": "VAL2", "signature": "sig2" }},
                      {{ "validator_address": "", "signature": null }}
                    ]
                  }}
                }}
              }}
            }}"#,
            prev = height.saturating_sub(1),
        )
    }

    #[tokio::test]
    async fn fetches_latest_block_height() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/status")
            .with_status(200)
            .with_body(STATUS_BODY)
            .create_async()
            .await;

        let client = NodeClient::new(&server.url()).unwrap();
        let height = client.latest_block_height().await.unwrap();
        assert_eq!(height, 12345);
    }

    #[tokio::test]
    async fn trailing_slash_in_base_url_is_tolerated() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/status")
            .with_status(200)
            .with_body(STATUS_BODY)
            .create_async()
            .await;

        let client = NodeClient::new(&format!("{}/", server.url())).unwrap();
        assert_eq!(client.latest_block_height().await.unwrap(), 12345);
    }

    #[tokio::test]
    async fn non_numeric_height_is_an_invalid_response() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/status")
            .with_status(200)
            .with_body(r#"{"result":{"sync_info":{"latest_block_height":"soon"}}}"#)
            .create_async()
            .await;

        let client = NodeClient::new(&server.url()).unwrap();
        let err = client.latest_block_height().await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidResponse(_)), "{err:?}");
    }

    #[tokio::test]
    async fn block_summary_drops_absent_signatures() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/block")
            .match_query(Matcher::UrlEncoded("height".into(), "7".into()))
            .with_status(200)
            .with_body(block_body(7))
            .create_async()
            .await;

        let client = NodeClient::new(&server.url()).unwrap();
        let block = client.block(7).await.unwrap();

        assert_eq!(block.height, 7);
        assert_eq!(block.tx_count, 2);
        assert_eq!(
            block.signers,
            HashSet::from(["VAL1".to_string(), "VAL2".to_string()])
        );
    }

    #[tokio::test]
    async fn block_without_txs_or_commit_summarizes_as_empty() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/block")
            .match_query(Matcher::UrlEncoded("height".into(), "1".into()))
            .with_status(200)
            .with_body(r#"{"result":{"block":{"header":{"height":"1"}}}}"#)
            .create_async()
            .await;

        let client = NodeClient::new(&server.url()).unwrap();
        let block = client.block(1).await.unwrap();

        assert_eq!(block.tx_count, 0);
        assert!(block.signers.is_empty());
    }

    #[tokio::test]
    async fn fetches_validator_addresses() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/validators")
            .with_status(200)
            .with_body(
                r#"{
                  "result": {
                    "count": "2",
                    "total": "2",
                    "validators": [
                      { "address": "VAL1", "voting_power": "100" },
                      { "address": "VAL2", "voting_power": "90" }
                    ]
                  }
                }"#,
            )
            .create_async()
            .await;

        let client = NodeClient::new(&server.url()).unwrap();
        let validators = client.validators().await.unwrap();
        assert_eq!(validators, vec!["VAL1".to_string(), "VAL2".to_string()]);
    }

    #[tokio::test]
    async fn http_error_status_surfaces_as_status_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/status")
            .with_status(500)
            .create_async()
            .await;

        let client = NodeClient::new(&server.url()).unwrap();
        let err = client.latest_block_height().await.unwrap_err();
        assert!(matches!(err, ClientError::Status { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn scrapes_metrics_text_verbatim() {
        let body = "# HELP something\nmetric_a 1\nmetric_b{x=\"y\"} 2\n";
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/metrics")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let client = MetricsClient::new(&format!("{}/metrics", server.url())).unwrap();
        assert_eq!(client.fetch().await.unwrap(), body);
    }

    #[tokio::test]
    async fn metrics_error_status_surfaces_as_status_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/metrics")
            .with_status(503)
            .create_async()
            .await;

        let client = MetricsClient::new(&format!("{}/metrics", server.url())).unwrap();
        let err = client.fetch().await.unwrap_err();
        assert!(matches!(err, ClientError::Status { .. }), "{err:?}");
    }

    #[test]
    fn rejects_unparseable_urls() {
        assert!(matches!(
            NodeClient::new("not a url").unwrap_err(),
            ClientError::UrlParse(_)
        ));
        assert!(matches!(
            MetricsClient::new("").unwrap_err(),
            ClientError::UrlParse(_)
        ));
    }
}
