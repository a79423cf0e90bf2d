//! Etherscan-compatible explorer API (v2, chain selected by `chainid`)

use std::time::{Duration, Instant};

use alloy::primitives::{Address, B256, U256};
use alloy_json_abi::JsonAbi;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use super::{Explorer, ExplorerTx, VerifiedSource};

pub const DEFAULT_EXPLORER_URL: &str = "https://api.etherscan.io/v2/api";

/// Free-tier keys allow 5 requests per second
const MIN_REQUEST_SPACING: Duration = Duration::from_millis(200);

/// Envelope shared by every Etherscan endpoint
#[derive(Debug, Deserialize)]
struct Envelope {
    status: String,
    message: String,
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTx {
    block_number: String,
    time_stamp: String,
    hash: String,
    from: String,
    #[serde(default)]
    to: String,
    value: String,
    gas_used: String,
    #[serde(default)]
    is_error: String,
    #[serde(default)]
    function_name: String,
    #[serde(default)]
    contract_address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawSource {
    #[serde(default)]
    source_code: String,
    #[serde(default)]
    contract_name: String,
    #[serde(default)]
    compiler_version: String,
    #[serde(rename = "ABI", default)]
    abi: String,
}

pub struct EtherscanClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    chain_id: u64,
    last_request: Mutex<Option<Instant>>,
}

impl EtherscanClient {
    pub fn new(base_url: &str, api_key: &str, chain_id: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
            chain_id,
            last_request: Mutex::new(None),
        })
    }

    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let wait = MIN_REQUEST_SPACING.saturating_sub(previous.elapsed());
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn get(&self, module: &str, action: &str, extra: &str) -> Result<Envelope> {
        self.throttle().await;
        let url = format!(
            "{}?chainid={}&module={}&action={}{}&apikey={}",
            self.base_url, self.chain_id, module, action, extra, self.api_key
        );
        debug!(%module, %action, chain_id = self.chain_id, "explorer request");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to query explorer ({} {})", module, action))?;
        let status = response.status();
        if !status.is_success() {
            bail!("explorer returned HTTP {} for {} {}", status, module, action);
        }
        response
            .json::<Envelope>()
            .await
            .context("Failed to parse explorer response")
    }
}

#[async_trait::async_trait]
impl Explorer for EtherscanClient {
    async fn transactions(&self, address: Address) -> Result<Vec<ExplorerTx>> {
        let extra = format!("&address={}&startblock=0&endblock=99999999&sort=asc", address);
        let envelope = self.get("account", "txlist", &extra).await?;
        parse_tx_list(envelope).with_context(|| format!("transaction list of {}", address))
    }

    async fn verified_source(&self, address: Address) -> Result<Option<VerifiedSource>> {
        let extra = format!("&address={}", address);
        let envelope = self.get("contract", "getsourcecode", &extra).await?;
        parse_source(envelope).with_context(|| format!("verified source of {}", address))
    }
}

fn api_error(envelope: &Envelope) -> anyhow::Error {
    match envelope.result.as_str() {
        Some(detail) if !detail.is_empty() => {
            anyhow::anyhow!("explorer error: {} ({})", envelope.message, detail)
        }
        _ => anyhow::anyhow!("explorer error: {}", envelope.message),
    }
}

fn parse_tx_list(envelope: Envelope) -> Result<Vec<ExplorerTx>> {
    if envelope.status != "1" {
        if envelope.message.starts_with("No transactions found") {
            return Ok(Vec::new());
        }
        return Err(api_error(&envelope));
    }

    let raw: Vec<RawTx> =
        serde_json::from_value(envelope.result).context("Unexpected transaction list shape")?;
    raw.into_iter().map(convert_tx).collect()
}

fn convert_tx(raw: RawTx) -> Result<ExplorerTx> {
    let hash: B256 = raw
        .hash
        .parse()
        .with_context(|| format!("bad transaction hash '{}'", raw.hash))?;
    Ok(ExplorerTx {
        hash,
        block_number: raw.block_number.parse().context("bad block number")?,
        timestamp: raw.time_stamp.parse().context("bad timestamp")?,
        from: raw.from.parse().context("bad sender address")?,
        to: optional_address(&raw.to)?,
        value: raw.value.parse::<U256>().context("bad value")?,
        gas_used: raw.gas_used.parse().context("bad gas used")?,
        failed: raw.is_error == "1",
        function: Some(raw.function_name).filter(|name| !name.is_empty()),
        contract_created: optional_address(&raw.contract_address)?,
    })
}

fn optional_address(raw: &str) -> Result<Option<Address>> {
    if raw.is_empty() {
        return Ok(None);
    }
    let address = raw
        .parse::<Address>()
        .with_context(|| format!("bad address '{}'", raw))?;
    Ok(Some(address))
}

fn parse_source(envelope: Envelope) -> Result<Option<VerifiedSource>> {
    if envelope.status != "1" {
        return Err(api_error(&envelope));
    }

    let entries: Vec<RawSource> =
        serde_json::from_value(envelope.result).context("Unexpected source response shape")?;
    let Some(raw) = entries.into_iter().next() else {
        return Ok(None);
    };
    if raw.source_code.is_empty() {
        return Ok(None);
    }

    // Unverified contracts carry a message instead of JSON in the ABI field
    let abi = serde_json::from_str::<JsonAbi>(&raw.abi).ok();
    Ok(Some(VerifiedSource {
        contract_name: raw.contract_name,
        compiler_version: raw.compiler_version,
        source_code: raw.source_code,
        abi,
    }))
}
