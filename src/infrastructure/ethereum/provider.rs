//! Ledger client abstraction and the Alloy implementation
//!
//! Everything the exploit script and `inspect` need from a node goes
//! through [`LedgerClient`], so the runner can be driven by an
//! in-memory ledger in tests.

use std::path::PathBuf;

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use anyhow::{bail, Context, Result};
use tracing::debug;

use crate::infrastructure::ethereum::types::Receipt;

/// Provider configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderConfig {
    /// HTTP JSON-RPC endpoint
    Http(String),
    /// WebSocket endpoint
    WebSocket(String),
    /// IPC socket path (Unix only)
    #[cfg(unix)]
    Ipc(PathBuf),
}

impl ProviderConfig {
    /// Get display name for this endpoint
    pub fn display(&self) -> String {
        match self {
            ProviderConfig::Http(url) => url.clone(),
            ProviderConfig::WebSocket(url) => url.clone(),
            #[cfg(unix)]
            ProviderConfig::Ipc(path) => path.display().to_string(),
        }
    }

    /// WebSocket endpoint; only ws and wss are accepted
    pub fn websocket(url: &str) -> Result<Self> {
        match Self::from_url(url)? {
            ws @ ProviderConfig::WebSocket(_) => Ok(ws),
            _ => bail!("WebSocket endpoint '{}' must use ws:// or wss://", url.trim()),
        }
    }

    /// Pick a transport from the URL scheme (ws/wss vs http/https)
    pub fn from_url(url: &str) -> Result<Self> {
        let url = url.trim();
        let lower = url.to_ascii_lowercase();
        if lower.starts_with("ws://") || lower.starts_with("wss://") {
            Ok(ProviderConfig::WebSocket(url.to_string()))
        } else if lower.starts_with("http://") || lower.starts_with("https://") {
            Ok(ProviderConfig::Http(url.to_string()))
        } else {
            bail!(
                "unsupported RPC URL '{}'. Only http, https, ws, wss are allowed",
                url
            )
        }
    }
}

/// Remote ledger operations used by the runner
///
/// Reads are side-effect free. `send_transaction` returns once the node
/// has accepted the transaction; finalization is observed separately
/// through `get_receipt`.
#[async_trait::async_trait]
pub trait LedgerClient: Send + Sync {
    /// Address that signs writes (None for read-only clients)
    fn identity(&self) -> Option<Address>;

    /// Get endpoint display name
    fn endpoint_name(&self) -> String;

    /// Get the chain id
    async fn chain_id(&self) -> Result<u64>;

    /// Get account balance in wei
    async fn get_balance(&self, address: Address) -> Result<U256>;

    /// Get storage at a specific slot
    async fn get_storage_at(&self, address: Address, slot: U256) -> Result<B256>;

    /// Get deployed code
    async fn get_code(&self, address: Address) -> Result<Bytes>;

    /// Get the account nonce
    async fn get_transaction_count(&self, address: Address) -> Result<u64>;

    /// Execute a call (eth_call) from our identity
    async fn call(&self, to: Address, input: Bytes) -> Result<Bytes>;

    /// Sign and submit a transaction, returning its hash
    async fn send_transaction(&self, to: Address, input: Bytes) -> Result<B256>;

    /// Get transaction receipt (None while pending)
    async fn get_receipt(&self, hash: B256) -> Result<Option<Receipt>>;
}

/// Alloy-backed ledger client
pub struct AlloyLedger {
    provider: DynProvider,
    identity: Option<Address>,
    endpoint: String,
}

// Each transport yields a different provider type; erase them all
macro_rules! connect_erased {
    ($builder:expr, $config:expr) => {
        match $config {
            ProviderConfig::Http(url) => {
                let rpc_url = url.parse().context("Invalid HTTP URL")?;
                $builder.connect_http(rpc_url).erased()
            }
            ProviderConfig::WebSocket(url) => $builder
                .connect(url)
                .await
                .context("Failed to create WebSocket provider")?
                .erased(),
            #[cfg(unix)]
            ProviderConfig::Ipc(path) => {
                use alloy::providers::IpcConnect;
                let ipc = IpcConnect::new(path.to_string_lossy().to_string());
                $builder
                    .connect_ipc(ipc)
                    .await
                    .context("Failed to create IPC provider")?
                    .erased()
            }
        }
    };
}

impl AlloyLedger {
    /// Connect with a local signer; writes are signed with `signer`
    pub async fn connect(config: &ProviderConfig, signer: PrivateKeySigner) -> Result<Self> {
        let identity = signer.address();
        let provider = connect_erased!(ProviderBuilder::new().wallet(signer), config);
        Ok(Self {
            provider,
            identity: Some(identity),
            endpoint: config.display(),
        })
    }

    /// Connect without a signer; only reads are possible
    pub async fn connect_read_only(config: &ProviderConfig) -> Result<Self> {
        let provider = connect_erased!(ProviderBuilder::new(), config);
        Ok(Self {
            provider,
            identity: None,
            endpoint: config.display(),
        })
    }
}

#[async_trait::async_trait]
impl LedgerClient for AlloyLedger {
    fn identity(&self) -> Option<Address> {
        self.identity
    }

    fn endpoint_name(&self) -> String {
        self.endpoint.clone()
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(self.provider.get_chain_id().await?)
    }

    async fn get_balance(&self, address: Address) -> Result<U256> {
        debug!(%address, "eth_getBalance");
        Ok(self.provider.get_balance(address).await?)
    }

    async fn get_storage_at(&self, address: Address, slot: U256) -> Result<B256> {
        debug!(%address, %slot, "eth_getStorageAt");
        let value = self.provider.get_storage_at(address, slot).await?;
        Ok(B256::from(value))
    }

    async fn get_code(&self, address: Address) -> Result<Bytes> {
        debug!(%address, "eth_getCode");
        Ok(self.provider.get_code_at(address).await?)
    }

    async fn get_transaction_count(&self, address: Address) -> Result<u64> {
        debug!(%address, "eth_getTransactionCount");
        Ok(self.provider.get_transaction_count(address).await?)
    }

    async fn call(&self, to: Address, input: Bytes) -> Result<Bytes> {
        debug!(%to, input = ?input, "eth_call");
        let mut request = TransactionRequest::default().with_to(to).with_input(input);
        if let Some(from) = self.identity {
            request = request.with_from(from);
        }
        Ok(self.provider.call(request).await?)
    }

    async fn send_transaction(&self, to: Address, input: Bytes) -> Result<B256> {
        let Some(from) = self.identity else {
            bail!("no signer configured for {}", self.endpoint);
        };
        debug!(%from, %to, input = ?input, "eth_sendRawTransaction");
        let request = TransactionRequest::default()
            .with_from(from)
            .with_to(to)
            .with_input(input);
        let pending = self.provider.send_transaction(request).await?;
        Ok(*pending.tx_hash())
    }

    async fn get_receipt(&self, hash: B256) -> Result<Option<Receipt>> {
        let receipt = self.provider.get_transaction_receipt(hash).await?;
        Ok(receipt.as_ref().map(Receipt::from))
    }
}
