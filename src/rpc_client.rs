//! JSON-RPC [`LedgerClient`] for a hosted ledger backend
//!
//! The backend exposes four methods:
//!
//! | method       | params                 | result                  |
//! |--------------|------------------------|-------------------------|
//! | `getUtxosAt` | `[address]`            | array of UTXO objects   |
//! | `currentSlot`| `[]`                   | slot number             |
//! | `submit`     | `[signed tx]`          | transaction id (hex)    |
//! | `txStatus`   | `[tx id]`              | `{"status": ...}`       |
//!
//! Submission failures are reported through JSON-RPC error codes: `-32001` for
//! script evaluation failures, `-32002` for other ledger-rule rejections.
//!
//! # Example
//!
//! ```ignore
//! use scriptflow::{DriverConfig, RpcLedgerClient};
//!
//! let config = DriverConfig::from_file("scriptflow.toml")?;
//! let client = RpcLedgerClient::new(config)?;
//! let slot = client.current_slot()?;
//! ```

use crate::client::{ClientResult, LedgerClient, TxStatus};
use crate::config::{DriverConfig, Network};
use crate::error::ClientError;
use crate::ledger::{Address, Slot, TxId, Utxo};
use crate::signer::SignedTx;
use serde::de::DeserializeOwned;
use serde_json::value::RawValue;
use tracing::debug;

/// Error code for script evaluation failures
pub const SCRIPT_FAILURE_CODE: i32 = -32001;
/// Error code for other ledger-rule rejections
pub const REJECTED_CODE: i32 = -32002;

/// JSON-RPC client for a ledger backend
pub struct RpcLedgerClient {
    client: jsonrpc::Client,
    config: DriverConfig,
}

impl RpcLedgerClient {
    /// Create a new client from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the backend URL is invalid.
    pub fn new(config: DriverConfig) -> Result<Self, ClientError> {
        let transport = jsonrpc::simple_http::SimpleHttpTransport::builder()
            .url(&config.backend.url)
            .map_err(|e| ClientError::Transport(format!("Invalid backend URL: {e}")))?
            .auth(&config.backend.user, Some(&config.backend.password))
            .build();

        Ok(Self {
            client: jsonrpc::Client::with_transport(transport),
            config,
        })
    }

    /// Create from a config file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or the URL is invalid.
    pub fn from_config_file(path: &str) -> Result<Self, ClientError> {
        let config = DriverConfig::from_file(path)
            .map_err(|e| ClientError::Transport(format!("Config error: {e}")))?;
        Self::new(config)
    }

    /// Create from URL and credentials on the given network
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn from_url(network: Network, url: &str, user: &str, password: &str) -> Result<Self, ClientError> {
        Self::new(DriverConfig::for_network(network).with_backend(url, user, password))
    }

    #[must_use]
    pub const fn config(&self) -> &DriverConfig {
        &self.config
    }

    fn call<T: DeserializeOwned>(&self, method: &str, params: &[serde_json::Value]) -> ClientResult<T> {
        let params_json = serde_json::to_string(params)
            .map_err(|e| ClientError::Decode(format!("Failed to serialize params: {e}")))?;
        let raw_params = RawValue::from_string(params_json)
            .map_err(|e| ClientError::Decode(format!("Failed to create raw value: {e}")))?;

        debug!(method, "backend call");
        let request = self.client.build_request(method, Some(&raw_params));
        let response = self
            .client
            .send_request(request)
            .map_err(|e| ClientError::Transport(format!("RPC request failed: {e}")))?;

        response.result().map_err(classify)
    }
}

/// Map JSON-RPC errors onto ledger outcomes
fn classify(error: jsonrpc::Error) -> ClientError {
    match error {
        jsonrpc::Error::Rpc(rpc) if rpc.code == SCRIPT_FAILURE_CODE => ClientError::ScriptFailure(rpc.message),
        jsonrpc::Error::Rpc(rpc) if rpc.code == REJECTED_CODE => ClientError::Rejected(rpc.message),
        jsonrpc::Error::Json(e) => ClientError::Decode(e.to_string()),
        other => ClientError::Transport(other.to_string()),
    }
}

fn to_param<T: serde::Serialize>(value: &T) -> ClientResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| ClientError::Decode(e.to_string()))
}

impl LedgerClient for RpcLedgerClient {
    fn utxos_at(&self, address: &Address) -> ClientResult<Vec<Utxo>> {
        self.call("getUtxosAt", &[to_param(address)?])
    }

    fn current_slot(&self) -> ClientResult<Slot> {
        self.call("currentSlot", &[])
    }

    fn submit(&self, tx: &SignedTx) -> ClientResult<TxId> {
        self.call("submit", &[to_param(tx)?])
    }

    fn tx_status(&self, tx_id: &TxId) -> ClientResult<TxStatus> {
        self.call("txStatus", &[to_param(tx_id)?])
    }
}

impl std::fmt::Debug for RpcLedgerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcLedgerClient")
            .field("url", &self.config.backend.url)
            .field("network", &self.config.network())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rpc_error(code: i32, message: &str) -> jsonrpc::Error {
        jsonrpc::Error::Rpc(jsonrpc::error::RpcError {
            code,
            message: message.to_string(),
            data: None,
        })
    }

    #[test]
    fn test_classify_codes() {
        assert!(matches!(
            classify(rpc_error(SCRIPT_FAILURE_CODE, "branch failed")),
            ClientError::ScriptFailure(m) if m == "branch failed"
        ));
        assert!(matches!(
            classify(rpc_error(REJECTED_CODE, "bad inputs")),
            ClientError::Rejected(m) if m == "bad inputs"
        ));
        assert!(matches!(classify(rpc_error(-32600, "invalid")), ClientError::Transport(_)));
    }

    #[test]
    fn test_new_client() {
        let client = RpcLedgerClient::from_url(Network::Preview, "http://127.0.0.1:8090", "u", "p").unwrap();
        assert_eq!(client.config().network(), Network::Preview);
        assert!(format!("{client:?}").contains("127.0.0.1:8090"));
    }

    #[test]
    fn test_status_wire_shape() {
        let status: TxStatus = serde_json::from_str(r#"{"status":"included","slot":42}"#).unwrap();
        assert_eq!(status, TxStatus::Included { slot: Slot(42) });
        let status: TxStatus = serde_json::from_str(r#"{"status":"pending"}"#).unwrap();
        assert_eq!(status, TxStatus::Pending);
    }
}
