//! Esplora-compatible blockchain data source.
//!
//! The SDK needs very little from the chain: the tip height, the utxo set
//! of an address, raw transactions, a fee estimate, and broadcast. All of
//! it maps onto the esplora REST surface.

use std::future::Future;

use serde::Deserialize;
use tracing::debug;

use crate::error::TransportError;

/// Fee estimate target in blocks used for backup and withdrawal
/// transactions.
const FEE_ESTIMATE_TARGET_BLOCKS: &str = "3";

/// Fee rate in sats/vB used when the chain source has no estimate.
const FALLBACK_FEE_RATE: u64 = 1;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Confirmation status of a utxo or transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TxStatus {
    /// Whether the funding transaction is in a block.
    pub confirmed: bool,
    /// Height of the containing block, when confirmed.
    #[serde(default)]
    pub block_height: Option<u32>,
}

/// One unspent output of an address.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Utxo {
    /// Funding transaction id, hex.
    pub txid: String,
    /// Output index within the funding transaction.
    pub vout: u32,
    /// Output value in satoshis.
    pub value: u64,
    /// Confirmation status.
    pub status: TxStatus,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Read and broadcast access to the blockchain.
pub trait ChainClient: Send + Sync {
    /// Current tip height.
    fn tip_height(&self) -> impl Future<Output = Result<u32, TransportError>> + Send;

    /// All unspent outputs paying to `address`.
    fn address_utxos(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<Vec<Utxo>, TransportError>> + Send;

    /// Raw transaction by id, consensus-encoded hex.
    fn tx_hex(&self, txid: &str) -> impl Future<Output = Result<String, TransportError>> + Send;

    /// Confirmation status of a transaction.
    fn tx_status(&self, txid: &str)
        -> impl Future<Output = Result<TxStatus, TransportError>> + Send;

    /// Fee rate estimate in sats/vB. Falls back to a floor rate when the
    /// source has no estimate for the target.
    fn fee_rate(&self) -> impl Future<Output = Result<u64, TransportError>> + Send;

    /// Broadcasts a consensus-encoded transaction. Returns its txid.
    fn broadcast_tx(
        &self,
        tx_hex: &str,
    ) -> impl Future<Output = Result<String, TransportError>> + Send;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// `reqwest`-backed [`ChainClient`] against an esplora REST endpoint.
#[derive(Debug, Clone)]
pub struct EsploraClient {
    base_url: String,
    http: reqwest::Client,
}

impl EsploraClient {
    /// Creates a client for the esplora instance at `base_url` (no
    /// trailing slash).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get_text(&self, path: &str) -> Result<String, TransportError> {
        let url = self.url(path);
        debug!(%url, "esplora GET");
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

impl ChainClient for EsploraClient {
    async fn tip_height(&self) -> Result<u32, TransportError> {
        let body = self.get_text("blocks/tip/height").await?;
        body.trim()
            .parse()
            .map_err(|_| TransportError::Decode(format!("bad tip height: {body}")))
    }

    async fn address_utxos(&self, address: &str) -> Result<Vec<Utxo>, TransportError> {
        let body = self.get_text(&format!("address/{address}/utxo")).await?;
        serde_json::from_str(&body).map_err(|e| TransportError::Decode(e.to_string()))
    }

    async fn tx_hex(&self, txid: &str) -> Result<String, TransportError> {
        self.get_text(&format!("tx/{txid}/hex")).await
    }

    async fn tx_status(&self, txid: &str) -> Result<TxStatus, TransportError> {
        let body = self.get_text(&format!("tx/{txid}/status")).await?;
        serde_json::from_str(&body).map_err(|e| TransportError::Decode(e.to_string()))
    }

    async fn fee_rate(&self) -> Result<u64, TransportError> {
        let body = self.get_text("fee-estimates").await?;
        let estimates: std::collections::HashMap<String, f64> =
            serde_json::from_str(&body).map_err(|e| TransportError::Decode(e.to_string()))?;
        let rate = estimates
            .get(FEE_ESTIMATE_TARGET_BLOCKS)
            .map(|r| r.ceil() as u64)
            .unwrap_or(FALLBACK_FEE_RATE);
        Ok(rate.max(FALLBACK_FEE_RATE))
    }

    async fn broadcast_tx(&self, tx_hex: &str) -> Result<String, TransportError> {
        let url = self.url("tx");
        debug!(%url, "esplora broadcast");
        let response = self.http.post(&url).body(tx_hex.to_owned()).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body.trim().to_owned())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utxo_parses_esplora_shape() {
        let json = r#"[{
            "txid": "ab12",
            "vout": 1,
            "value": 50000,
            "status": { "confirmed": true, "block_height": 101 }
        }]"#;
        let utxos: Vec<Utxo> = serde_json::from_str(json).unwrap();
        assert_eq!(utxos.len(), 1);
        assert_eq!(utxos[0].value, 50_000);
        assert_eq!(utxos[0].status.block_height, Some(101));
    }

    #[test]
    fn unconfirmed_utxo_has_no_height() {
        let json = r#"{ "txid": "cd34", "vout": 0, "value": 1000, "status": { "confirmed": false } }"#;
        let utxo: Utxo = serde_json::from_str(json).unwrap();
        assert!(!utxo.status.confirmed);
        assert_eq!(utxo.status.block_height, None);
    }
}
