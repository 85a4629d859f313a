//! Field extraction from consensus-encoded transactions.
//!
//! Backup transactions travel as hex strings; everything the engines
//! need from them (spend source, locktime, output value, payee, fee
//! rate) is read here. No signing or curve math happens in this module.

use bitcoin::address::NetworkUnchecked;
use bitcoin::{Address, Transaction};
use sdk_core::Network;

use crate::error::ClientError;

/// Decodes a consensus-encoded transaction from hex.
pub fn decode(tx_hex: &str) -> Result<Transaction, ClientError> {
    let bytes = hex::decode(tx_hex)
        .map_err(|e| ClientError::InvalidTransaction(format!("bad hex: {e}")))?;
    bitcoin::consensus::encode::deserialize(&bytes)
        .map_err(|e| ClientError::InvalidTransaction(format!("bad encoding: {e}")))
}

/// The outpoint spent by the transaction's first input, as `(txid, vout)`.
///
/// Backup and withdrawal transactions always have exactly one input.
pub fn previous_outpoint(tx_hex: &str) -> Result<(String, u32), ClientError> {
    let tx = decode(tx_hex)?;
    let input = tx
        .input
        .first()
        .ok_or_else(|| ClientError::InvalidTransaction("no inputs".into()))?;
    Ok((
        input.previous_output.txid.to_string(),
        input.previous_output.vout,
    ))
}

/// The transaction's absolute locktime as a block height.
pub fn locktime(tx_hex: &str) -> Result<u32, ClientError> {
    let tx = decode(tx_hex)?;
    Ok(tx.lock_time.to_consensus_u32())
}

/// Value in satoshis of the output at `vout`.
pub fn output_value(tx_hex: &str, vout: u32) -> Result<u64, ClientError> {
    let tx = decode(tx_hex)?;
    let output = tx
        .output
        .get(vout as usize)
        .ok_or_else(|| ClientError::InvalidTransaction(format!("no output {vout}")))?;
    Ok(output.value.to_sat())
}

/// Address of the output at `vout`.
pub fn output_address(tx_hex: &str, vout: u32, network: Network) -> Result<String, ClientError> {
    let tx = decode(tx_hex)?;
    let output = tx
        .output
        .get(vout as usize)
        .ok_or_else(|| ClientError::InvalidTransaction(format!("no output {vout}")))?;
    let address = Address::from_script(&output.script_pubkey, network.to_bitcoin())
        .map_err(|e| ClientError::InvalidTransaction(format!("unaddressable output: {e}")))?;
    Ok(address.to_string())
}

/// Whether the transaction's first output pays the given address.
pub fn pays_to_address(tx_hex: &str, address: &str, network: Network) -> Result<bool, ClientError> {
    let tx = decode(tx_hex)?;
    let parsed: Address<NetworkUnchecked> = address
        .parse()
        .map_err(|e| ClientError::InvalidTransaction(format!("bad address: {e}")))?;
    let parsed = parsed
        .require_network(network.to_bitcoin())
        .map_err(|e| ClientError::InvalidTransaction(format!("wrong network: {e}")))?;
    let Some(output) = tx.output.first() else {
        return Ok(false);
    };
    Ok(output.script_pubkey == parsed.script_pubkey())
}

/// Fee rate in sat/vB given the value of the spent funding output.
/// Rounds up, so a rate limit check errs on the strict side.
pub fn fee_rate(tx_hex: &str, funding_value: u64) -> Result<u64, ClientError> {
    let tx = decode(tx_hex)?;
    let out_total: u64 = tx.output.iter().map(|o| o.value.to_sat()).sum();
    let fee = funding_value
        .checked_sub(out_total)
        .ok_or_else(|| ClientError::InvalidTransaction("outputs exceed funding value".into()))?;
    let vsize = tx.vsize() as u64;
    if vsize == 0 {
        return Err(ClientError::InvalidTransaction("zero vsize".into()));
    }
    Ok(fee.div_ceil(vsize))
}
