//! Backup transaction chain management.
//!
//! A statechain's stored record set can span several physical deposits.
//! [`group`] partitions the flat set into one exit chain per funding
//! outpoint, [`validate`] checks a single chain's pairwise invariants,
//! and [`extend`] appends the next hop. The flat set round-trips through
//! `group` unchanged apart from ordering.

use transport::entity::BackupTx;

use crate::error::ClientError;
use crate::tx;

/// Partitions backup transactions into exit chains, one per funding
/// outpoint. Groups come back in first-appearance order of their
/// outpoint; inside a group transactions sort by ascending `tx_n`.
pub fn group(txs: &[BackupTx]) -> Result<Vec<Vec<BackupTx>>, ClientError> {
    let mut outpoints: Vec<(String, u32)> = Vec::new();
    let mut groups: Vec<Vec<BackupTx>> = Vec::new();
    for record in txs {
        let outpoint = tx::previous_outpoint(&record.tx)?;
        match outpoints.iter().position(|o| *o == outpoint) {
            Some(i) => groups[i].push(record.clone()),
            None => {
                outpoints.push(outpoint);
                groups.push(vec![record.clone()]);
            }
        }
    }
    for chain in &mut groups {
        chain.sort_by_key(|t| t.tx_n);
    }
    Ok(groups)
}

/// Validates one exit chain pairwise.
///
/// Every transaction must spend the same funding outpoint, `tx_n` must
/// strictly increase, and each hop's locktime must be exactly `interval`
/// blocks below its predecessor's. Any violation means a corrupt or
/// maliciously reordered chain.
pub fn validate(chain: &[BackupTx], interval: u32) -> Result<(), ClientError> {
    for pair in chain.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if tx::previous_outpoint(&prev.tx)? != tx::previous_outpoint(&next.tx)? {
            return Err(ClientError::ChainSpendSourceMismatch);
        }
        if next.tx_n <= prev.tx_n {
            return Err(ClientError::ChainSequenceNotIncreasing);
        }
        let prev_locktime = tx::locktime(&prev.tx)?;
        let next_locktime = tx::locktime(&next.tx)?;
        let expected = prev_locktime.saturating_sub(interval);
        if next_locktime != expected {
            return Err(ClientError::ChainLocktimeStep {
                expected,
                found: next_locktime,
            });
        }
    }
    Ok(())
}

/// Appends one transaction to a chain with `tx_n = max existing + 1`.
pub fn extend(chain: &mut Vec<BackupTx>, mut record: BackupTx) {
    let next_n = chain.iter().map(|t| t.tx_n).max().unwrap_or(0) + 1;
    record.tx_n = next_n;
    chain.push(record);
}

/// The funding outpoint a chain spends (from its first transaction).
pub fn funding_outpoint(chain: &[BackupTx]) -> Result<(String, u32), ClientError> {
    let first = chain
        .first()
        .ok_or_else(|| ClientError::InvalidTransaction("empty chain".into()))?;
    tx::previous_outpoint(&first.tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::tests::make_tx;
    use bitcoin::ScriptBuf;

    fn record(tx_n: u32, prev_byte: u8, height: u32) -> BackupTx {
        BackupTx {
            tx_n,
            tx: make_tx(prev_byte, 0, 1_000, height, ScriptBuf::new()),
            client_public_nonce: "aa".into(),
            server_public_nonce: "bb".into(),
            client_public_key: "cc".into(),
            server_public_key: "dd".into(),
            blinding_factor: "ee".into(),
        }
    }

    #[test]
    fn group_partitions_by_outpoint_in_first_seen_order() {
        let txs = vec![
            record(2, 0x01, 900),
            record(1, 0x02, 1_000),
            record(1, 0x01, 1_000),
            record(2, 0x02, 900),
            record(1, 0x03, 1_000),
        ];
        let groups = group(&txs).unwrap();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].iter().map(|t| t.tx_n).collect::<Vec<_>>(), [1, 2]);
        assert_eq!(groups[1].iter().map(|t| t.tx_n).collect::<Vec<_>>(), [1, 2]);
        assert_eq!(groups[2].len(), 1);
        // First-seen outpoint order: 0x01, 0x02, 0x03.
        assert_eq!(funding_outpoint(&groups[0]).unwrap().0[..2], *"01");
        assert_eq!(funding_outpoint(&groups[1]).unwrap().0[..2], *"02");
    }

    #[test]
    fn repeated_extend_always_validates() {
        let mut chain = vec![record(1, 0x01, 1_000)];
        for hop in 1..4u32 {
            extend(&mut chain, record(0, 0x01, 1_000 - hop * 100));
        }
        assert_eq!(
            chain.iter().map(|t| t.tx_n).collect::<Vec<_>>(),
            [1, 2, 3, 4]
        );
        validate(&chain, 100).unwrap();
    }

    #[test]
    fn validate_rejects_foreign_spend_source() {
        let chain = vec![record(1, 0x01, 1_000), record(2, 0x02, 900)];
        assert!(matches!(
            validate(&chain, 100),
            Err(ClientError::ChainSpendSourceMismatch)
        ));
    }

    #[test]
    fn validate_rejects_non_increasing_sequence() {
        let chain = vec![record(2, 0x01, 1_000), record(2, 0x01, 900)];
        assert!(matches!(
            validate(&chain, 100),
            Err(ClientError::ChainSequenceNotIncreasing)
        ));
    }

    #[test]
    fn validate_rejects_broken_locktime_step() {
        let chain = vec![record(1, 0x01, 1_000), record(2, 0x01, 950)];
        let err = validate(&chain, 100).unwrap_err();
        assert!(matches!(
            err,
            ClientError::ChainLocktimeStep {
                expected: 900,
                found: 950,
            }
        ));
    }

    #[test]
    fn flat_set_round_trips_through_group() {
        let txs = vec![record(1, 0x01, 1_000), record(2, 0x01, 900)];
        let groups = group(&txs).unwrap();
        let flat: Vec<BackupTx> = groups.into_iter().flatten().collect();
        assert_eq!(flat, txs);
    }
}
