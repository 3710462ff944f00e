// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// INTERCLEAR - AUDIT LOG
//
// Append-only record of every state transition, indexed three ways:
// by id (primary), by timestamp (range queries), by event type (filter).
// A single persisted counter is the authoritative id source.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::{unix_now, CoordinationError};
use icl_store::{keys, KvStore, KvStoreExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Closed set of state-transition tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEventType {
    VoteSubmitted,
    ConsensusReached,
    TransferConfirmed,
    TransferRejected,
    CreditIssued,
    CreditTransferred,
    CreditBurned,
    CommandGenerated,
    CommandSigned,
    ThresholdReached,
    CommandExecuted,
    NettingCompleted,
    NettingFailed,
    ValidatorSetUpdated,
}

impl AuditEventType {
    /// Stable snake_case tag used in the type index and on the RPC wire.
    pub fn tag(&self) -> &'static str {
        match self {
            AuditEventType::VoteSubmitted => "vote_submitted",
            AuditEventType::ConsensusReached => "consensus_reached",
            AuditEventType::TransferConfirmed => "transfer_confirmed",
            AuditEventType::TransferRejected => "transfer_rejected",
            AuditEventType::CreditIssued => "credit_issued",
            AuditEventType::CreditTransferred => "credit_transferred",
            AuditEventType::CreditBurned => "credit_burned",
            AuditEventType::CommandGenerated => "command_generated",
            AuditEventType::CommandSigned => "command_signed",
            AuditEventType::ThresholdReached => "threshold_reached",
            AuditEventType::CommandExecuted => "command_executed",
            AuditEventType::NettingCompleted => "netting_completed",
            AuditEventType::NettingFailed => "netting_failed",
            AuditEventType::ValidatorSetUpdated => "validator_set_updated",
        }
    }

    /// Parse a wire tag back into the enum (RPC filter queries).
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "vote_submitted" => Some(AuditEventType::VoteSubmitted),
            "consensus_reached" => Some(AuditEventType::ConsensusReached),
            "transfer_confirmed" => Some(AuditEventType::TransferConfirmed),
            "transfer_rejected" => Some(AuditEventType::TransferRejected),
            "credit_issued" => Some(AuditEventType::CreditIssued),
            "credit_transferred" => Some(AuditEventType::CreditTransferred),
            "credit_burned" => Some(AuditEventType::CreditBurned),
            "command_generated" => Some(AuditEventType::CommandGenerated),
            "command_signed" => Some(AuditEventType::CommandSigned),
            "threshold_reached" => Some(AuditEventType::ThresholdReached),
            "command_executed" => Some(AuditEventType::CommandExecuted),
            "netting_completed" => Some(AuditEventType::NettingCompleted),
            "netting_failed" => Some(AuditEventType::NettingFailed),
            "validator_set_updated" => Some(AuditEventType::ValidatorSetUpdated),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Assigned on append; 0 until then
    pub id: u64,
    pub event_type: AuditEventType,
    pub transfer_id: Option<String>,
    pub details: BTreeMap<String, String>,
    /// Unix seconds; filled with the current time when the writer left 0
    pub timestamp: u64,
    pub block_height: u64,
}

impl AuditEntry {
    pub fn new(event_type: AuditEventType, block_height: u64) -> Self {
        Self {
            id: 0,
            event_type,
            transfer_id: None,
            details: BTreeMap::new(),
            timestamp: 0,
            block_height,
        }
    }

    pub fn with_transfer(mut self, transfer_id: &str) -> Self {
        self.transfer_id = Some(transfer_id.to_string());
        self
    }

    pub fn with_detail(mut self, key: &str, value: impl ToString) -> Self {
        self.details.insert(key.to_string(), value.to_string());
        self
    }
}

/// Append-only audit log over the shared store.
pub struct AuditLog {
    store: Arc<dyn KvStore>,
}

impl AuditLog {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Append an entry, assigning the next strictly-increasing id and
    /// defaulting a zero timestamp to the current time.
    pub fn append(&self, mut entry: AuditEntry) -> Result<u64, CoordinationError> {
        let id = self.count()? + 1;
        entry.id = id;
        if entry.timestamp == 0 {
            entry.timestamp = unix_now();
        }

        self.store.put_obj(&keys::audit_by_id(id), &entry)?;
        self.store.put(
            &keys::audit_by_time(entry.timestamp, id),
            &id.to_be_bytes(),
        )?;
        self.store.put(
            &keys::audit_by_type(entry.event_type.tag(), id),
            &id.to_be_bytes(),
        )?;
        self.store.put(keys::AUDIT_COUNTER, &id.to_be_bytes())?;
        Ok(id)
    }

    /// Append for writers whose own state transition must not fail on a
    /// logging error: failures are logged at error severity and dropped.
    pub fn record(&self, entry: AuditEntry) -> Option<u64> {
        let tag = entry.event_type.tag();
        match self.append(entry) {
            Ok(id) => Some(id),
            Err(e) => {
                log::error!("audit append failed for {}: {}", tag, e);
                None
            }
        }
    }

    pub fn get_by_id(&self, id: u64) -> Result<Option<AuditEntry>, CoordinationError> {
        Ok(self.store.get_obj(&keys::audit_by_id(id))?)
    }

    /// Entries with `start <= timestamp <= end`, ascending by id within
    /// each second.
    pub fn range_by_time(
        &self,
        start: u64,
        end: u64,
    ) -> Result<Vec<AuditEntry>, CoordinationError> {
        if start > end {
            return Ok(Vec::new());
        }
        let (lo, hi) = keys::audit_time_range(start, end);
        let mut entries = Vec::new();
        for (_, value) in self.store.scan_range(&lo, &hi)? {
            if let Some(entry) = self.get_by_id(decode_id(&value)?)? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    pub fn filter_by_type(
        &self,
        event_type: AuditEventType,
    ) -> Result<Vec<AuditEntry>, CoordinationError> {
        let prefix = keys::audit_type_prefix(event_type.tag());
        let mut entries = Vec::new();
        for (_, value) in self.store.scan_prefix(&prefix)? {
            if let Some(entry) = self.get_by_id(decode_id(&value)?)? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Entries referencing one transfer id. No dedicated index; walks
    /// the primary index in id order.
    pub fn filter_by_transfer_id(
        &self,
        transfer_id: &str,
    ) -> Result<Vec<AuditEntry>, CoordinationError> {
        let mut entries = Vec::new();
        for (_, value) in self.store.scan_prefix(&keys::audit_id_prefix())? {
            let entry: AuditEntry = bincode_decode(&value)?;
            if entry.transfer_id.as_deref() == Some(transfer_id) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Total appended entries (also the last assigned id).
    pub fn count(&self) -> Result<u64, CoordinationError> {
        match self.store.get(keys::AUDIT_COUNTER)? {
            Some(bytes) => decode_id(&bytes),
            None => Ok(0),
        }
    }
}

fn decode_id(bytes: &[u8]) -> Result<u64, CoordinationError> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| CoordinationError::Store("audit id is not 8 bytes".to_string()))?;
    Ok(u64::from_be_bytes(arr))
}

fn bincode_decode(bytes: &[u8]) -> Result<AuditEntry, CoordinationError> {
    bincode::deserialize(bytes).map_err(|e| CoordinationError::Store(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use icl_store::MemoryKv;

    fn log() -> AuditLog {
        AuditLog::new(Arc::new(MemoryKv::new()))
    }

    #[test]
    fn test_ids_strictly_increase() {
        let audit = log();
        let mut last = 0;
        for _ in 0..10 {
            let id = audit
                .append(AuditEntry::new(AuditEventType::VoteSubmitted, 1))
                .unwrap();
            assert!(id > last);
            last = id;
        }
        assert_eq!(audit.count().unwrap(), 10);
    }

    #[test]
    fn test_zero_timestamp_is_filled() {
        let audit = log();
        let id = audit
            .append(AuditEntry::new(AuditEventType::CreditIssued, 3))
            .unwrap();
        let entry = audit.get_by_id(id).unwrap().unwrap();
        assert!(entry.timestamp > 0);
        assert_eq!(entry.block_height, 3);
    }

    #[test]
    fn test_caller_timestamp_is_preserved() {
        let audit = log();
        let mut entry = AuditEntry::new(AuditEventType::CreditIssued, 3);
        entry.timestamp = 1_700_000_000;
        let id = audit.append(entry).unwrap();
        assert_eq!(audit.get_by_id(id).unwrap().unwrap().timestamp, 1_700_000_000);
    }

    #[test]
    fn test_time_range_is_inclusive() {
        let audit = log();
        for ts in [100u64, 150, 200, 250] {
            let mut entry = AuditEntry::new(AuditEventType::VoteSubmitted, 1);
            entry.timestamp = ts;
            audit.append(entry).unwrap();
        }

        let hits = audit.range_by_time(150, 200).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].timestamp, 150);
        assert_eq!(hits[1].timestamp, 200);

        assert!(audit.range_by_time(300, 400).unwrap().is_empty());
        assert!(audit.range_by_time(200, 100).unwrap().is_empty());
    }

    #[test]
    fn test_type_filter() {
        let audit = log();
        audit
            .append(AuditEntry::new(AuditEventType::VoteSubmitted, 1))
            .unwrap();
        audit
            .append(AuditEntry::new(AuditEventType::CreditIssued, 1))
            .unwrap();
        audit
            .append(AuditEntry::new(AuditEventType::VoteSubmitted, 2))
            .unwrap();

        let votes = audit.filter_by_type(AuditEventType::VoteSubmitted).unwrap();
        assert_eq!(votes.len(), 2);
        assert!(votes.iter().all(|e| e.event_type == AuditEventType::VoteSubmitted));
        // Ascending ids out of the index scan
        assert!(votes[0].id < votes[1].id);
    }

    #[test]
    fn test_transfer_id_filter() {
        let audit = log();
        let tid = "aa".repeat(32);
        audit
            .append(AuditEntry::new(AuditEventType::VoteSubmitted, 1).with_transfer(&tid))
            .unwrap();
        audit
            .append(AuditEntry::new(AuditEventType::CreditIssued, 1))
            .unwrap();
        audit
            .append(
                AuditEntry::new(AuditEventType::TransferConfirmed, 1).with_transfer(&tid),
            )
            .unwrap();

        let hits = audit.filter_by_transfer_id(&tid).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_tag_round_trip() {
        for t in [
            AuditEventType::VoteSubmitted,
            AuditEventType::ConsensusReached,
            AuditEventType::TransferConfirmed,
            AuditEventType::TransferRejected,
            AuditEventType::CreditIssued,
            AuditEventType::CreditTransferred,
            AuditEventType::CreditBurned,
            AuditEventType::CommandGenerated,
            AuditEventType::CommandSigned,
            AuditEventType::ThresholdReached,
            AuditEventType::CommandExecuted,
            AuditEventType::NettingCompleted,
            AuditEventType::NettingFailed,
            AuditEventType::ValidatorSetUpdated,
        ] {
            assert_eq!(AuditEventType::from_tag(t.tag()), Some(t));
        }
        assert_eq!(AuditEventType::from_tag("no_such_tag"), None);
    }

    #[test]
    fn test_details_builder() {
        let entry = AuditEntry::new(AuditEventType::NettingCompleted, 20)
            .with_detail("pairs", 3)
            .with_detail("total_netted", 170u128);
        assert_eq!(entry.details.get("pairs").unwrap(), "3");
        assert_eq!(entry.details.get("total_netted").unwrap(), "170");
    }
}
