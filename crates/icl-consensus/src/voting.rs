// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// INTERCLEAR - ORACLE VOTING ENGINE
//
// Per-transfer-id tally of validator attestations. A tally snapshots the
// consensus threshold at creation; confirmation fires exactly once when
// the vote count reaches it, books IOU credit to the destination bank,
// and opens a mint command. Votes past confirmation (or rejection) are
// recorded but change nothing.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use icl_core::{
    decode_transfer_id, unix_now, AuditEntry, AuditEventType, AuditLog, CoordinationError,
    CreditSink, MintCommandGenerator, TallyStatus, TransferEvent, ValidatorRegistry, Vote,
    VoteTally,
};
use icl_store::{keys, KvStore, KvStoreExt};
use std::sync::Arc;

/// Result of one vote submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteOutcome {
    pub vote_count: u32,
    /// Threshold snapshot frozen at tally creation
    pub threshold: u32,
    pub confirmed: bool,
    /// True only for the submission that crossed the threshold
    pub newly_confirmed: bool,
}

pub struct Oracle {
    store: Arc<dyn KvStore>,
    audit: Arc<AuditLog>,
    registry: Arc<ValidatorRegistry>,
    /// Seconds per coordination block, for timeout observation
    block_time_secs: u64,
}

impl Oracle {
    pub fn new(
        store: Arc<dyn KvStore>,
        audit: Arc<AuditLog>,
        registry: Arc<ValidatorRegistry>,
        block_time_secs: u64,
    ) -> Self {
        Self {
            store,
            audit,
            registry,
            block_time_secs,
        }
    }

    /// Validate and record one validator's vote. Validation order:
    /// active validator, signature recovery, payload consistency,
    /// duplicate check. On reaching the threshold snapshot the transfer
    /// is confirmed and the side-effects fire through the handles.
    pub fn submit_vote(
        &self,
        vote: Vote,
        credits: &dyn CreditSink,
        minter: &dyn MintCommandGenerator,
        height: u64,
    ) -> Result<VoteOutcome, CoordinationError> {
        let mut vote = vote;
        vote.event.validate()?;
        if vote.transfer_id != vote.event.transfer_id {
            return Err(CoordinationError::EventPayloadMismatch(vote.transfer_id));
        }
        let tid_bytes = decode_transfer_id(&vote.transfer_id)?;
        if vote.submitted_at == 0 {
            vote.submitted_at = unix_now();
        }

        let validator = self
            .registry
            .get_validator(&vote.validator)?
            .filter(|v| v.active)
            .ok_or_else(|| CoordinationError::ValidatorNotActive(vote.validator.clone()))?;

        let (r, s, v) = icl_crypto::split_rsv(&vote.signature)
            .map_err(|e| CoordinationError::InvalidSignature(e.to_string()))?;
        if r == [0u8; 32] || s == [0u8; 32] {
            return Err(CoordinationError::InvalidSignature(
                "r and s must be non-zero".to_string(),
            ));
        }
        if !icl_crypto::verify_recoverable(&validator.public_key, &tid_bytes, &r, &s, v) {
            return Err(CoordinationError::InvalidSignature(format!(
                "vote signature does not recover to validator {}",
                vote.validator
            )));
        }

        let mut tally = match self.get_tally(&vote.transfer_id)? {
            Some(existing) => {
                if existing.canonical_event() != Some(&vote.event) {
                    return Err(CoordinationError::EventPayloadMismatch(
                        vote.transfer_id.clone(),
                    ));
                }
                if existing.has_voted(&vote.validator) {
                    return Err(CoordinationError::DuplicateVote {
                        transfer_id: vote.transfer_id.clone(),
                        validator: vote.validator.clone(),
                    });
                }
                existing
            }
            None => VoteTally {
                transfer_id: vote.transfer_id.clone(),
                votes: Vec::new(),
                status: TallyStatus::Pending,
                threshold: self.registry.threshold()?,
                created_at: unix_now(),
                confirmed_at: None,
                reject_reason: None,
            },
        };

        self.store
            .put_obj(&keys::vote(&vote.transfer_id, &vote.validator), &vote)?;
        tally.votes.push(vote.clone());
        self.store.put_obj(&keys::tally(&tally.transfer_id), &tally)?;

        self.audit.record(
            AuditEntry::new(AuditEventType::VoteSubmitted, height)
                .with_transfer(&tally.transfer_id)
                .with_detail("validator", &vote.validator)
                .with_detail("votes", tally.vote_count())
                .with_detail("threshold", tally.threshold),
        );

        let mut newly_confirmed = false;
        if tally.status == TallyStatus::Pending && tally.vote_count() >= tally.threshold {
            self.confirm(&mut tally, credits, minter, height)?;
            newly_confirmed = true;
        }

        Ok(VoteOutcome {
            vote_count: tally.vote_count(),
            threshold: tally.threshold,
            confirmed: tally.confirmed(),
            newly_confirmed,
        })
    }

    /// Threshold-crossing transition. Persists the canonical payload,
    /// then drives the credit issuance and mint-command side-effects.
    fn confirm(
        &self,
        tally: &mut VoteTally,
        credits: &dyn CreditSink,
        minter: &dyn MintCommandGenerator,
        height: u64,
    ) -> Result<(), CoordinationError> {
        if tally.vote_count() < tally.threshold {
            return Err(CoordinationError::InsufficientVotes {
                have: tally.vote_count(),
                need: tally.threshold,
            });
        }
        let event = tally
            .canonical_event()
            .cloned()
            .ok_or(CoordinationError::InsufficientVotes { have: 0, need: 1 })?;

        tally.status = TallyStatus::Confirmed;
        tally.confirmed_at = Some(unix_now());
        self.store.put_obj(&keys::tally(&tally.transfer_id), &*tally)?;
        self.store
            .put_obj(&keys::confirmed(&tally.transfer_id), &event)?;

        self.audit.record(
            AuditEntry::new(AuditEventType::ConsensusReached, height)
                .with_transfer(&tally.transfer_id)
                .with_detail("votes", tally.vote_count())
                .with_detail("threshold", tally.threshold),
        );
        self.audit.record(
            AuditEntry::new(AuditEventType::TransferConfirmed, height)
                .with_transfer(&tally.transfer_id)
                .with_detail("source_chain", &event.source_chain)
                .with_detail("dest_chain", &event.dest_chain)
                .with_detail("amount", event.amount),
        );
        log::info!(
            "transfer {} confirmed with {} of {} votes",
            tally.transfer_id,
            tally.vote_count(),
            tally.threshold
        );

        credits.issue_confirmed_credit(&event, height)?;
        minter.generate_mint_command(&event.dest_chain, &event.recipient, event.amount, height)?;
        Ok(())
    }

    pub fn get_tally(&self, transfer_id: &str) -> Result<Option<VoteTally>, CoordinationError> {
        Ok(self.store.get_obj(&keys::tally(transfer_id))?)
    }

    /// Confirmed flag; `TransferNotFound` when no tally exists.
    pub fn check_consensus(&self, transfer_id: &str) -> Result<bool, CoordinationError> {
        let tally = self.require_tally(transfer_id)?;
        Ok(tally.confirmed())
    }

    /// (vote count, threshold snapshot, confirmed flag) for RPC status.
    pub fn vote_status(
        &self,
        transfer_id: &str,
    ) -> Result<(u32, u32, bool), CoordinationError> {
        let tally = self.require_tally(transfer_id)?;
        Ok((tally.vote_count(), tally.threshold, tally.confirmed()))
    }

    /// Administrative rejection of a pending transfer (timeout, invalid
    /// payload upstream). The tally stays observable; a confirmed tally
    /// cannot be rejected.
    pub fn reject_transfer(
        &self,
        transfer_id: &str,
        reason: &str,
        height: u64,
    ) -> Result<(), CoordinationError> {
        let mut tally = self.require_tally(transfer_id)?;
        if tally.confirmed() {
            return Err(CoordinationError::TransferAlreadyConfirmed(
                transfer_id.to_string(),
            ));
        }
        tally.status = TallyStatus::Rejected;
        tally.reject_reason = Some(reason.to_string());
        self.store.put_obj(&keys::tally(transfer_id), &tally)?;

        self.audit.record(
            AuditEntry::new(AuditEventType::TransferRejected, height)
                .with_transfer(transfer_id)
                .with_detail("reason", reason),
        );
        Ok(())
    }

    /// True iff the tally is still pending and `timeout_blocks` worth of
    /// block time has elapsed since its creation. Observation only; the
    /// tally is not mutated.
    pub fn check_consensus_timeout(
        &self,
        transfer_id: &str,
        timeout_blocks: u64,
    ) -> Result<bool, CoordinationError> {
        let tally = self.require_tally(transfer_id)?;
        if tally.status != TallyStatus::Pending {
            return Ok(false);
        }
        let elapsed = unix_now().saturating_sub(tally.created_at);
        Ok(elapsed >= timeout_blocks.saturating_mul(self.block_time_secs))
    }

    /// Canonical payload of a confirmed transfer.
    pub fn confirmed_transfer(
        &self,
        transfer_id: &str,
    ) -> Result<Option<TransferEvent>, CoordinationError> {
        Ok(self.store.get_obj(&keys::confirmed(transfer_id))?)
    }

    fn require_tally(&self, transfer_id: &str) -> Result<VoteTally, CoordinationError> {
        self.get_tally(transfer_id)?
            .ok_or_else(|| CoordinationError::TransferNotFound(transfer_id.to_string()))
    }
}
