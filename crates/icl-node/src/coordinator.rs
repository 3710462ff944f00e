// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// INTERCLEAR - COORDINATOR PIPELINE
//
// Driver, not a store: owns handles to every subsystem, routes each
// inbound message into exactly one of them, and on every block tick
// runs the netting trigger and the multisig signing sweep. All
// mutations funnel through one writer (the RPC tier serializes on a
// mutex around this struct).
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use icl_consensus::{CommandPool, Oracle, VoteOutcome};
use icl_core::{
    AuditLog, CoordinationError, MintCommand, NettingCycle, TransferEvent, Validator,
    ValidatorRegistry, ValidatorSet, Vote,
};
use icl_crypto::SignerOracle;
use icl_ledger::{CreditLedger, NettingEngine};
use icl_store::KvStore;
use std::sync::Arc;

/// What one block tick did.
#[derive(Debug, Clone)]
pub struct TickSummary {
    pub height: u64,
    /// Netting cycle executed this tick, if the trigger fired
    pub netting: Option<NettingCycle>,
    /// Signatures produced by the local signing sweep
    pub signatures_added: u32,
}

pub struct Coordinator {
    store: Arc<dyn KvStore>,
    audit: Arc<AuditLog>,
    registry: Arc<ValidatorRegistry>,
    ledger: CreditLedger,
    oracle: Oracle,
    netting: NettingEngine,
    pool: CommandPool,
    signer: Arc<dyn SignerOracle>,
    height: u64,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn KvStore>,
        signer: Arc<dyn SignerOracle>,
        block_time_secs: u64,
        netting_min_interval: u64,
    ) -> Self {
        let audit = Arc::new(AuditLog::new(store.clone()));
        let registry = Arc::new(ValidatorRegistry::new(store.clone(), audit.clone()));
        let ledger = CreditLedger::new(store.clone(), audit.clone());
        let oracle = Oracle::new(
            store.clone(),
            audit.clone(),
            registry.clone(),
            block_time_secs,
        );
        let netting = NettingEngine::new(store.clone(), audit.clone(), netting_min_interval);
        let pool = CommandPool::new(store.clone(), audit.clone(), registry.clone());
        Self {
            store,
            audit,
            registry,
            ledger,
            oracle,
            netting,
            pool,
            signer,
            height: 0,
        }
    }

    /// Seed the validator set on first start. A registry that already
    /// carries a set is left alone.
    pub fn bootstrap_validators(
        &self,
        validators: Vec<Validator>,
    ) -> Result<ValidatorSet, CoordinationError> {
        let current = self.registry.get_set()?;
        if current.version > 0 {
            return Ok(current);
        }
        self.registry.replace_all(validators, self.height)
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    /// One coordination block: advance the height, fire the netting
    /// trigger, run the signing sweep. Subsystem failures are logged and
    /// never poison the tick loop.
    pub fn on_block_tick(&mut self) -> TickSummary {
        self.height += 1;

        let netting = match self.netting.trigger_if_due(&self.ledger, self.height) {
            Ok(cycle) => Some(cycle),
            Err(CoordinationError::NettingNotRequired) => None,
            Err(e) => {
                log::error!("netting trigger failed at height {}: {}", self.height, e);
                None
            }
        };

        let signatures_added = match self.pool.process_pending(self.signer.as_ref()) {
            Ok(n) => n,
            Err(e) => {
                log::error!("signing sweep failed at height {}: {}", self.height, e);
                0
            }
        };

        TickSummary {
            height: self.height,
            netting,
            signatures_added,
        }
    }

    // ── Relayer surface ─────────────────────────────────────────────

    pub fn submit_vote(&self, vote: Vote) -> Result<VoteOutcome, CoordinationError> {
        self.oracle
            .submit_vote(vote, &self.ledger, &self.pool, self.height)
    }

    pub fn mark_command_executed(
        &self,
        command_id: &str,
    ) -> Result<MintCommand, CoordinationError> {
        self.pool.mark_executed(command_id)
    }

    pub fn pending_commands(&self) -> Result<Vec<MintCommand>, CoordinationError> {
        self.pool.all_pending()
    }

    pub fn signed_commands(&self) -> Result<Vec<MintCommand>, CoordinationError> {
        self.pool.all_signed()
    }

    pub fn confirmed_transfer(
        &self,
        transfer_id: &str,
    ) -> Result<Option<TransferEvent>, CoordinationError> {
        self.oracle.confirmed_transfer(transfer_id)
    }

    /// (vote count, threshold snapshot, confirmed flag)
    pub fn vote_status(
        &self,
        transfer_id: &str,
    ) -> Result<(u32, u32, bool), CoordinationError> {
        self.oracle.vote_status(transfer_id)
    }

    // ── Administrative surface ──────────────────────────────────────

    pub fn update_validator_set(
        &self,
        validators: Vec<Validator>,
    ) -> Result<ValidatorSet, CoordinationError> {
        self.registry.replace_all(validators, self.height)
    }

    pub fn add_validator(
        &self,
        validator: Validator,
    ) -> Result<ValidatorSet, CoordinationError> {
        self.registry.add_one(validator, self.height)
    }

    pub fn remove_validator(&self, address: &str) -> Result<ValidatorSet, CoordinationError> {
        self.registry.remove_one(address, self.height)
    }

    pub fn reject_transfer(
        &self,
        transfer_id: &str,
        reason: &str,
    ) -> Result<(), CoordinationError> {
        self.oracle.reject_transfer(transfer_id, reason, self.height)
    }

    // ── Component handles (queries, tests) ──────────────────────────

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn registry(&self) -> &ValidatorRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &CreditLedger {
        &self.ledger
    }

    pub fn oracle(&self) -> &Oracle {
        &self.oracle
    }

    pub fn netting(&self) -> &NettingEngine {
        &self.netting
    }

    pub fn pool(&self) -> &CommandPool {
        &self.pool
    }

    /// Flush the backing store (shutdown path).
    pub fn flush(&self) -> Result<(), CoordinationError> {
        self.store.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use icl_core::decode_transfer_id;
    use icl_crypto::LocalKeyring;
    use icl_store::MemoryKv;

    fn coordinator_with_keys(n: usize) -> (Coordinator, Vec<icl_crypto::KeyPair>, Vec<String>) {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let keys: Vec<_> = (0..n).map(|_| icl_crypto::generate_keypair()).collect();
        let mut keyring = LocalKeyring::new();
        for pair in &keys {
            keyring.insert_secret(&pair.secret_key).unwrap();
        }
        let coordinator = Coordinator::new(store, Arc::new(keyring), 6, 10);

        let validators: Vec<Validator> = keys
            .iter()
            .map(|pair| Validator {
                address: icl_crypto::derive_address(&pair.public_key).unwrap(),
                public_key: pair.public_key.clone(),
                voting_power: 1,
                active: true,
                joined_at: 0,
            })
            .collect();
        let addresses = validators.iter().map(|v| v.address.clone()).collect();
        coordinator.bootstrap_validators(validators).unwrap();
        (coordinator, keys, addresses)
    }

    fn event(amount: u128) -> TransferEvent {
        TransferEvent {
            transfer_id: hex::encode([0xcd; 32]),
            sender: "acct".to_string(),
            recipient: "0x4444444444444444444444444444444444444444".to_string(),
            amount,
            nonce: 1,
            source_chain: "bank-a".to_string(),
            dest_chain: "bank-b".to_string(),
            source_height: 1,
            source_timestamp: 1,
        }
    }

    fn vote_from(
        keys: &[icl_crypto::KeyPair],
        addresses: &[String],
        index: usize,
        e: &TransferEvent,
    ) -> Vote {
        let tid = decode_transfer_id(&e.transfer_id).unwrap();
        let (r, s, v) = icl_crypto::sign_recoverable(&keys[index].secret_key, &tid).unwrap();
        Vote {
            transfer_id: e.transfer_id.clone(),
            validator: addresses[index].clone(),
            event: e.clone(),
            signature: icl_crypto::encode_rsv(&r, &s, v),
            submitted_at: 0,
        }
    }

    #[test]
    fn test_bootstrap_is_idempotent() {
        let (coordinator, _, addresses) = coordinator_with_keys(3);
        let set = coordinator.registry().get_set().unwrap();
        assert_eq!(set.version, 1);

        // A second bootstrap must not bump the version
        let again = coordinator
            .bootstrap_validators(vec![Validator {
                address: addresses[0].clone(),
                public_key: coordinator
                    .registry()
                    .get_validator(&addresses[0])
                    .unwrap()
                    .unwrap()
                    .public_key,
                voting_power: 1,
                active: true,
                joined_at: 0,
            }])
            .unwrap();
        assert_eq!(again.version, 1);
        assert_eq!(again.validators.len(), 3);
    }

    #[test]
    fn test_confirmed_vote_flows_into_ledger_and_pool() {
        let (coordinator, keys, addresses) = coordinator_with_keys(3);
        let e = event(100);

        coordinator
            .submit_vote(vote_from(&keys, &addresses, 0, &e))
            .unwrap();
        let outcome = coordinator
            .submit_vote(vote_from(&keys, &addresses, 1, &e))
            .unwrap();
        assert!(outcome.confirmed);

        assert_eq!(
            coordinator.ledger().balance("bank-b", "cred-bank-a").unwrap(),
            100
        );
        assert_eq!(coordinator.pending_commands().unwrap().len(), 1);
        assert_eq!(
            coordinator.vote_status(&e.transfer_id).unwrap(),
            (2, 2, true)
        );
    }

    #[test]
    fn test_tick_sweeps_signatures_for_held_keys() {
        let (mut coordinator, keys, addresses) = coordinator_with_keys(3);
        let e = event(100);
        coordinator
            .submit_vote(vote_from(&keys, &addresses, 0, &e))
            .unwrap();
        coordinator
            .submit_vote(vote_from(&keys, &addresses, 1, &e))
            .unwrap();

        let summary = coordinator.on_block_tick();
        assert_eq!(summary.height, 1);
        // All three keys are held locally; threshold 2 flips the command
        // to Signed after two signatures.
        assert_eq!(summary.signatures_added, 2);
        assert_eq!(coordinator.signed_commands().unwrap().len(), 1);
    }

    #[test]
    fn test_tick_triggers_netting_after_interval() {
        let (mut coordinator, keys, addresses) = coordinator_with_keys(3);

        // Build mutual positions via two confirmed transfers
        let mut ab = event(100);
        ab.transfer_id = hex::encode([0x01; 32]);
        let mut ba = event(70);
        ba.transfer_id = hex::encode([0x02; 32]);
        ba.source_chain = "bank-b".to_string();
        ba.dest_chain = "bank-a".to_string();
        for e in [&ab, &ba] {
            coordinator
                .submit_vote(vote_from(&keys, &addresses, 0, e))
                .unwrap();
            coordinator
                .submit_vote(vote_from(&keys, &addresses, 1, e))
                .unwrap();
        }

        // Ticks below the interval leave positions alone
        for _ in 0..9 {
            assert!(coordinator.on_block_tick().netting.is_none());
        }
        let tenth = coordinator.on_block_tick();
        let cycle = tenth.netting.expect("netting fires at the interval");
        assert_eq!(cycle.cycle_id, 10);
        assert_eq!(
            coordinator.ledger().balance("bank-b", "cred-bank-a").unwrap(),
            30
        );
        assert_eq!(
            coordinator.ledger().balance("bank-a", "cred-bank-b").unwrap(),
            0
        );
    }

    #[test]
    fn test_admin_surface_routes_to_registry_and_oracle() {
        let (coordinator, keys, addresses) = coordinator_with_keys(4);
        assert_eq!(coordinator.registry().threshold().unwrap(), 3);

        let pair = icl_crypto::generate_keypair();
        let grown = coordinator
            .add_validator(Validator {
                address: icl_crypto::derive_address(&pair.public_key).unwrap(),
                public_key: pair.public_key.clone(),
                voting_power: 1,
                active: true,
                joined_at: 0,
            })
            .unwrap();
        assert_eq!(grown.threshold, 4);

        let shrunk = coordinator
            .remove_validator(&icl_crypto::derive_address(&pair.public_key).unwrap())
            .unwrap();
        assert_eq!(shrunk.threshold, 3);

        let e = event(50);
        coordinator
            .submit_vote(vote_from(&keys, &addresses, 0, &e))
            .unwrap();
        coordinator.reject_transfer(&e.transfer_id, "operator").unwrap();
        assert!(!coordinator
            .oracle()
            .check_consensus(&e.transfer_id)
            .unwrap());
    }
}
