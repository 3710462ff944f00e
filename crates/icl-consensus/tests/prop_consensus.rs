// Property tests: tally confirmation is order-independent and fires
// side-effects exactly once at the threshold snapshot.

use icl_consensus::Oracle;
use icl_core::{
    consensus_threshold, decode_transfer_id, AuditLog, CoordinationError, CreditSink,
    MintCommand, MintCommandGenerator, TransferEvent, Validator, ValidatorRegistry, Vote,
};
use icl_store::{KvStore, MemoryKv};
use proptest::prelude::*;
use std::cell::Cell;
use std::sync::Arc;

#[derive(Default)]
struct CountingSink {
    credits: Cell<u32>,
    commands: Cell<u32>,
}

impl CreditSink for CountingSink {
    fn issue_confirmed_credit(
        &self,
        _event: &TransferEvent,
        _height: u64,
    ) -> Result<(), CoordinationError> {
        self.credits.set(self.credits.get() + 1);
        Ok(())
    }
}

impl MintCommandGenerator for CountingSink {
    fn generate_mint_command(
        &self,
        target_chain: &str,
        recipient: &str,
        amount: u128,
        height: u64,
    ) -> Result<MintCommand, CoordinationError> {
        self.commands.set(self.commands.get() + 1);
        Ok(MintCommand {
            command_id: "cmd-0000000000000000".to_string(),
            block_height: height,
            target_chain: target_chain.to_string(),
            recipient: recipient.to_string(),
            amount,
            signatures: Vec::new(),
            created_at: 0,
            status: icl_core::CommandStatus::Pending,
        })
    }
}

fn build_oracle(keys: &[icl_crypto::KeyPair]) -> (Oracle, Vec<String>) {
    let store: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let audit = Arc::new(AuditLog::new(store.clone()));
    let registry = Arc::new(ValidatorRegistry::new(store.clone(), audit.clone()));

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
    registry.replace_all(validators, 1).unwrap();
    (Oracle::new(store, audit, registry, 6), addresses)
}

fn sample_event() -> TransferEvent {
    TransferEvent {
        transfer_id: hex::encode([0xab; 32]),
        sender: "acct".to_string(),
        recipient: "0x3333333333333333333333333333333333333333".to_string(),
        amount: 42,
        nonce: 0,
        source_chain: "bank-a".to_string(),
        dest_chain: "bank-b".to_string(),
        source_height: 1,
        source_timestamp: 1,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_confirmation_matches_threshold(
        n in 1usize..6,
        order in proptest::collection::vec(0usize..6, 0..6),
    ) {
        let keys: Vec<_> = (0..n).map(|_| icl_crypto::generate_keypair()).collect();
        let (oracle, addresses) = build_oracle(&keys);
        let sink = CountingSink::default();
        let event = sample_event();
        let tid = decode_transfer_id(&event.transfer_id).unwrap();

        // Submit votes in an arbitrary (possibly repeating) order
        let mut accepted = 0u32;
        for idx in order.iter().map(|i| i % n) {
            let (r, s, v) =
                icl_crypto::sign_recoverable(&keys[idx].secret_key, &tid).unwrap();
            let vote = Vote {
                transfer_id: event.transfer_id.clone(),
                validator: addresses[idx].clone(),
                event: event.clone(),
                signature: icl_crypto::encode_rsv(&r, &s, v),
                submitted_at: 0,
            };
            match oracle.submit_vote(vote, &sink, &sink, 1) {
                Ok(_) => accepted += 1,
                Err(CoordinationError::DuplicateVote { .. }) => {}
                Err(e) => return Err(TestCaseError::fail(e.to_string())),
            }
        }

        let threshold = consensus_threshold(n);
        match oracle.get_tally(&event.transfer_id) {
            Ok(Some(tally)) => {
                prop_assert_eq!(tally.vote_count(), accepted);
                prop_assert_eq!(tally.threshold, threshold);
                prop_assert_eq!(tally.confirmed(), accepted >= threshold);
                // Side effects fire exactly once iff confirmed
                let expected = if tally.confirmed() { 1 } else { 0 };
                prop_assert_eq!(sink.credits.get(), expected);
                prop_assert_eq!(sink.commands.get(), expected);
            }
            Ok(None) => {
                prop_assert_eq!(accepted, 0);
                prop_assert_eq!(sink.credits.get(), 0);
            }
            Err(e) => return Err(TestCaseError::fail(e.to_string())),
        }
    }
}
