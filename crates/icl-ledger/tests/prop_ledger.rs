// Property tests for credit accounting and bilateral netting.

use icl_core::{credit_denom, AuditLog, CreditToken};
use icl_ledger::{BalanceStore, CreditLedger, NettingEngine};
use icl_store::{KvStore, MemoryKv};
use proptest::prelude::*;
use std::sync::Arc;

fn setup() -> (CreditLedger, NettingEngine) {
    let store: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let audit = Arc::new(AuditLog::new(store.clone()));
    let ledger = CreditLedger::new(store.clone(), audit.clone());
    let engine = NettingEngine::new(store, audit, 10);
    (ledger, engine)
}

fn issue(ledger: &CreditLedger, issuer: &str, holder: &str, amount: u128) {
    ledger
        .issue_credit(
            CreditToken {
                denom: credit_denom(issuer),
                issuer_bank: issuer.to_string(),
                holder_bank: holder.to_string(),
                amount,
                origin_tx: hex::encode([0u8; 32]),
                issued_at: 0,
            },
            1,
        )
        .unwrap();
}

proptest! {
    #[test]
    fn prop_netting_preserves_pair_sum(a in 1u128..1_000_000, b in 1u128..1_000_000) {
        let (ledger, engine) = setup();
        issue(&ledger, "bank-b", "bank-a", a); // balance(bank-a, cred-bank-b) = a
        issue(&ledger, "bank-a", "bank-b", b); // balance(bank-b, cred-bank-a) = b

        let pairs = engine.calculate(&ledger).unwrap();
        prop_assert_eq!(pairs.len(), 1);
        let cycle = engine.execute(&ledger, pairs, 12).unwrap();
        prop_assert_eq!(cycle.status, icl_core::CycleStatus::Completed);

        let offset = a.min(b);
        let post_a = ledger.balance("bank-a", "cred-bank-b").unwrap();
        let post_b = ledger.balance("bank-b", "cred-bank-a").unwrap();
        // Both sides burn exactly min(a, b)
        prop_assert_eq!(post_a + post_b, a + b - 2 * offset);
        // One side always zeroes out
        prop_assert!(post_a == 0 || post_b == 0);
        // The residual equals |a − b|
        prop_assert_eq!(post_a.max(post_b), a.abs_diff(b));
    }

    #[test]
    fn prop_burn_and_transfer_are_total(
        issued in 1u128..1_000_000,
        moved in 0u128..2_000_000,
    ) {
        let (ledger, _) = setup();
        issue(&ledger, "bank-a", "bank-b", issued);

        match ledger.transfer_credit("bank-b", "bank-c", "cred-bank-a", moved, 2) {
            Ok(()) => {
                prop_assert!(moved > 0 && moved <= issued);
                prop_assert_eq!(
                    ledger.balance("bank-b", "cred-bank-a").unwrap(),
                    issued - moved
                );
                prop_assert_eq!(ledger.balance("bank-c", "cred-bank-a").unwrap(), moved);
            }
            Err(_) => {
                // Failed ops leave balances exactly as they were
                prop_assert_eq!(ledger.balance("bank-b", "cred-bank-a").unwrap(), issued);
                prop_assert_eq!(ledger.balance("bank-c", "cred-bank-a").unwrap(), 0);
            }
        }
    }

    #[test]
    fn prop_balances_never_negative(
        issued in 1u128..1_000,
        burns in proptest::collection::vec(1u128..200, 0..12),
    ) {
        let (ledger, _) = setup();
        issue(&ledger, "bank-a", "bank-b", issued);

        let mut expected = issued;
        for burn in burns {
            match ledger.burn_credit("cred-bank-a", burn, 3) {
                Ok(()) => {
                    prop_assert!(burn <= expected);
                    expected -= burn;
                }
                Err(_) => prop_assert!(burn > expected),
            }
        }
        prop_assert_eq!(ledger.balance("bank-b", "cred-bank-a").unwrap(), expected);
    }
}
