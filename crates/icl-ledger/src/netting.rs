// SPDX-License-Identifier: AGPL-3.0-only
//! # Bilateral Netting Engine
//!
//! Periodically collapses mutual IOU positions: for every bank pair with
//! strictly positive balances on both sides, `min(a, b)` is burned from
//! each side and only the residual is carried forward. Execution is
//! atomic with respect to the ledger: every touched balance is
//! snapshotted first and restored wholesale on any failure.
//!
//! Cycles are identified by trigger block height and serialized by it;
//! the last executed height is persisted as 8 little-endian bytes under
//! `netting-last`.

use crate::BalanceStore;
use icl_core::{
    credit_denom, unix_now, AuditEntry, AuditEventType, AuditLog, BankPair,
    CoordinationError, CycleStatus, NettingCycle,
};
use icl_store::{keys, KvStore, KvStoreExt};
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct NettingEngine {
    store: Arc<dyn KvStore>,
    audit: Arc<AuditLog>,
    /// Minimum blocks between two cycles
    min_interval: u64,
}

impl NettingEngine {
    pub fn new(store: Arc<dyn KvStore>, audit: Arc<AuditLog>, min_interval: u64) -> Self {
        Self {
            store,
            audit,
            min_interval,
        }
    }

    /// Height of the last executed cycle; 0 before the first one.
    pub fn last_cycle_height(&self) -> Result<u64, CoordinationError> {
        match self.store.get(keys::NETTING_LAST)? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    CoordinationError::Store("netting-last is not 8 bytes".to_string())
                })?;
                Ok(u64::from_le_bytes(arr))
            }
            None => Ok(0),
        }
    }

    /// Enumerate bank pairs with mutual strictly-positive positions.
    /// Pairs are ordered (a < b lexicographically) and deterministic.
    pub fn calculate(
        &self,
        ledger: &dyn BalanceStore,
    ) -> Result<Vec<BankPair>, CoordinationError> {
        let banks = ledger.banks()?;
        let mut pairs = Vec::new();
        for i in 0..banks.len() {
            for j in (i + 1)..banks.len() {
                let (bank_a, bank_b) = (&banks[i], &banks[j]);
                let (a_owes_b, b_owes_a) = ledger.debt_position(bank_a, bank_b)?;
                if a_owes_b == 0 || b_owes_a == 0 {
                    continue;
                }
                let net_amount = a_owes_b.abs_diff(b_owes_a);
                let net_debtor = if a_owes_b > b_owes_a {
                    bank_b.clone()
                } else {
                    bank_a.clone()
                };
                pairs.push(BankPair {
                    bank_a: bank_a.clone(),
                    bank_b: bank_b.clone(),
                    a_owes_b,
                    b_owes_a,
                    net_amount,
                    net_debtor,
                });
            }
        }
        Ok(pairs)
    }

    /// Burn `min(a, b)` from both sides of every pair. On any failure
    /// every touched balance is restored from the pre-cycle snapshot and
    /// the cycle is recorded as Failed.
    pub fn execute(
        &self,
        ledger: &dyn BalanceStore,
        pairs: Vec<BankPair>,
        height: u64,
    ) -> Result<NettingCycle, CoordinationError> {
        let mut net_by_bank: BTreeMap<String, i128> = BTreeMap::new();
        for pair in &pairs {
            let creditor = if pair.net_debtor == pair.bank_a {
                &pair.bank_b
            } else {
                &pair.bank_a
            };
            *net_by_bank.entry(pair.net_debtor.clone()).or_insert(0) -=
                pair.net_amount as i128;
            *net_by_bank.entry(creditor.clone()).or_insert(0) += pair.net_amount as i128;
        }

        let mut cycle = NettingCycle {
            cycle_id: height,
            pairs,
            net_by_bank,
            started_at: unix_now(),
            finished_at: None,
            status: CycleStatus::InProgress,
        };

        // Snapshot both sides of every pair before the first burn.
        let mut snapshot: Vec<(String, String, u128)> = Vec::new();
        for pair in &cycle.pairs {
            let denom_b = credit_denom(&pair.bank_b);
            let denom_a = credit_denom(&pair.bank_a);
            snapshot.push((
                pair.bank_a.clone(),
                denom_b.clone(),
                ledger.balance(&pair.bank_a, &denom_b)?,
            ));
            snapshot.push((
                pair.bank_b.clone(),
                denom_a.clone(),
                ledger.balance(&pair.bank_b, &denom_a)?,
            ));
        }

        let mut failure: Option<CoordinationError> = None;
        let mut total_offset: u128 = 0;
        for pair in &cycle.pairs {
            let burn = pair.a_owes_b.min(pair.b_owes_a);
            let result = ledger
                .burn_from(&pair.bank_a, &credit_denom(&pair.bank_b), burn, height)
                .and_then(|_| {
                    ledger.burn_from(&pair.bank_b, &credit_denom(&pair.bank_a), burn, height)
                });
            if let Err(e) = result {
                failure = Some(e);
                break;
            }
            total_offset += burn;
        }

        if let Some(e) = failure {
            log::error!("netting cycle {} failed, rolling back: {}", height, e);
            for (bank, denom, amount) in &snapshot {
                ledger.restore_balance(bank, denom, *amount)?;
            }
            cycle.status = CycleStatus::Failed;
            cycle.finished_at = Some(unix_now());
            self.store.put_obj(&keys::netting_cycle(height), &cycle)?;
            self.audit.record(
                AuditEntry::new(AuditEventType::NettingFailed, height)
                    .with_detail("cycle_id", height)
                    .with_detail("reason", e),
            );
            return Ok(cycle);
        }

        cycle.status = CycleStatus::Completed;
        cycle.finished_at = Some(unix_now());
        self.store.put_obj(&keys::netting_cycle(height), &cycle)?;
        self.audit.record(
            AuditEntry::new(AuditEventType::NettingCompleted, height)
                .with_detail("cycle_id", height)
                .with_detail("pairs", cycle.pairs.len())
                .with_detail("total_offset", total_offset),
        );
        log::info!(
            "netting cycle {} completed: {} pairs, {} offset per side",
            height,
            cycle.pairs.len(),
            total_offset
        );
        Ok(cycle)
    }

    /// Tick entry point. Runs a cycle when the interval has elapsed and
    /// at least one pair has mutual positions; otherwise reports
    /// `NettingNotRequired`.
    pub fn trigger_if_due(
        &self,
        ledger: &dyn BalanceStore,
        height: u64,
    ) -> Result<NettingCycle, CoordinationError> {
        let last = self.last_cycle_height()?;
        if height.saturating_sub(last) < self.min_interval {
            return Err(CoordinationError::NettingNotRequired);
        }
        let pairs = self.calculate(ledger)?;
        if pairs.is_empty() {
            return Err(CoordinationError::NettingNotRequired);
        }
        let cycle = self.execute(ledger, pairs, height)?;
        self.store
            .put(keys::NETTING_LAST, &height.to_le_bytes())?;
        Ok(cycle)
    }

    pub fn get_cycle(&self, cycle_id: u64) -> Result<Option<NettingCycle>, CoordinationError> {
        Ok(self.store.get_obj(&keys::netting_cycle(cycle_id))?)
    }
}
