// SPDX-License-Identifier: AGPL-3.0-only
//! # IOU Credit Ledger
//!
//! Per-issuer credit accounting between consortium banks. A confirmed
//! cross-chain burn books debt of the source bank as the denomination
//! `cred-{issuer}` held by the destination bank. Balances live under
//! `cred-bal/{bank}/{denom}`, denomination metadata under
//! `cred-meta/{denom}`; metadata is written once and never mutated by
//! balance operations.
//!
//! Balance records carry their own `bank` and `denom` fields, so bank
//! enumeration reads typed values instead of splitting composite keys.

use icl_core::{
    credit_denom, denom_issuer, unix_now, AuditEntry, AuditEventType, AuditLog,
    CoordinationError, CreditSink, CreditToken, TransferEvent,
};
use icl_store::{keys, KvStore, KvStoreExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub mod netting;

pub use netting::NettingEngine;

/// Stored balance value. Keeps its own coordinates so scans never parse
/// key strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceRecord {
    pub bank: String,
    pub denom: String,
    pub amount: u128,
}

/// Minimal balance capability the netting engine operates through.
/// Production hands it the ledger; tests hand it a fake.
pub trait BalanceStore {
    /// Distinct banks holding at least one non-zero balance, sorted.
    fn banks(&self) -> Result<Vec<String>, CoordinationError>;
    fn balance(&self, bank: &str, denom: &str) -> Result<u128, CoordinationError>;
    /// `(balance(a, cred-b), balance(b, cred-a))`: the two mutual
    /// positions of an ordered bank pair.
    fn debt_position(
        &self,
        bank_a: &str,
        bank_b: &str,
    ) -> Result<(u128, u128), CoordinationError>;
    fn burn_from(
        &self,
        holder: &str,
        denom: &str,
        amount: u128,
        height: u64,
    ) -> Result<(), CoordinationError>;
    /// Rollback primitive: overwrite a balance from a pre-cycle snapshot.
    fn restore_balance(
        &self,
        bank: &str,
        denom: &str,
        amount: u128,
    ) -> Result<(), CoordinationError>;
}

pub struct CreditLedger {
    store: Arc<dyn KvStore>,
    audit: Arc<AuditLog>,
}

impl CreditLedger {
    pub fn new(store: Arc<dyn KvStore>, audit: Arc<AuditLog>) -> Self {
        Self { store, audit }
    }

    /// Create a new credit denomination and book its first balance.
    /// The denomination must not already exist.
    pub fn issue_credit(&self, meta: CreditToken, height: u64) -> Result<(), CoordinationError> {
        let mut meta = meta;
        meta.validate()?;
        if self.get_token(&meta.denom)?.is_some() {
            return Err(CoordinationError::DuplicateCreditToken(meta.denom));
        }
        if meta.issued_at == 0 {
            meta.issued_at = unix_now();
        }

        self.store.put_obj(&keys::credit_meta(&meta.denom), &meta)?;
        let opening = self.read_balance(&meta.holder_bank, &meta.denom)?;
        self.write_balance(&meta.holder_bank, &meta.denom, opening + meta.amount)?;

        self.audit.record(
            AuditEntry::new(AuditEventType::CreditIssued, height)
                .with_transfer(&meta.origin_tx)
                .with_detail("denom", &meta.denom)
                .with_detail("holder", &meta.holder_bank)
                .with_detail("amount", meta.amount),
        );
        Ok(())
    }

    /// Accrue further credit of an existing denomination to `holder`.
    /// Used for repeat transfers on a corridor whose denomination was
    /// issued earlier; metadata stays untouched.
    pub fn credit(
        &self,
        holder: &str,
        denom: &str,
        amount: u128,
        height: u64,
    ) -> Result<(), CoordinationError> {
        let token = self
            .get_token(denom)?
            .ok_or_else(|| CoordinationError::InvalidCreditToken(format!("unknown {}", denom)))?;
        if amount == 0 {
            return Err(CoordinationError::InvalidAmount(
                "credit amount must be strictly positive".to_string(),
            ));
        }
        if holder.is_empty() {
            return Err(CoordinationError::InvalidBankID(
                "holder bank id must be non-empty".to_string(),
            ));
        }
        if holder == token.issuer_bank {
            return Err(CoordinationError::InvalidBankID(format!(
                "bank {} cannot hold its own credit",
                holder
            )));
        }

        let current = self.read_balance(holder, denom)?;
        self.write_balance(holder, denom, current + amount)?;

        self.audit.record(
            AuditEntry::new(AuditEventType::CreditIssued, height)
                .with_transfer(&token.origin_tx)
                .with_detail("denom", denom)
                .with_detail("holder", holder)
                .with_detail("amount", amount),
        );
        Ok(())
    }

    /// Burn credit from the holder recorded in the denomination metadata.
    pub fn burn_credit(
        &self,
        denom: &str,
        amount: u128,
        height: u64,
    ) -> Result<(), CoordinationError> {
        let token = self
            .get_token(denom)?
            .ok_or_else(|| CoordinationError::InvalidCreditToken(format!("unknown {}", denom)))?;
        self.burn_from(&token.holder_bank, denom, amount, height)
    }

    /// Burn credit from an explicit holder (the netting engine's burn).
    pub fn burn_from(
        &self,
        holder: &str,
        denom: &str,
        amount: u128,
        height: u64,
    ) -> Result<(), CoordinationError> {
        if amount == 0 {
            return Err(CoordinationError::InvalidAmount(
                "burn amount must be strictly positive".to_string(),
            ));
        }
        let current = self.read_balance(holder, denom)?;
        if current < amount {
            return Err(CoordinationError::InsufficientBalance {
                bank: holder.to_string(),
                denom: denom.to_string(),
                have: current,
                need: amount,
            });
        }
        self.write_balance(holder, denom, current - amount)?;

        self.audit.record(
            AuditEntry::new(AuditEventType::CreditBurned, height)
                .with_detail("denom", denom)
                .with_detail("holder", holder)
                .with_detail("amount", amount),
        );
        Ok(())
    }

    /// Move credit between holders. The issuer itself can never become
    /// a holder of its own denomination.
    pub fn transfer_credit(
        &self,
        from: &str,
        to: &str,
        denom: &str,
        amount: u128,
        height: u64,
    ) -> Result<(), CoordinationError> {
        let token = self
            .get_token(denom)?
            .ok_or_else(|| CoordinationError::InvalidCreditToken(format!("unknown {}", denom)))?;
        if amount == 0 {
            return Err(CoordinationError::InvalidAmount(
                "transfer amount must be strictly positive".to_string(),
            ));
        }
        if to.is_empty() {
            return Err(CoordinationError::InvalidBankID(
                "destination bank id must be non-empty".to_string(),
            ));
        }
        if to == token.issuer_bank {
            return Err(CoordinationError::InvalidBankID(format!(
                "bank {} cannot hold its own credit",
                to
            )));
        }

        let from_balance = self.read_balance(from, denom)?;
        if from_balance < amount {
            return Err(CoordinationError::InsufficientBalance {
                bank: from.to_string(),
                denom: denom.to_string(),
                have: from_balance,
                need: amount,
            });
        }
        let to_balance = self.read_balance(to, denom)?;
        self.write_balance(from, denom, from_balance - amount)?;
        self.write_balance(to, denom, to_balance + amount)?;

        self.audit.record(
            AuditEntry::new(AuditEventType::CreditTransferred, height)
                .with_detail("denom", denom)
                .with_detail("from", from)
                .with_detail("to", to)
                .with_detail("amount", amount),
        );
        Ok(())
    }

    pub fn get_token(&self, denom: &str) -> Result<Option<CreditToken>, CoordinationError> {
        Ok(self.store.get_obj(&keys::credit_meta(denom))?)
    }

    pub fn balance(&self, bank: &str, denom: &str) -> Result<u128, CoordinationError> {
        self.read_balance(bank, denom)
    }

    /// Non-zero balances of one bank, keyed by denomination.
    pub fn all_balances(
        &self,
        bank: &str,
    ) -> Result<BTreeMap<String, u128>, CoordinationError> {
        let mut balances = BTreeMap::new();
        for record in self.scan_balances()? {
            if record.bank == bank && record.amount > 0 {
                balances.insert(record.denom, record.amount);
            }
        }
        Ok(balances)
    }

    fn scan_balances(&self) -> Result<Vec<BalanceRecord>, CoordinationError> {
        let mut records = Vec::new();
        for (_, value) in self.store.scan_prefix(&keys::credit_balance_prefix())? {
            let record: BalanceRecord = bincode::deserialize(&value)
                .map_err(|e| CoordinationError::Store(e.to_string()))?;
            records.push(record);
        }
        Ok(records)
    }

    fn read_balance(&self, bank: &str, denom: &str) -> Result<u128, CoordinationError> {
        let record: Option<BalanceRecord> =
            self.store.get_obj(&keys::credit_balance(bank, denom))?;
        Ok(record.map(|r| r.amount).unwrap_or(0))
    }

    fn write_balance(
        &self,
        bank: &str,
        denom: &str,
        amount: u128,
    ) -> Result<(), CoordinationError> {
        let record = BalanceRecord {
            bank: bank.to_string(),
            denom: denom.to_string(),
            amount,
        };
        self.store
            .put_obj(&keys::credit_balance(bank, denom), &record)?;
        Ok(())
    }
}

impl BalanceStore for CreditLedger {
    fn banks(&self) -> Result<Vec<String>, CoordinationError> {
        let mut banks = BTreeSet::new();
        for record in self.scan_balances()? {
            if record.amount > 0 {
                banks.insert(record.bank);
            }
        }
        Ok(banks.into_iter().collect())
    }

    fn balance(&self, bank: &str, denom: &str) -> Result<u128, CoordinationError> {
        self.read_balance(bank, denom)
    }

    fn debt_position(
        &self,
        bank_a: &str,
        bank_b: &str,
    ) -> Result<(u128, u128), CoordinationError> {
        let a_position = self.read_balance(bank_a, &credit_denom(bank_b))?;
        let b_position = self.read_balance(bank_b, &credit_denom(bank_a))?;
        Ok((a_position, b_position))
    }

    fn burn_from(
        &self,
        holder: &str,
        denom: &str,
        amount: u128,
        height: u64,
    ) -> Result<(), CoordinationError> {
        CreditLedger::burn_from(self, holder, denom, amount, height)
    }

    fn restore_balance(
        &self,
        bank: &str,
        denom: &str,
        amount: u128,
    ) -> Result<(), CoordinationError> {
        self.write_balance(bank, denom, amount)
    }
}

impl CreditSink for CreditLedger {
    /// Book a confirmed transfer: issue the corridor's denomination on
    /// first use, accrue onto it afterwards.
    fn issue_confirmed_credit(
        &self,
        event: &TransferEvent,
        height: u64,
    ) -> Result<(), CoordinationError> {
        let denom = credit_denom(&event.source_chain);
        debug_assert_eq!(denom_issuer(&denom), Some(event.source_chain.as_str()));
        if self.get_token(&denom)?.is_none() {
            self.issue_credit(
                CreditToken {
                    denom,
                    issuer_bank: event.source_chain.clone(),
                    holder_bank: event.dest_chain.clone(),
                    amount: event.amount,
                    origin_tx: event.transfer_id.clone(),
                    issued_at: 0,
                },
                height,
            )
        } else {
            self.credit(&event.dest_chain, &denom, event.amount, height)
        }
    }
}
