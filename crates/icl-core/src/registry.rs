// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// INTERCLEAR - VALIDATOR REGISTRY
//
// Administered (not elected) set of signing validators. Every mutation
// bumps the version, recomputes the ⌈2n/3⌉ threshold, rewrites the
// singleton root plus the per-validator records, and leaves an audit
// entry. Public keys are canonicalized to 65 uncompressed bytes here so
// signature verification is a plain byte comparison downstream.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::audit::{AuditEntry, AuditEventType, AuditLog};
use crate::{consensus_threshold, unix_now, CoordinationError, Validator, ValidatorSet};
use icl_store::{keys, KvStore, KvStoreExt};
use std::sync::Arc;

pub struct ValidatorRegistry {
    store: Arc<dyn KvStore>,
    audit: Arc<AuditLog>,
}

impl ValidatorRegistry {
    pub fn new(store: Arc<dyn KvStore>, audit: Arc<AuditLog>) -> Self {
        Self { store, audit }
    }

    /// The current set. A never-initialized registry reads as the empty
    /// set at version 0.
    pub fn get_set(&self) -> Result<ValidatorSet, CoordinationError> {
        match self.store.get_obj(keys::VALIDATOR_SET_ROOT)? {
            Some(set) => Ok(set),
            None => Ok(ValidatorSet {
                validators: Vec::new(),
                threshold: consensus_threshold(0),
                version: 0,
                updated_height: 0,
            }),
        }
    }

    pub fn threshold(&self) -> Result<u32, CoordinationError> {
        Ok(self.get_set()?.threshold)
    }

    pub fn is_active(&self, address: &str) -> Result<bool, CoordinationError> {
        Ok(self
            .get_validator(address)?
            .map(|v| v.active)
            .unwrap_or(false))
    }

    /// Per-validator record lookup (the `0x04` index).
    pub fn get_validator(&self, address: &str) -> Result<Option<Validator>, CoordinationError> {
        Ok(self.store.get_obj(&keys::validator_record(address))?)
    }

    /// Replace the whole set. Rejects empty input and duplicate addresses.
    pub fn replace_all(
        &self,
        validators: Vec<Validator>,
        height: u64,
    ) -> Result<ValidatorSet, CoordinationError> {
        if validators.is_empty() {
            return Err(CoordinationError::ValidatorSetEmpty);
        }
        let mut normalized = Vec::with_capacity(validators.len());
        for v in validators {
            let v = normalize_validator(v)?;
            if normalized
                .iter()
                .any(|existing: &Validator| existing.address == v.address)
            {
                return Err(CoordinationError::ValidatorAlreadyExists(v.address));
            }
            normalized.push(v);
        }

        let previous = self.get_set()?;
        let set = ValidatorSet {
            threshold: consensus_threshold(
                normalized.iter().filter(|v| v.active).count(),
            ),
            validators: normalized,
            version: previous.version + 1,
            updated_height: height,
        };
        self.persist(&set, height, "replace_all")?;
        Ok(set)
    }

    /// Add one validator. Fails on duplicate or malformed records.
    pub fn add_one(
        &self,
        validator: Validator,
        height: u64,
    ) -> Result<ValidatorSet, CoordinationError> {
        let validator = normalize_validator(validator)?;
        let mut set = self.get_set()?;
        if set.contains(&validator.address) {
            return Err(CoordinationError::ValidatorAlreadyExists(validator.address));
        }
        set.validators.push(validator);
        set.version += 1;
        set.updated_height = height;
        set.threshold = consensus_threshold(set.active_count());
        self.persist(&set, height, "add_one")?;
        Ok(set)
    }

    /// Remove one validator; removing the last one fails.
    pub fn remove_one(
        &self,
        address: &str,
        height: u64,
    ) -> Result<ValidatorSet, CoordinationError> {
        let mut set = self.get_set()?;
        if !set.contains(address) {
            return Err(CoordinationError::ValidatorNotFound(address.to_string()));
        }
        if set.validators.len() == 1 {
            return Err(CoordinationError::ValidatorSetEmpty);
        }
        set.validators.retain(|v| v.address != address);
        set.version += 1;
        set.updated_height = height;
        set.threshold = consensus_threshold(set.active_count());
        self.store.delete(&keys::validator_record(address))?;
        self.persist(&set, height, "remove_one")?;
        Ok(set)
    }

    /// Mismatch probe for external executors holding a mirror of the set.
    /// Order-sensitive: the set is ordered.
    pub fn verify_set_matches(
        &self,
        expected: &[Validator],
        expected_version: u64,
    ) -> Result<(bool, String), CoordinationError> {
        let set = self.get_set()?;
        if set.version != expected_version {
            return Ok((
                false,
                format!(
                    "version mismatch: registry at {}, caller expects {}",
                    set.version, expected_version
                ),
            ));
        }
        if set.validators.len() != expected.len() {
            return Ok((
                false,
                format!(
                    "size mismatch: registry has {}, caller expects {}",
                    set.validators.len(),
                    expected.len()
                ),
            ));
        }
        for (i, (actual, wanted)) in set.validators.iter().zip(expected.iter()).enumerate() {
            if actual.address != wanted.address {
                return Ok((
                    false,
                    format!(
                        "address mismatch at position {}: {} vs {}",
                        i, actual.address, wanted.address
                    ),
                ));
            }
            let wanted_key = icl_crypto::canonical_public_key(&wanted.public_key)
                .map_err(|e| CoordinationError::InvalidValidator(e.to_string()))?;
            if actual.public_key != wanted_key {
                return Ok((
                    false,
                    format!("public key mismatch for {}", actual.address),
                ));
            }
        }
        Ok((true, String::new()))
    }

    fn persist(
        &self,
        set: &ValidatorSet,
        height: u64,
        operation: &str,
    ) -> Result<(), CoordinationError> {
        // Rewrite the 0x04 records wholesale so stale entries never linger.
        for (key, _) in self.store.scan_prefix(&keys::validator_record_prefix())? {
            self.store.delete(&key)?;
        }
        for v in &set.validators {
            self.store.put_obj(&keys::validator_record(&v.address), v)?;
        }
        self.store.put_obj(keys::VALIDATOR_SET_ROOT, set)?;

        self.audit.record(
            AuditEntry::new(AuditEventType::ValidatorSetUpdated, height)
                .with_detail("operation", operation)
                .with_detail("version", set.version)
                .with_detail("threshold", set.threshold)
                .with_detail("validators", set.validators.len()),
        );
        Ok(())
    }
}

/// Canonicalize the public key and fill defaults before storage.
fn normalize_validator(mut v: Validator) -> Result<Validator, CoordinationError> {
    if v.address.is_empty() {
        return Err(CoordinationError::InvalidValidator(
            "address must be non-empty".to_string(),
        ));
    }
    let raw = icl_crypto::parse_address(&v.address)
        .map_err(|_| CoordinationError::InvalidValidator(format!("bad address {}", v.address)))?;
    if raw == [0u8; 20] {
        return Err(CoordinationError::InvalidValidator(
            "zero address is not a validator".to_string(),
        ));
    }
    v.address = v.address.to_lowercase();
    v.public_key = icl_crypto::canonical_public_key(&v.public_key)
        .map_err(|_| CoordinationError::InvalidValidator(format!("bad key for {}", v.address)))?;
    if v.joined_at == 0 {
        v.joined_at = unix_now();
    }
    Ok(v)
}
