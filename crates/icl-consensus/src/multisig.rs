// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// INTERCLEAR - MULTISIG COMMAND POOL
//
// Destination-chain mint authorizations under assembly. Command ids are
// an 8-byte prefix of sha256(height ‖ chain ‖ recipient ‖ amount), so
// every validator derives the same id from the same inputs. Signatures
// are recoverable ECDSA over the Ethereum-prefixed keccak hash the
// executor contract verifies on-chain.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use icl_core::{
    unix_now, AuditEntry, AuditEventType, AuditLog, CommandStatus, CoordinationError,
    EcdsaSignature, MintCommand, MintCommandGenerator, ValidatorRegistry,
};
use icl_crypto::SignerOracle;
use icl_store::{keys, KvStore, KvStoreExt};
use std::sync::Arc;

/// Empirical gas coefficients for the executor's mint path.
pub const MINT_GAS_BASE: u64 = 50_000;
pub const MINT_GAS_PER_SIGNATURE: u64 = 5_000;
pub const MINT_GAS_EXECUTION: u64 = 30_000;

/// `(base + per_sig·n + execution) · 1.2`, integer math.
pub fn estimate_mint_gas(signature_count: usize) -> u64 {
    (MINT_GAS_BASE + MINT_GAS_PER_SIGNATURE * signature_count as u64 + MINT_GAS_EXECUTION) * 12
        / 10
}

/// u128 amount as the 32-byte big-endian wire field.
pub fn amount_be32(amount: u128) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[16..].copy_from_slice(&amount.to_be_bytes());
    out
}

/// Full 32-byte command digest:
/// `sha256(height_be8 ‖ target_chain ‖ recipient_20 ‖ amount_be32)`.
fn command_digest(
    block_height: u64,
    target_chain: &str,
    recipient: &[u8; 20],
    amount: u128,
) -> [u8; 32] {
    let mut data = Vec::with_capacity(8 + target_chain.len() + 20 + 32);
    data.extend_from_slice(&block_height.to_be_bytes());
    data.extend_from_slice(target_chain.as_bytes());
    data.extend_from_slice(recipient);
    data.extend_from_slice(&amount_be32(amount));
    icl_crypto::sha256(&data)
}

fn command_id_from_digest(digest: &[u8; 32]) -> String {
    format!("cmd-{}", hex::encode(&digest[..8]))
}

pub struct CommandPool {
    store: Arc<dyn KvStore>,
    audit: Arc<AuditLog>,
    registry: Arc<ValidatorRegistry>,
}

impl CommandPool {
    pub fn new(
        store: Arc<dyn KvStore>,
        audit: Arc<AuditLog>,
        registry: Arc<ValidatorRegistry>,
    ) -> Self {
        Self {
            store,
            audit,
            registry,
        }
    }

    /// Digest of a stored command, recomputed from its fields.
    pub fn digest(cmd: &MintCommand) -> Result<[u8; 32], CoordinationError> {
        let recipient = parse_recipient(&cmd.recipient)?;
        Ok(command_digest(
            cmd.block_height,
            &cmd.target_chain,
            &recipient,
            cmd.amount,
        ))
    }

    /// The digest validators sign and the executor contract verifies:
    /// `keccak256("\x19Ethereum Signed Message:\n32" ‖
    ///  keccak256(commandDigest ‖ recipient ‖ amount_be32 ‖ chainId))`.
    pub fn signable_hash(cmd: &MintCommand) -> Result<[u8; 32], CoordinationError> {
        let recipient = parse_recipient(&cmd.recipient)?;
        let digest = Self::digest(cmd)?;
        let mut data = Vec::with_capacity(32 + 20 + 32 + cmd.target_chain.len());
        data.extend_from_slice(&digest);
        data.extend_from_slice(&recipient);
        data.extend_from_slice(&amount_be32(cmd.amount));
        data.extend_from_slice(cmd.target_chain.as_bytes());
        let h = icl_crypto::keccak256(&data);
        Ok(icl_crypto::eth_signed_message_hash(&h))
    }

    pub fn get_command(
        &self,
        command_id: &str,
    ) -> Result<Option<MintCommand>, CoordinationError> {
        Ok(self.store.get_obj(&keys::mint_command(command_id))?)
    }

    /// Collect one validator signature. Rejects unknown commands,
    /// duplicate signers, non-validators, and signatures that fail
    /// recovery. Crossing the registry's current threshold flips the
    /// command to Signed.
    pub fn add_signature(
        &self,
        command_id: &str,
        signature: EcdsaSignature,
    ) -> Result<MintCommand, CoordinationError> {
        let mut cmd = self.require_command(command_id)?;
        if matches!(cmd.status, CommandStatus::Executed | CommandStatus::Failed) {
            return Err(CoordinationError::InvalidCommandStatus(format!(
                "command {} is {:?}, signatures closed",
                command_id, cmd.status
            )));
        }
        signature.validate()?;

        let validator = self
            .registry
            .get_validator(&signature.validator)?
            .filter(|v| v.active)
            .ok_or_else(|| {
                CoordinationError::ValidatorNotActive(signature.validator.clone())
            })?;
        if cmd.has_signed(&signature.validator) {
            return Err(CoordinationError::DuplicateSignature {
                command_id: command_id.to_string(),
                validator: signature.validator.clone(),
            });
        }

        let digest = Self::signable_hash(&cmd)?;
        if !icl_crypto::verify_recoverable(
            &validator.public_key,
            &digest,
            &signature.r,
            &signature.s,
            signature.v,
        ) {
            return Err(CoordinationError::InvalidSignature(format!(
                "command signature does not recover to validator {}",
                signature.validator
            )));
        }

        self.store.put_obj(
            &keys::command_signature(command_id, &signature.validator),
            &signature,
        )?;
        cmd.signatures.push(signature.clone());

        self.audit.record(
            AuditEntry::new(AuditEventType::CommandSigned, cmd.block_height)
                .with_detail("command_id", command_id)
                .with_detail("validator", &signature.validator)
                .with_detail("signatures", cmd.signer_count()),
        );

        let threshold = self.registry.threshold()?;
        if cmd.status == CommandStatus::Pending && cmd.signer_count() >= threshold {
            cmd.status = CommandStatus::Signed;
            self.audit.record(
                AuditEntry::new(AuditEventType::ThresholdReached, cmd.block_height)
                    .with_detail("command_id", command_id)
                    .with_detail("signatures", cmd.signer_count())
                    .with_detail("threshold", threshold),
            );
            log::info!(
                "command {} reached threshold with {} signatures",
                command_id,
                cmd.signer_count()
            );
        }
        self.persist(&cmd)?;
        Ok(cmd)
    }

    /// Pre-flight re-check before handing a command to the executor:
    /// threshold met under the CURRENT registry and every signature
    /// independently verifies.
    pub fn verify_command(&self, cmd: &MintCommand) -> Result<bool, CoordinationError> {
        if cmd.signer_count() < self.registry.threshold()? {
            return Ok(false);
        }
        let digest = Self::signable_hash(cmd)?;
        for sig in &cmd.signatures {
            let validator = match self.registry.get_validator(&sig.validator)? {
                Some(v) => v,
                None => return Ok(false),
            };
            if !icl_crypto::verify_recoverable(
                &validator.public_key,
                &digest,
                &sig.r,
                &sig.s,
                sig.v,
            ) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Acknowledge destination-chain execution. Only a Signed command
    /// can become Executed; a second acknowledgment fails.
    pub fn mark_executed(&self, command_id: &str) -> Result<MintCommand, CoordinationError> {
        let mut cmd = self.require_command(command_id)?;
        if cmd.status != CommandStatus::Signed {
            return Err(CoordinationError::InvalidCommandStatus(format!(
                "command {} is {:?}, expected Signed",
                command_id, cmd.status
            )));
        }
        cmd.status = CommandStatus::Executed;
        self.persist(&cmd)?;

        self.audit.record(
            AuditEntry::new(AuditEventType::CommandExecuted, cmd.block_height)
                .with_detail("command_id", command_id),
        );
        Ok(cmd)
    }

    pub fn all_pending(&self) -> Result<Vec<MintCommand>, CoordinationError> {
        self.by_status(CommandStatus::Pending)
    }

    pub fn all_signed(&self) -> Result<Vec<MintCommand>, CoordinationError> {
        self.by_status(CommandStatus::Signed)
    }

    fn by_status(&self, status: CommandStatus) -> Result<Vec<MintCommand>, CoordinationError> {
        let mut commands = Vec::new();
        for (_, value) in self.store.scan_prefix(&keys::mint_command_prefix())? {
            let cmd: MintCommand = bincode::deserialize(&value)
                .map_err(|e| CoordinationError::Store(e.to_string()))?;
            if cmd.status == status {
                commands.push(cmd);
            }
        }
        Ok(commands)
    }

    /// Block-tick signing sweep: for every active validator whose key
    /// this node holds, sign every pending command it has not signed
    /// yet. Per-pair failures are logged and never abort the sweep.
    pub fn process_pending(&self, signer: &dyn SignerOracle) -> Result<u32, CoordinationError> {
        let held = signer.held_addresses();
        if held.is_empty() {
            return Ok(0);
        }
        let set = self.registry.get_set()?;
        let mut signed = 0u32;

        for mut cmd in self.all_pending()? {
            let digest = match Self::signable_hash(&cmd) {
                Ok(d) => d,
                Err(e) => {
                    log::warn!("skipping unsignable command {}: {}", cmd.command_id, e);
                    continue;
                }
            };
            for validator in set.validators.iter().filter(|v| v.active) {
                if cmd.status != CommandStatus::Pending {
                    break;
                }
                if cmd.has_signed(&validator.address) || !held.contains(&validator.address) {
                    continue;
                }
                let (r, s, v) = match signer.sign_digest(&validator.address, &digest) {
                    None => continue,
                    Some(Err(e)) => {
                        log::warn!(
                            "signer failed for {} on {}: {}",
                            validator.address,
                            cmd.command_id,
                            e
                        );
                        continue;
                    }
                    Some(Ok(parts)) => parts,
                };
                let signature = EcdsaSignature {
                    validator: validator.address.clone(),
                    r,
                    s,
                    v,
                    signed_at: unix_now(),
                };
                match self.add_signature(&cmd.command_id, signature) {
                    Ok(updated) => {
                        cmd = updated;
                        signed += 1;
                    }
                    Err(CoordinationError::DuplicateSignature { .. }) => {}
                    Err(e) => {
                        log::warn!(
                            "signature rejected for {} on {}: {}",
                            validator.address,
                            cmd.command_id,
                            e
                        );
                    }
                }
            }
        }
        Ok(signed)
    }

    fn require_command(&self, command_id: &str) -> Result<MintCommand, CoordinationError> {
        self.get_command(command_id)?
            .ok_or_else(|| CoordinationError::CommandNotFound(command_id.to_string()))
    }

    fn persist(&self, cmd: &MintCommand) -> Result<(), CoordinationError> {
        self.store
            .put_obj(&keys::mint_command(&cmd.command_id), cmd)?;
        self.store
            .put_obj(&keys::command_status(&cmd.command_id), &cmd.status)?;
        Ok(())
    }
}

impl MintCommandGenerator for CommandPool {
    /// Open a Pending mint command. Deterministic: identical inputs at
    /// the same height reproduce the same id, and regeneration of an
    /// existing command returns the stored record unchanged.
    fn generate_mint_command(
        &self,
        target_chain: &str,
        recipient: &str,
        amount: u128,
        height: u64,
    ) -> Result<MintCommand, CoordinationError> {
        if target_chain.is_empty() {
            return Err(CoordinationError::InvalidBankID(
                "target chain id must be non-empty".to_string(),
            ));
        }
        if amount == 0 {
            return Err(CoordinationError::InvalidAmount(
                "mint amount must be strictly positive".to_string(),
            ));
        }
        let recipient_bytes = parse_recipient(recipient)?;

        let digest = command_digest(height, target_chain, &recipient_bytes, amount);
        let command_id = command_id_from_digest(&digest);
        if let Some(existing) = self.get_command(&command_id)? {
            return Ok(existing);
        }

        let cmd = MintCommand {
            command_id: command_id.clone(),
            block_height: height,
            target_chain: target_chain.to_string(),
            recipient: recipient.to_string(),
            amount,
            signatures: Vec::new(),
            created_at: unix_now(),
            status: CommandStatus::Pending,
        };
        self.persist(&cmd)?;

        self.audit.record(
            AuditEntry::new(AuditEventType::CommandGenerated, height)
                .with_detail("command_id", &command_id)
                .with_detail("target_chain", target_chain)
                .with_detail("amount", amount),
        );
        Ok(cmd)
    }
}

fn parse_recipient(recipient: &str) -> Result<[u8; 20], CoordinationError> {
    icl_crypto::parse_address(recipient)
        .map_err(|_| CoordinationError::InvalidRecipient(recipient.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use icl_core::Validator;
    use icl_crypto::LocalKeyring;
    use icl_store::MemoryKv;

    const RECIPIENT: &str = "0x2222222222222222222222222222222222222222";

    struct Harness {
        audit: Arc<AuditLog>,
        registry: Arc<ValidatorRegistry>,
        pool: CommandPool,
        keys: Vec<icl_crypto::KeyPair>,
        addresses: Vec<String>,
    }

    fn harness(validator_count: usize) -> Harness {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let audit = Arc::new(AuditLog::new(store.clone()));
        let registry = Arc::new(ValidatorRegistry::new(store.clone(), audit.clone()));

        let keys: Vec<_> = (0..validator_count)
            .map(|_| icl_crypto::generate_keypair())
            .collect();
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

        let pool = CommandPool::new(store, audit.clone(), registry.clone());
        Harness {
            audit,
            registry,
            pool,
            keys,
            addresses,
        }
    }

    fn sign_command(h: &Harness, cmd: &MintCommand, index: usize) -> EcdsaSignature {
        let digest = CommandPool::signable_hash(cmd).unwrap();
        let (r, s, v) =
            icl_crypto::sign_recoverable(&h.keys[index].secret_key, &digest).unwrap();
        EcdsaSignature {
            validator: h.addresses[index].clone(),
            r,
            s,
            v,
            signed_at: 0,
        }
    }

    #[test]
    fn test_command_id_is_deterministic() {
        let h = harness(3);
        let a = h
            .pool
            .generate_mint_command("bank-b", RECIPIENT, 100, 7)
            .unwrap();
        let b = h
            .pool
            .generate_mint_command("bank-b", RECIPIENT, 100, 7)
            .unwrap();
        assert_eq!(a.command_id, b.command_id);
        assert_eq!(h.pool.all_pending().unwrap().len(), 1);

        // Any differing input changes the id
        let other_height = h
            .pool
            .generate_mint_command("bank-b", RECIPIENT, 100, 8)
            .unwrap();
        let other_amount = h
            .pool
            .generate_mint_command("bank-b", RECIPIENT, 101, 7)
            .unwrap();
        assert_ne!(a.command_id, other_height.command_id);
        assert_ne!(a.command_id, other_amount.command_id);
        assert!(a.command_id.starts_with("cmd-"));
        assert_eq!(a.command_id.len(), 4 + 16);
    }

    #[test]
    fn test_generate_validates_inputs() {
        let h = harness(3);
        assert!(matches!(
            h.pool.generate_mint_command("bank-b", RECIPIENT, 0, 7),
            Err(CoordinationError::InvalidAmount(_))
        ));
        assert!(matches!(
            h.pool.generate_mint_command("", RECIPIENT, 10, 7),
            Err(CoordinationError::InvalidBankID(_))
        ));
        assert!(matches!(
            h.pool.generate_mint_command("bank-b", "not-an-address", 10, 7),
            Err(CoordinationError::InvalidRecipient(_))
        ));
    }

    #[test]
    fn test_threshold_transition_to_signed() {
        let h = harness(3); // threshold 2
        let cmd = h
            .pool
            .generate_mint_command("bank-b", RECIPIENT, 100, 7)
            .unwrap();

        let after_one = h
            .pool
            .add_signature(&cmd.command_id, sign_command(&h, &cmd, 0))
            .unwrap();
        assert_eq!(after_one.status, CommandStatus::Pending);

        let after_two = h
            .pool
            .add_signature(&cmd.command_id, sign_command(&h, &cmd, 1))
            .unwrap();
        assert_eq!(after_two.status, CommandStatus::Signed);
        assert_eq!(after_two.signer_count(), 2);

        assert_eq!(h.pool.all_signed().unwrap().len(), 1);
        assert!(h.pool.all_pending().unwrap().is_empty());
        assert!(h.pool.verify_command(&after_two).unwrap());
    }

    #[test]
    fn test_duplicate_signature_rejected_without_state_change() {
        let h = harness(3);
        let cmd = h
            .pool
            .generate_mint_command("bank-b", RECIPIENT, 100, 7)
            .unwrap();
        h.pool
            .add_signature(&cmd.command_id, sign_command(&h, &cmd, 0))
            .unwrap();

        let err = h
            .pool
            .add_signature(&cmd.command_id, sign_command(&h, &cmd, 0))
            .unwrap_err();
        assert!(matches!(err, CoordinationError::DuplicateSignature { .. }));
        assert_eq!(
            h.pool
                .get_command(&cmd.command_id)
                .unwrap()
                .unwrap()
                .signer_count(),
            1
        );
    }

    #[test]
    fn test_bad_signatures_rejected() {
        let h = harness(3);
        let cmd = h
            .pool
            .generate_mint_command("bank-b", RECIPIENT, 100, 7)
            .unwrap();

        assert!(matches!(
            h.pool.add_signature("cmd-ffffffffffffffff", sign_command(&h, &cmd, 0)),
            Err(CoordinationError::CommandNotFound(_))
        ));

        // Signature over a different command
        let other = h
            .pool
            .generate_mint_command("bank-b", RECIPIENT, 999, 7)
            .unwrap();
        let misdirected = sign_command(&h, &other, 0);
        assert!(matches!(
            h.pool.add_signature(&cmd.command_id, misdirected),
            Err(CoordinationError::InvalidSignature(_))
        ));

        // Outsider key
        let outsider = icl_crypto::generate_keypair();
        let digest = CommandPool::signable_hash(&cmd).unwrap();
        let (r, s, v) = icl_crypto::sign_recoverable(&outsider.secret_key, &digest).unwrap();
        let foreign = EcdsaSignature {
            validator: icl_crypto::derive_address(&outsider.public_key).unwrap(),
            r,
            s,
            v,
            signed_at: 0,
        };
        assert!(matches!(
            h.pool.add_signature(&cmd.command_id, foreign),
            Err(CoordinationError::ValidatorNotActive(_))
        ));

        // Malformed recovery byte
        let mut bad_v = sign_command(&h, &cmd, 1);
        bad_v.v = 9;
        assert!(matches!(
            h.pool.add_signature(&cmd.command_id, bad_v),
            Err(CoordinationError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_executed_lifecycle() {
        let h = harness(3);
        let cmd = h
            .pool
            .generate_mint_command("bank-b", RECIPIENT, 100, 7)
            .unwrap();

        // Pending commands cannot be executed
        assert!(matches!(
            h.pool.mark_executed(&cmd.command_id),
            Err(CoordinationError::InvalidCommandStatus(_))
        ));

        h.pool
            .add_signature(&cmd.command_id, sign_command(&h, &cmd, 0))
            .unwrap();
        h.pool
            .add_signature(&cmd.command_id, sign_command(&h, &cmd, 1))
            .unwrap();
        let executed = h.pool.mark_executed(&cmd.command_id).unwrap();
        assert_eq!(executed.status, CommandStatus::Executed);

        // Second acknowledgment fails, state unchanged
        assert!(matches!(
            h.pool.mark_executed(&cmd.command_id),
            Err(CoordinationError::InvalidCommandStatus(_))
        ));
        assert_eq!(
            h.pool
                .get_command(&cmd.command_id)
                .unwrap()
                .unwrap()
                .status,
            CommandStatus::Executed
        );

        // Executed commands accept no further signatures
        assert!(matches!(
            h.pool.add_signature(&cmd.command_id, sign_command(&h, &cmd, 2)),
            Err(CoordinationError::InvalidCommandStatus(_))
        ));
    }

    #[test]
    fn test_verify_command_with_stale_registry() {
        let h = harness(3);
        let cmd = h
            .pool
            .generate_mint_command("bank-b", RECIPIENT, 100, 7)
            .unwrap();
        h.pool
            .add_signature(&cmd.command_id, sign_command(&h, &cmd, 0))
            .unwrap();
        let signed = h
            .pool
            .add_signature(&cmd.command_id, sign_command(&h, &cmd, 1))
            .unwrap();
        assert!(h.pool.verify_command(&signed).unwrap());

        // Signer 0 leaves the set: the stored command no longer verifies
        h.registry.remove_one(&h.addresses[0], 9).unwrap();
        assert!(!h.pool.verify_command(&signed).unwrap());
    }

    #[test]
    fn test_process_pending_signs_with_held_keys() {
        let h = harness(3);
        let cmd = h
            .pool
            .generate_mint_command("bank-b", RECIPIENT, 100, 7)
            .unwrap();

        // Node holds keys for validators 0 and 1
        let mut keyring = LocalKeyring::new();
        keyring.insert_secret(&h.keys[0].secret_key).unwrap();
        keyring.insert_secret(&h.keys[1].secret_key).unwrap();

        let signed = h.pool.process_pending(&keyring).unwrap();
        assert_eq!(signed, 2);
        let updated = h.pool.get_command(&cmd.command_id).unwrap().unwrap();
        assert_eq!(updated.status, CommandStatus::Signed);

        // Sweep again: nothing pending, nothing signed
        assert_eq!(h.pool.process_pending(&keyring).unwrap(), 0);
    }

    #[test]
    fn test_process_pending_without_keys_is_noop() {
        let h = harness(3);
        h.pool
            .generate_mint_command("bank-b", RECIPIENT, 100, 7)
            .unwrap();
        let keyring = LocalKeyring::new();
        assert_eq!(h.pool.process_pending(&keyring).unwrap(), 0);
        assert_eq!(h.pool.all_pending().unwrap().len(), 1);
    }

    #[test]
    fn test_gas_estimate_coefficients() {
        // (50k + 5k·n + 30k) · 1.2
        assert_eq!(estimate_mint_gas(0), 96_000);
        assert_eq!(estimate_mint_gas(2), 108_000);
        assert_eq!(estimate_mint_gas(7), 138_000);
    }

    #[test]
    fn test_amount_wire_encoding() {
        let enc = amount_be32(1);
        assert_eq!(enc[31], 1);
        assert!(enc[..31].iter().all(|b| *b == 0));

        let max = amount_be32(u128::MAX);
        assert!(max[..16].iter().all(|b| *b == 0));
        assert!(max[16..].iter().all(|b| *b == 0xff));
    }

    #[test]
    fn test_signed_audit_trail() {
        let h = harness(3);
        let cmd = h
            .pool
            .generate_mint_command("bank-b", RECIPIENT, 100, 7)
            .unwrap();
        h.pool
            .add_signature(&cmd.command_id, sign_command(&h, &cmd, 0))
            .unwrap();
        h.pool
            .add_signature(&cmd.command_id, sign_command(&h, &cmd, 1))
            .unwrap();
        h.pool.mark_executed(&cmd.command_id).unwrap();

        let tags: Vec<&str> = [
            AuditEventType::CommandGenerated,
            AuditEventType::CommandSigned,
            AuditEventType::ThresholdReached,
            AuditEventType::CommandExecuted,
        ]
        .iter()
        .map(|t| t.tag())
        .collect();
        for (tag, expected_count) in tags.iter().zip([1usize, 2, 1, 1]) {
            let entries = h
                .audit
                .filter_by_type(AuditEventType::from_tag(tag).unwrap())
                .unwrap();
            assert_eq!(entries.len(), expected_count, "tag {}", tag);
        }
    }
}
