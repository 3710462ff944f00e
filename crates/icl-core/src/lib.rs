// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// INTERCLEAR - CORE MODULE
//
// Domain model of the netting and clearing coordinator: transfer events,
// votes and tallies, validator sets, IOU credit tokens, mint commands,
// netting cycles. All financial arithmetic uses u128 atomic units.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod audit;
pub mod error;
pub mod registry;

pub use audit::{AuditEntry, AuditEventType, AuditLog};
pub use error::CoordinationError;
pub use registry::ValidatorRegistry;

/// Transfer ids are 32 opaque bytes, carried as lowercase hex
pub const TRANSFER_ID_BYTES: usize = 32;
/// Credit denominations are "cred-" + issuer bank id
pub const CREDIT_DENOM_PREFIX: &str = "cred-";
/// Seconds per block on the coordination chain (tick cadence)
pub const DEFAULT_BLOCK_TIME_SECS: u64 = 6;
/// Minimum blocks between two netting cycles
pub const DEFAULT_NETTING_MIN_INTERVAL: u64 = 10;
/// Blocks before an unconfirmed tally counts as expired
pub const DEFAULT_CONSENSUS_TIMEOUT_BLOCKS: u64 = 100;

/// Credit denomination for debt issued by `issuer_bank`.
pub fn credit_denom(issuer_bank: &str) -> String {
    format!("{}{}", CREDIT_DENOM_PREFIX, issuer_bank)
}

/// Issuer bank id of a credit denomination, if well-formed.
pub fn denom_issuer(denom: &str) -> Option<&str> {
    denom
        .strip_prefix(CREDIT_DENOM_PREFIX)
        .filter(|issuer| !issuer.is_empty())
}

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Decode a transfer id into its 32 raw bytes.
pub fn decode_transfer_id(transfer_id: &str) -> Result<[u8; TRANSFER_ID_BYTES], CoordinationError> {
    let stripped = transfer_id.strip_prefix("0x").unwrap_or(transfer_id);
    let bytes = hex::decode(stripped)
        .map_err(|_| CoordinationError::InvalidTransferId(transfer_id.to_string()))?;
    if bytes.len() != TRANSFER_ID_BYTES {
        return Err(CoordinationError::InvalidTransferId(transfer_id.to_string()));
    }
    let mut out = [0u8; TRANSFER_ID_BYTES];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Canonical off-chain record of a source-chain burn. Immutable once the
/// first vote for its transfer id is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    pub transfer_id: String,
    /// Sender address in the source chain's format
    pub sender: String,
    /// Recipient address in the destination chain's format (0x + 20 bytes)
    pub recipient: String,
    pub amount: u128,
    /// Monotonic per source chain
    pub nonce: u64,
    pub source_chain: String,
    pub dest_chain: String,
    pub source_height: u64,
    pub source_timestamp: u64,
}

impl TransferEvent {
    /// Structural checks applied before a first vote may create a tally.
    pub fn validate(&self) -> Result<(), CoordinationError> {
        decode_transfer_id(&self.transfer_id)?;
        if self.amount == 0 {
            return Err(CoordinationError::InvalidAmount(
                "transfer amount must be strictly positive".to_string(),
            ));
        }
        if self.source_chain.is_empty() || self.dest_chain.is_empty() {
            return Err(CoordinationError::InvalidBankID(
                "source and destination chain ids must be non-empty".to_string(),
            ));
        }
        if self.source_chain == self.dest_chain {
            return Err(CoordinationError::InvalidBankID(format!(
                "source and destination chain must differ (both {})",
                self.source_chain
            )));
        }
        Ok(())
    }
}

/// One validator's attestation of a transfer event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub transfer_id: String,
    pub validator: String,
    pub event: TransferEvent,
    /// 65-byte r ‖ s ‖ v over the raw transfer-id bytes
    pub signature: Vec<u8>,
    pub submitted_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TallyStatus {
    Pending,
    Confirmed,
    Rejected,
}

/// Aggregate voting state for one transfer id. The threshold is frozen
/// at tally creation; later validator-set changes never re-threshold an
/// open tally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub transfer_id: String,
    pub votes: Vec<Vote>,
    pub status: TallyStatus,
    /// Threshold snapshot taken when the first vote arrived
    pub threshold: u32,
    pub created_at: u64,
    pub confirmed_at: Option<u64>,
    pub reject_reason: Option<String>,
}

impl VoteTally {
    pub fn vote_count(&self) -> u32 {
        self.votes.len() as u32
    }

    pub fn has_voted(&self, validator: &str) -> bool {
        self.votes.iter().any(|v| v.validator == validator)
    }

    pub fn confirmed(&self) -> bool {
        self.status == TallyStatus::Confirmed
    }

    /// The canonical event payload every vote must match.
    pub fn canonical_event(&self) -> Option<&TransferEvent> {
        self.votes.first().map(|v| &v.event)
    }
}

/// Signing member of the consortium.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub address: String,
    /// secp256k1 public key, canonicalized to 65 uncompressed bytes at
    /// registration
    pub public_key: Vec<u8>,
    pub voting_power: u64,
    pub active: bool,
    pub joined_at: u64,
}

/// Ordered validator set with a monotonic version counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSet {
    pub validators: Vec<Validator>,
    /// ⌈2n/3⌉ over the active count, at least 1
    pub threshold: u32,
    pub version: u64,
    pub updated_height: u64,
}

impl ValidatorSet {
    pub fn active_count(&self) -> usize {
        self.validators.iter().filter(|v| v.active).count()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.validators.iter().any(|v| v.address == address)
    }
}

/// `⌈2n/3⌉ = (2n + 2) / 3`, clamped to at least 1.
pub fn consensus_threshold(active_count: usize) -> u32 {
    let t = (2 * active_count as u64 + 2) / 3;
    t.max(1) as u32
}

/// Per-issuer credit denomination metadata. Stored once per denom and
/// never mutated by balance operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditToken {
    pub denom: String,
    pub issuer_bank: String,
    pub holder_bank: String,
    /// Amount at first issuance
    pub amount: u128,
    /// Transfer id that created the denomination
    pub origin_tx: String,
    pub issued_at: u64,
}

impl CreditToken {
    pub fn validate(&self) -> Result<(), CoordinationError> {
        if self.denom.is_empty() {
            return Err(CoordinationError::InvalidCreditToken(
                "denomination must be non-empty".to_string(),
            ));
        }
        match denom_issuer(&self.denom) {
            Some(issuer) if issuer == self.issuer_bank => {}
            _ => {
                return Err(CoordinationError::InvalidCreditToken(format!(
                    "denomination {} does not match issuer {}",
                    self.denom, self.issuer_bank
                )))
            }
        }
        if self.issuer_bank.is_empty() || self.holder_bank.is_empty() {
            return Err(CoordinationError::InvalidBankID(
                "issuer and holder bank ids must be non-empty".to_string(),
            ));
        }
        if self.issuer_bank == self.holder_bank {
            return Err(CoordinationError::InvalidBankID(format!(
                "bank {} cannot hold its own credit",
                self.issuer_bank
            )));
        }
        if self.amount == 0 {
            return Err(CoordinationError::InvalidAmount(
                "issuance amount must be strictly positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandStatus {
    Pending,
    Signed,
    Executed,
    Failed,
}

/// One validator's ECDSA signature over a mint command's signable hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcdsaSignature {
    pub validator: String,
    pub r: [u8; 32],
    pub s: [u8; 32],
    /// Recovery byte, {0, 1, 27, 28} on the wire
    pub v: u8,
    pub signed_at: u64,
}

impl EcdsaSignature {
    pub fn validate(&self) -> Result<(), CoordinationError> {
        if self.r == [0u8; 32] || self.s == [0u8; 32] {
            return Err(CoordinationError::InvalidSignature(
                "r and s must be non-zero".to_string(),
            ));
        }
        if !matches!(self.v, 0 | 1 | 27 | 28) {
            return Err(CoordinationError::InvalidSignature(format!(
                "recovery byte {} outside {{0, 1, 27, 28}}",
                self.v
            )));
        }
        Ok(())
    }
}

/// Destination-chain mint authorization under assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintCommand {
    /// `cmd-` + hex of the first 8 digest bytes
    pub command_id: String,
    pub block_height: u64,
    pub target_chain: String,
    pub recipient: String,
    pub amount: u128,
    pub signatures: Vec<EcdsaSignature>,
    pub created_at: u64,
    pub status: CommandStatus,
}

impl MintCommand {
    /// Distinct signer count; the signature list itself never holds
    /// duplicates, this guards derived data anyway.
    pub fn signer_count(&self) -> u32 {
        let mut seen: Vec<&str> = self
            .signatures
            .iter()
            .map(|s| s.validator.as_str())
            .collect();
        seen.sort_unstable();
        seen.dedup();
        seen.len() as u32
    }

    pub fn has_signed(&self, validator: &str) -> bool {
        self.signatures.iter().any(|s| s.validator == validator)
    }
}

/// One ordered bank pair with mutual credit positions. `a_owes_b` is the
/// position booked as `balance(bank_a, cred-{bank_b})`, mirroring the
/// ledger's debt-position query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankPair {
    pub bank_a: String,
    pub bank_b: String,
    pub a_owes_b: u128,
    pub b_owes_a: u128,
    pub net_amount: u128,
    pub net_debtor: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// One periodic bilateral offset pass, identified by its trigger height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NettingCycle {
    pub cycle_id: u64,
    pub pairs: Vec<BankPair>,
    /// Positive: net creditor after the cycle; negative: net debtor
    pub net_by_bank: BTreeMap<String, i128>,
    pub started_at: u64,
    pub finished_at: Option<u64>,
    pub status: CycleStatus,
}

/// Capability handle the oracle drives on confirmation: book the
/// confirmed transfer as IOU credit to the destination bank.
pub trait CreditSink {
    fn issue_confirmed_credit(
        &self,
        event: &TransferEvent,
        height: u64,
    ) -> Result<(), CoordinationError>;
}

/// Capability handle the oracle drives on confirmation: open a mint
/// command for the destination chain.
pub trait MintCommandGenerator {
    fn generate_mint_command(
        &self,
        target_chain: &str,
        recipient: &str,
        amount: u128,
        height: u64,
    ) -> Result<MintCommand, CoordinationError>;
}
