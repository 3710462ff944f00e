// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// INTERCLEAR - ERROR TAXONOMY
//
// Typed failure kinds surfaced by every coordinator subsystem. The first
// error aborts the enclosing message-processing step; audit-log append
// failures are the one exception (logged, never propagated).
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use icl_store::StoreError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinationError {
    // ── Oracle / voting ─────────────────────────────────────────────
    /// Vote or signature from an address outside the active set
    ValidatorNotActive(String),
    /// Signature malformed or recovered to the wrong key
    InvalidSignature(String),
    /// A second vote from the same (transfer, validator)
    DuplicateVote { transfer_id: String, validator: String },
    /// Vote payload diverges from the tally's canonical event
    EventPayloadMismatch(String),
    /// No tally exists for the queried transfer id
    TransferNotFound(String),
    /// Transfer id is not 32 hex-encoded bytes
    InvalidTransferId(String),
    /// Reject attempted on an already-confirmed tally
    TransferAlreadyConfirmed(String),
    /// Confirmation attempted below threshold (internal guard)
    InsufficientVotes { have: u32, need: u32 },

    // ── Multisig command pool ───────────────────────────────────────
    /// A second signature from the same (command, validator)
    DuplicateSignature { command_id: String, validator: String },
    CommandNotFound(String),
    /// Transition not allowed from the command's current status
    InvalidCommandStatus(String),
    /// Mint recipient is not a 0x-prefixed 20-byte address
    InvalidRecipient(String),

    // ── IOU ledger ──────────────────────────────────────────────────
    InsufficientBalance {
        bank: String,
        denom: String,
        have: u128,
        need: u128,
    },
    InvalidCreditToken(String),
    InvalidBankID(String),
    InvalidAmount(String),
    DuplicateCreditToken(String),

    // ── Netting ─────────────────────────────────────────────────────
    /// Interval not elapsed, or no mutual positions to offset
    NettingNotRequired,

    // ── Validator registry ──────────────────────────────────────────
    ValidatorSetEmpty,
    ValidatorAlreadyExists(String),
    ValidatorNotFound(String),
    /// Malformed validator record (empty or unparseable address/key)
    InvalidValidator(String),

    // ── Persistence ─────────────────────────────────────────────────
    Store(String),
}

impl CoordinationError {
    /// Stable machine-readable kind tag (RPC error field).
    pub fn kind(&self) -> &'static str {
        match self {
            CoordinationError::ValidatorNotActive(_) => "validator_not_active",
            CoordinationError::InvalidSignature(_) => "invalid_signature",
            CoordinationError::DuplicateVote { .. } => "duplicate_vote",
            CoordinationError::EventPayloadMismatch(_) => "event_payload_mismatch",
            CoordinationError::TransferNotFound(_) => "transfer_not_found",
            CoordinationError::InvalidTransferId(_) => "invalid_transfer_id",
            CoordinationError::TransferAlreadyConfirmed(_) => "transfer_already_confirmed",
            CoordinationError::InsufficientVotes { .. } => "insufficient_votes",
            CoordinationError::DuplicateSignature { .. } => "duplicate_signature",
            CoordinationError::CommandNotFound(_) => "command_not_found",
            CoordinationError::InvalidCommandStatus(_) => "invalid_command_status",
            CoordinationError::InvalidRecipient(_) => "invalid_recipient",
            CoordinationError::InsufficientBalance { .. } => "insufficient_balance",
            CoordinationError::InvalidCreditToken(_) => "invalid_credit_token",
            CoordinationError::InvalidBankID(_) => "invalid_bank_id",
            CoordinationError::InvalidAmount(_) => "invalid_amount",
            CoordinationError::DuplicateCreditToken(_) => "duplicate_credit_token",
            CoordinationError::NettingNotRequired => "netting_not_required",
            CoordinationError::ValidatorSetEmpty => "validator_set_empty",
            CoordinationError::ValidatorAlreadyExists(_) => "validator_already_exists",
            CoordinationError::ValidatorNotFound(_) => "validator_not_found",
            CoordinationError::InvalidValidator(_) => "invalid_validator",
            CoordinationError::Store(_) => "store_error",
        }
    }
}

impl std::fmt::Display for CoordinationError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            CoordinationError::ValidatorNotActive(addr) => {
                write!(f, "validator {} is not in the active set", addr)
            }
            CoordinationError::InvalidSignature(msg) => write!(f, "invalid signature: {}", msg),
            CoordinationError::DuplicateVote {
                transfer_id,
                validator,
            } => write!(
                f,
                "validator {} already voted on transfer {}",
                validator, transfer_id
            ),
            CoordinationError::EventPayloadMismatch(transfer_id) => write!(
                f,
                "vote payload differs from the recorded event for transfer {}",
                transfer_id
            ),
            CoordinationError::TransferNotFound(id) => write!(f, "no tally for transfer {}", id),
            CoordinationError::InvalidTransferId(id) => {
                write!(f, "transfer id {} is not 32 hex bytes", id)
            }
            CoordinationError::TransferAlreadyConfirmed(id) => {
                write!(f, "transfer {} is already confirmed", id)
            }
            CoordinationError::InsufficientVotes { have, need } => {
                write!(f, "insufficient votes: {} of {}", have, need)
            }
            CoordinationError::DuplicateSignature {
                command_id,
                validator,
            } => write!(
                f,
                "validator {} already signed command {}",
                validator, command_id
            ),
            CoordinationError::CommandNotFound(id) => write!(f, "no command {}", id),
            CoordinationError::InvalidCommandStatus(msg) => {
                write!(f, "invalid command status: {}", msg)
            }
            CoordinationError::InvalidRecipient(r) => {
                write!(f, "recipient {} is not a 20-byte 0x address", r)
            }
            CoordinationError::InsufficientBalance {
                bank,
                denom,
                have,
                need,
            } => write!(
                f,
                "bank {} holds {} {} but {} is required",
                bank, have, denom, need
            ),
            CoordinationError::InvalidCreditToken(msg) => {
                write!(f, "invalid credit token: {}", msg)
            }
            CoordinationError::InvalidBankID(msg) => write!(f, "invalid bank id: {}", msg),
            CoordinationError::InvalidAmount(msg) => write!(f, "invalid amount: {}", msg),
            CoordinationError::DuplicateCreditToken(denom) => {
                write!(f, "credit token {} already exists", denom)
            }
            CoordinationError::NettingNotRequired => write!(f, "netting not required"),
            CoordinationError::ValidatorSetEmpty => {
                write!(f, "operation would leave the validator set empty")
            }
            CoordinationError::ValidatorAlreadyExists(addr) => {
                write!(f, "validator {} already registered", addr)
            }
            CoordinationError::ValidatorNotFound(addr) => {
                write!(f, "validator {} not registered", addr)
            }
            CoordinationError::InvalidValidator(msg) => write!(f, "invalid validator: {}", msg),
            CoordinationError::Store(msg) => write!(f, "store failure: {}", msg),
        }
    }
}

impl std::error::Error for CoordinationError {}

impl From<StoreError> for CoordinationError {
    fn from(e: StoreError) -> Self {
        CoordinationError::Store(e.to_string())
    }
}
