// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// INTERCLEAR - CONSENSUS MODULE
//
// Validator consensus over cross-chain transfers:
// - voting:   per-transfer vote tallies, ≥2/3 confirmation, credit and
//             mint-command side-effects through capability handles
// - multisig: mint-command pool collecting threshold ECDSA signatures
//             for the destination-chain executor contract
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub mod multisig;
pub mod voting;

pub use multisig::CommandPool;
pub use voting::{Oracle, VoteOutcome};
