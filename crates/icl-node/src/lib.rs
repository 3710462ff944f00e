// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// INTERCLEAR - NODE MODULE
//
// Coordinator pipeline (wiring of audit, registry, ledger, oracle,
// netting, multisig), TOML/env configuration, and the warp RPC surface
// serving validator operators and the relayer.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub mod config;
pub mod coordinator;
pub mod rpc;

pub use config::{BootstrapSet, CoordinatorConfig};
pub use coordinator::{Coordinator, TickSummary};
