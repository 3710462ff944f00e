// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// INTERCLEAR - RPC SURFACE
//
// warp HTTP+JSON endpoints for the two external boundaries:
// - administrative (validator-set management, transfer rejection)
// - relayer (vote submission, command queries, execution acks, audit)
// Every mutating request serializes through the coordinator mutex, so
// readers observe either the pre- or post-message state.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::coordinator::Coordinator;
use icl_core::{
    AuditEntry, AuditEventType, CoordinationError, MintCommand, TransferEvent, Validator,
    ValidatorSet, Vote,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use warp::http::StatusCode;
use warp::Filter;

pub type Shared = Arc<Mutex<Coordinator>>;

/// Identity block reported by /node-info.
#[derive(Debug, Clone)]
pub struct NodeIdentity {
    pub node_id: String,
    pub chain_id: String,
}

fn with_state(
    state: Shared,
) -> impl Filter<Extract = (Shared,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// JSON reply with an explicit status code, instead of bare
/// `warp::reply::json()` which always answers 200.
fn api_json(body: serde_json::Value) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(warp::reply::json(&body), StatusCode::OK)
}

fn api_error(err: &CoordinationError) -> warp::reply::WithStatus<warp::reply::Json> {
    let status = match err {
        CoordinationError::TransferNotFound(_)
        | CoordinationError::CommandNotFound(_)
        | CoordinationError::ValidatorNotFound(_) => StatusCode::NOT_FOUND,
        CoordinationError::DuplicateVote { .. }
        | CoordinationError::DuplicateSignature { .. }
        | CoordinationError::TransferAlreadyConfirmed(_)
        | CoordinationError::InvalidCommandStatus(_)
        | CoordinationError::ValidatorAlreadyExists(_)
        | CoordinationError::DuplicateCreditToken(_) => StatusCode::CONFLICT,
        CoordinationError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    };
    warp::reply::with_status(
        warp::reply::json(&json!({ "error": err.kind(), "detail": err.to_string() })),
        status,
    )
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SubmitVoteRequest {
    transfer_id: String,
    validator: String,
    event: TransferEvent,
    /// 65-byte r ‖ s ‖ v, hex
    signature: String,
    #[serde(default)]
    vote_time: u64,
}

#[derive(Debug, Deserialize)]
struct ValidatorInput {
    address: String,
    /// Compressed or uncompressed public key, hex
    public_key: String,
    #[serde(default = "one")]
    voting_power: u64,
    #[serde(default = "yes")]
    active: bool,
}

fn one() -> u64 {
    1
}

fn yes() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ReplaceValidatorsRequest {
    validators: Vec<ValidatorInput>,
}

#[derive(Debug, Deserialize)]
struct RemoveValidatorRequest {
    address: String,
}

#[derive(Debug, Deserialize)]
struct RejectTransferRequest {
    reason: String,
}

#[derive(Debug, Deserialize)]
struct AuditQuery {
    from: Option<u64>,
    to: Option<u64>,
    event_type: Option<String>,
    transfer_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct SignatureView {
    validator: String,
    r: String,
    s: String,
    v: u8,
    signed_at: u64,
}

#[derive(Debug, Serialize)]
struct CommandView {
    command_id: String,
    block_height: u64,
    target_chain: String,
    recipient: String,
    amount: u128,
    status: String,
    signatures: Vec<SignatureView>,
    created_at: u64,
}

impl From<&MintCommand> for CommandView {
    fn from(cmd: &MintCommand) -> Self {
        CommandView {
            command_id: cmd.command_id.clone(),
            block_height: cmd.block_height,
            target_chain: cmd.target_chain.clone(),
            recipient: cmd.recipient.clone(),
            amount: cmd.amount,
            status: format!("{:?}", cmd.status),
            signatures: cmd
                .signatures
                .iter()
                .map(|s| SignatureView {
                    validator: s.validator.clone(),
                    r: hex::encode(s.r),
                    s: hex::encode(s.s),
                    v: s.v,
                    signed_at: s.signed_at,
                })
                .collect(),
            created_at: cmd.created_at,
        }
    }
}

fn validator_from_input(input: ValidatorInput) -> Result<Validator, CoordinationError> {
    let public_key = hex::decode(&input.public_key).map_err(|_| {
        CoordinationError::InvalidValidator(format!(
            "public key for {} is not hex",
            input.address
        ))
    })?;
    Ok(Validator {
        address: input.address,
        public_key,
        voting_power: input.voting_power,
        active: input.active,
        joined_at: 0,
    })
}

fn set_view(set: &ValidatorSet) -> serde_json::Value {
    json!({
        "version": set.version,
        "threshold": set.threshold,
        "validators": set.validators.iter().map(|v| json!({
            "address": v.address,
            "public_key": hex::encode(&v.public_key),
            "voting_power": v.voting_power,
            "active": v.active,
        })).collect::<Vec<_>>(),
    })
}

fn audit_view(entries: &[AuditEntry]) -> serde_json::Value {
    json!(entries
        .iter()
        .map(|e| json!({
            "id": e.id,
            "event_type": e.event_type.tag(),
            "transfer_id": e.transfer_id,
            "details": e.details,
            "timestamp": e.timestamp,
            "block_height": e.block_height,
        }))
        .collect::<Vec<_>>())
}

// ── Routes ──────────────────────────────────────────────────────────

pub fn routes(
    state: Shared,
    identity: NodeIdentity,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    // Relayer: vote submission
    let submit_vote = warp::path!("votes")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .map(|req: SubmitVoteRequest, state: Shared| {
            let signature = match hex::decode(&req.signature) {
                Ok(bytes) => bytes,
                Err(_) => {
                    return api_error(&CoordinationError::InvalidSignature(
                        "signature is not hex".to_string(),
                    ))
                }
            };
            let vote = Vote {
                transfer_id: req.transfer_id,
                validator: req.validator,
                event: req.event,
                signature,
                submitted_at: req.vote_time,
            };
            let coordinator = state.lock().unwrap_or_else(|e| e.into_inner());
            match coordinator.submit_vote(vote) {
                Ok(outcome) => api_json(json!({
                    "votes": outcome.vote_count,
                    "threshold": outcome.threshold,
                    "confirmed": outcome.confirmed,
                })),
                Err(e) => api_error(&e),
            }
        });

    // Relayer: execution acknowledgment
    let mark_executed = warp::path!("commands" / String / "executed")
        .and(warp::post())
        .and(with_state(state.clone()))
        .map(|command_id: String, state: Shared| {
            let coordinator = state.lock().unwrap_or_else(|e| e.into_inner());
            match coordinator.mark_command_executed(&command_id) {
                Ok(cmd) => api_json(json!({ "command": CommandView::from(&cmd) })),
                Err(e) => api_error(&e),
            }
        });

    // Relayer: command queries
    let pending_commands = warp::path!("commands" / "pending")
        .and(warp::get())
        .and(with_state(state.clone()))
        .map(|state: Shared| {
            let coordinator = state.lock().unwrap_or_else(|e| e.into_inner());
            match coordinator.pending_commands() {
                Ok(cmds) => api_json(json!({
                    "commands": cmds.iter().map(CommandView::from).collect::<Vec<_>>()
                })),
                Err(e) => api_error(&e),
            }
        });

    let signed_commands = warp::path!("commands" / "signed")
        .and(warp::get())
        .and(with_state(state.clone()))
        .map(|state: Shared| {
            let coordinator = state.lock().unwrap_or_else(|e| e.into_inner());
            match coordinator.signed_commands() {
                Ok(cmds) => api_json(json!({
                    "commands": cmds.iter().map(CommandView::from).collect::<Vec<_>>()
                })),
                Err(e) => api_error(&e),
            }
        });

    // Relayer: confirmed transfer payload
    let confirmed_transfer = warp::path!("transfers" / String)
        .and(warp::get())
        .and(with_state(state.clone()))
        .map(|transfer_id: String, state: Shared| {
            let coordinator = state.lock().unwrap_or_else(|e| e.into_inner());
            match coordinator.confirmed_transfer(&transfer_id) {
                Ok(Some(event)) => api_json(json!({ "event": event })),
                Ok(None) => api_error(&CoordinationError::TransferNotFound(transfer_id)),
                Err(e) => api_error(&e),
            }
        });

    // Relayer: vote status
    let vote_status = warp::path!("transfers" / String / "status")
        .and(warp::get())
        .and(with_state(state.clone()))
        .map(|transfer_id: String, state: Shared| {
            let coordinator = state.lock().unwrap_or_else(|e| e.into_inner());
            match coordinator.vote_status(&transfer_id) {
                Ok((votes, threshold, confirmed)) => api_json(json!({
                    "votes": votes,
                    "threshold": threshold,
                    "confirmed": confirmed,
                })),
                Err(e) => api_error(&e),
            }
        });

    // Relayer: audit queries (time range, type tag, or transfer id)
    let audit = warp::path!("audit")
        .and(warp::get())
        .and(warp::query::<AuditQuery>())
        .and(with_state(state.clone()))
        .map(|query: AuditQuery, state: Shared| {
            let coordinator = state.lock().unwrap_or_else(|e| e.into_inner());
            let result = if let Some(tid) = &query.transfer_id {
                coordinator.audit().filter_by_transfer_id(tid)
            } else if let Some(tag) = &query.event_type {
                match AuditEventType::from_tag(tag) {
                    Some(event_type) => coordinator.audit().filter_by_type(event_type),
                    None => {
                        return warp::reply::with_status(
                            warp::reply::json(&json!({
                                "error": "unknown_event_type",
                                "detail": format!("no audit event type {}", tag),
                            })),
                            StatusCode::BAD_REQUEST,
                        )
                    }
                }
            } else {
                coordinator
                    .audit()
                    .range_by_time(query.from.unwrap_or(0), query.to.unwrap_or(u64::MAX))
            };
            match result {
                Ok(entries) => api_json(json!({ "entries": audit_view(&entries) })),
                Err(e) => api_error(&e),
            }
        });

    // Admin: replace the whole validator set
    let replace_validators = warp::path!("admin" / "validators")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .map(|req: ReplaceValidatorsRequest, state: Shared| {
            let validators: Result<Vec<Validator>, CoordinationError> =
                req.validators.into_iter().map(validator_from_input).collect();
            let validators = match validators {
                Ok(v) => v,
                Err(e) => return api_error(&e),
            };
            let coordinator = state.lock().unwrap_or_else(|e| e.into_inner());
            match coordinator.update_validator_set(validators) {
                Ok(set) => api_json(set_view(&set)),
                Err(e) => api_error(&e),
            }
        });

    // Admin: add one validator
    let add_validator = warp::path!("admin" / "validators" / "add")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .map(|req: ValidatorInput, state: Shared| {
            let validator = match validator_from_input(req) {
                Ok(v) => v,
                Err(e) => return api_error(&e),
            };
            let coordinator = state.lock().unwrap_or_else(|e| e.into_inner());
            match coordinator.add_validator(validator) {
                Ok(set) => api_json(set_view(&set)),
                Err(e) => api_error(&e),
            }
        });

    // Admin: remove one validator
    let remove_validator = warp::path!("admin" / "validators" / "remove")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .map(|req: RemoveValidatorRequest, state: Shared| {
            let coordinator = state.lock().unwrap_or_else(|e| e.into_inner());
            match coordinator.remove_validator(&req.address) {
                Ok(set) => api_json(set_view(&set)),
                Err(e) => api_error(&e),
            }
        });

    // Admin: reject a pending transfer
    let reject_transfer = warp::path!("admin" / "transfers" / String / "reject")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .map(|transfer_id: String, req: RejectTransferRequest, state: Shared| {
            let coordinator = state.lock().unwrap_or_else(|e| e.into_inner());
            match coordinator.reject_transfer(&transfer_id, &req.reason) {
                Ok(()) => api_json(json!({ "rejected": transfer_id })),
                Err(e) => api_error(&e),
            }
        });

    // Operator: node info
    let node_info = warp::path!("node-info")
        .and(warp::get())
        .and(with_state(state))
        .map(move |state: Shared| {
            let coordinator = state.lock().unwrap_or_else(|e| e.into_inner());
            let set = match coordinator.registry().get_set() {
                Ok(set) => set,
                Err(e) => return api_error(&e),
            };
            let audit_entries = coordinator.audit().count().unwrap_or(0);
            api_json(json!({
                "node_id": identity.node_id,
                "chain_id": identity.chain_id,
                "height": coordinator.height(),
                "validator_set_version": set.version,
                "threshold": set.threshold,
                "validators": set.validators.len(),
                "audit_entries": audit_entries,
            }))
        });

    submit_vote
        .or(mark_executed)
        .or(pending_commands)
        .or(signed_commands)
        .or(vote_status)
        .or(confirmed_transfer)
        .or(audit)
        .or(replace_validators)
        .or(add_validator)
        .or(remove_validator)
        .or(reject_transfer)
        .or(node_info)
}

/// Bind and serve until shutdown.
pub async fn serve(state: Shared, identity: NodeIdentity, socket: SocketAddr) {
    log::info!("rpc listening on {}", socket);
    warp::serve(routes(state, identity)).run(socket).await;
}
