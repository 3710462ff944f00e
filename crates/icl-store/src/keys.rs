// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// INTERCLEAR - STORE KEY LAYOUT
//
// Every persisted key is built here. Integer key components are
// big-endian so lexicographic scan order equals numeric order; the
// `netting-last` VALUE is 8 little-endian bytes (value, not key).
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Singleton validator-set root
pub const VALIDATOR_SET_ROOT: &[u8] = &[0x01];
/// Monotonic audit-id counter (u64 big-endian value)
pub const AUDIT_COUNTER: &[u8] = b"audit-counter";
/// Last executed netting-cycle height (u64 little-endian value)
pub const NETTING_LAST: &[u8] = b"netting-last";

const MINT_COMMAND_PREFIX: u8 = 0x02;
const COMMAND_SIGNATURE_PREFIX: u8 = 0x03;
const VALIDATOR_RECORD_PREFIX: u8 = 0x04;
const COMMAND_STATUS_PREFIX: u8 = 0x05;

fn tagged(tag: u8, parts: &[&[u8]]) -> Vec<u8> {
    let mut key = vec![tag];
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            key.push(b'/');
        }
        key.extend_from_slice(part);
    }
    key
}

/// `0x02{commandId}`: mint command record
pub fn mint_command(command_id: &str) -> Vec<u8> {
    tagged(MINT_COMMAND_PREFIX, &[command_id.as_bytes()])
}

pub fn mint_command_prefix() -> Vec<u8> {
    vec![MINT_COMMAND_PREFIX]
}

/// `0x03{commandId}/{validator}`: one collected signature
pub fn command_signature(command_id: &str, validator: &str) -> Vec<u8> {
    tagged(
        COMMAND_SIGNATURE_PREFIX,
        &[command_id.as_bytes(), validator.as_bytes()],
    )
}

pub fn command_signature_prefix(command_id: &str) -> Vec<u8> {
    let mut key = tagged(COMMAND_SIGNATURE_PREFIX, &[command_id.as_bytes()]);
    key.push(b'/');
    key
}

/// `0x04{address}`: validator record
pub fn validator_record(address: &str) -> Vec<u8> {
    tagged(VALIDATOR_RECORD_PREFIX, &[address.as_bytes()])
}

pub fn validator_record_prefix() -> Vec<u8> {
    vec![VALIDATOR_RECORD_PREFIX]
}

/// `0x05{commandId}`: command status shadow
pub fn command_status(command_id: &str) -> Vec<u8> {
    tagged(COMMAND_STATUS_PREFIX, &[command_id.as_bytes()])
}

/// `cred-bal/{bank}/{denom}`: IOU balance record
pub fn credit_balance(bank: &str, denom: &str) -> Vec<u8> {
    format!("cred-bal/{}/{}", bank, denom).into_bytes()
}

pub fn credit_balance_prefix() -> Vec<u8> {
    b"cred-bal/".to_vec()
}

/// `cred-meta/{denom}`: credit-token metadata
pub fn credit_meta(denom: &str) -> Vec<u8> {
    format!("cred-meta/{}", denom).into_bytes()
}

pub fn credit_meta_prefix() -> Vec<u8> {
    b"cred-meta/".to_vec()
}

/// `vote/{transferId}/{validator}`: single vote record
pub fn vote(transfer_id: &str, validator: &str) -> Vec<u8> {
    format!("vote/{}/{}", transfer_id, validator).into_bytes()
}

pub fn vote_prefix(transfer_id: &str) -> Vec<u8> {
    format!("vote/{}/", transfer_id).into_bytes()
}

/// `tally/{transferId}`: aggregate vote tally
pub fn tally(transfer_id: &str) -> Vec<u8> {
    format!("tally/{}", transfer_id).into_bytes()
}

/// `confirmed/{transferId}`: canonical confirmed transfer payload
pub fn confirmed(transfer_id: &str) -> Vec<u8> {
    format!("confirmed/{}", transfer_id).into_bytes()
}

/// `audit-id/{beId}`: primary audit index
pub fn audit_by_id(id: u64) -> Vec<u8> {
    let mut key = b"audit-id/".to_vec();
    key.extend_from_slice(&id.to_be_bytes());
    key
}

pub fn audit_id_prefix() -> Vec<u8> {
    b"audit-id/".to_vec()
}

/// `audit-t/{beTimestamp}/{beId}`: time secondary index
pub fn audit_by_time(timestamp: u64, id: u64) -> Vec<u8> {
    let mut key = b"audit-t/".to_vec();
    key.extend_from_slice(&timestamp.to_be_bytes());
    key.push(b'/');
    key.extend_from_slice(&id.to_be_bytes());
    key
}

/// Range bounds covering all time-index keys with `start <= ts <= end`.
pub fn audit_time_range(start: u64, end: u64) -> (Vec<u8>, Vec<u8>) {
    let mut lo = b"audit-t/".to_vec();
    lo.extend_from_slice(&start.to_be_bytes());
    let mut hi = b"audit-t/".to_vec();
    hi.extend_from_slice(&end.to_be_bytes());
    // '/' (0x2f) sorts above any timestamp byte run that ended, so bump
    // the upper bound past every id suffix of `end` itself.
    hi.push(b'/');
    hi.extend_from_slice(&u64::MAX.to_be_bytes());
    hi.push(0xff);
    (lo, hi)
}

/// `audit-type/{tag}/{beId}`: event-type secondary index
pub fn audit_by_type(tag: &str, id: u64) -> Vec<u8> {
    let mut key = format!("audit-type/{}/", tag).into_bytes();
    key.extend_from_slice(&id.to_be_bytes());
    key
}

pub fn audit_type_prefix(tag: &str) -> Vec<u8> {
    format!("audit-type/{}/", tag).into_bytes()
}

/// `netting-cycle/{beCycleId}`: netting cycle record
pub fn netting_cycle(cycle_id: u64) -> Vec<u8> {
    let mut key = b"netting-cycle/".to_vec();
    key.extend_from_slice(&cycle_id.to_be_bytes());
    key
}
