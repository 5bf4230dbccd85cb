use cosmwasm_schema::cw_serde;
use cosmwasm_std::{Addr, Binary, BlockInfo, StdResult, Storage};
use cw_storage_plus::{Item, Map};
use cw_utils::{Duration, Expiration};

use crate::msg::ProposalAction;

#[cw_serde]
pub struct Config {
    pub threshold: u64,
    /// fixed signing window applied to every new proposal
    pub expiry_window: Duration,
}

#[cw_serde]
pub struct OwnerInfo {
    /// compressed secp256k1 key enabling relayed approvals, if registered
    pub pubkey: Option<Binary>,
}

#[cw_serde]
#[derive(Copy)]
pub enum Status {
    /// accepting signatures
    Open,
    Executed,
    Expired,
}

#[cw_serde]
pub struct Proposal {
    pub title: String,
    pub description: String,
    pub actions: Vec<ProposalAction>,
    pub status: Status,
    pub expires: Expiration,
    /// distinct approving owners, in arrival order
    pub approvals: Vec<Addr>,
    /// threshold snapshotted at creation; later self-amendment only
    /// affects proposals opened after it executes
    pub threshold: u64,
    /// set once the payload has gone out; a consumed id can never be
    /// dispatched again, even by a later proposal replaying the call
    pub dispatched: bool,
}

impl Proposal {
    /// Expiry is evaluated lazily: an open proposal past its boundary is
    /// expired, no sweeper message required.
    pub fn current_status(&self, block: &BlockInfo) -> Status {
        if self.status == Status::Open && self.expires.is_expired(block) {
            Status::Expired
        } else {
            self.status
        }
    }

    pub fn has_approved(&self, owner: &Addr) -> bool {
        self.approvals.iter().any(|a| a == owner)
    }

    /// Order-independent quorum check over the distinct approval set.
    pub fn quorum_reached(&self) -> bool {
        self.approvals.len() as u64 >= self.threshold
    }
}

pub const CONFIG: Item<Config> = Item::new("config");
pub const OWNERS: Map<&Addr, OwnerInfo> = Map::new("owners");
pub const OWNER_COUNT: Item<u64> = Item::new("owner_count");
pub const PROPOSALS: Map<u64, Proposal> = Map::new("proposals");
pub const PROPOSAL_COUNT: Item<u64> = Item::new("proposal_count");
/// live (non-terminal) proposals, bounded by MAX_OPEN_PROPOSALS
pub const OPEN_COUNT: Item<u64> = Item::new("open_count");
/// per-owner consumed-nonce high-water marks for relayed approvals
pub const NONCES: Map<&Addr, u64> = Map::new("nonces");

/// Allocates the next proposal id. Ids are never reused, even for
/// proposals later pruned from the table.
pub fn next_id(store: &mut dyn Storage) -> StdResult<u64> {
    let id: u64 = PROPOSAL_COUNT.may_load(store)?.unwrap_or_default() + 1;
    PROPOSAL_COUNT.save(store, &id)?;
    Ok(id)
}
