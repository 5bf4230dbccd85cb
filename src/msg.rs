use cosmwasm_schema::{cw_serde, QueryResponses};
use cosmwasm_std::{Addr, Binary, Coin, CosmosMsg};
use cw_utils::{Duration, Expiration};

use crate::state::Status;

#[cw_serde]
pub struct InstantiateMsg {
    pub owners: Vec<OwnerSpec>,
    /// distinct approvals required to execute, 1 <= threshold <= |owners|
    pub threshold: u64,
    /// signing window applied to every proposal from its creation block
    pub expiry_window: Duration,
}

#[cw_serde]
pub struct OwnerSpec {
    pub addr: String,
    /// 33-byte compressed secp256k1 key; registering one lets third
    /// parties relay this owner's approvals
    pub pubkey: Option<Binary>,
}

/// Typed action payload. Every variant is validated in full at propose
/// time, so dispatch can never hit a malformed action.
#[cw_serde]
pub enum ProposalAction {
    /// Send funds from the contract's balance.
    TransferValue {
        recipient: String,
        amount: Vec<Coin>,
    },
    /// Replace the owner set and threshold (self-amendment). Goes through
    /// the same quorum pipeline as any other action.
    UpdateOwners {
        owners: Vec<OwnerSpec>,
        threshold: u64,
        expiry_window: Option<Duration>,
    },
    /// Arbitrary message dispatched as-is.
    Raw(CosmosMsg),
}

/// Detached owner approval for relayed submission. The signature is a
/// 64-byte secp256k1 signature over the digest described in [`crate::auth`].
#[cw_serde]
pub struct ApprovalSignature {
    /// the owner this approval speaks for
    pub owner: String,
    /// must be strictly greater than the owner's consumed-nonce mark
    pub nonce: u64,
    pub signature: Binary,
}

#[cw_serde]
pub enum ExecuteMsg {
    Propose {
        title: String,
        description: String,
        actions: Vec<ProposalAction>,
    },
    /// Approve an open proposal. With `auth` set, anyone may submit on
    /// behalf of the signing owner; without it the sender must be an owner.
    Sign {
        proposal_id: u64,
        auth: Option<ApprovalSignature>,
    },
    /// Re-dispatch an open proposal that already has quorum. Only
    /// reachable after a failed dispatch rolled the proposal back.
    Execute { proposal_id: u64 },
    /// Prune an executed or expired proposal from storage.
    Close { proposal_id: u64 },
    /// Self-amendment target; only the contract itself may call this.
    UpdateConfig {
        owners: Vec<OwnerSpec>,
        threshold: u64,
        expiry_window: Option<Duration>,
    },
    /// Internal dispatch step; only the contract itself may call this.
    DispatchPayload { proposal_id: u64 },
}

#[cw_serde]
#[derive(QueryResponses)]
pub enum QueryMsg {
    #[returns(ThresholdResponse)]
    Threshold {},
    #[returns(OwnerListResponse)]
    Owners {
        start_after: Option<String>,
        limit: Option<u32>,
    },
    #[returns(ProposalResponse)]
    Proposal { proposal_id: u64 },
    #[returns(ProposalListResponse)]
    ListProposals {
        start_after: Option<u64>,
        limit: Option<u32>,
    },
    /// Consumed-nonce high-water mark for relayed approvals.
    #[returns(NonceResponse)]
    Nonce { owner: String },
}

#[cw_serde]
pub struct ThresholdResponse {
    pub threshold: u64,
    pub total_owners: u64,
}

#[cw_serde]
pub struct OwnerResponse {
    pub addr: Addr,
    pub pubkey: Option<Binary>,
}

#[cw_serde]
pub struct OwnerListResponse {
    pub owners: Vec<OwnerResponse>,
}

#[cw_serde]
pub struct ProposalResponse {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub actions: Vec<ProposalAction>,
    /// lazily evaluated against the current block
    pub status: Status,
    pub expires: Expiration,
    pub approvals: Vec<Addr>,
    pub threshold: u64,
}

#[cw_serde]
pub struct ProposalListResponse {
    pub proposals: Vec<ProposalResponse>,
}

#[cw_serde]
pub struct NonceResponse {
    pub nonce: u64,
}
