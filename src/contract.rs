use std::collections::HashSet;

#[cfg(not(feature = "library"))]
use cosmwasm_std::entry_point;
use cosmwasm_std::{
    to_binary, Addr, BankMsg, Binary, CosmosMsg, Deps, DepsMut, Env, MessageInfo, Order, Reply,
    Response, StdResult, Storage, SubMsg, SubMsgResult, WasmMsg,
};
use cw2::set_contract_version;
use cw_storage_plus::Bound;
use cw_utils::{maybe_addr, Duration};

use crate::auth::verify_relayed_approval;
use crate::error::ContractError;
use crate::msg::{
    ApprovalSignature, ExecuteMsg, InstantiateMsg, NonceResponse, OwnerListResponse, OwnerResponse,
    OwnerSpec, ProposalAction, ProposalListResponse, ProposalResponse, QueryMsg, ThresholdResponse,
};
use crate::state::{
    next_id, Config, OwnerInfo, Proposal, Status, CONFIG, NONCES, OPEN_COUNT, OWNERS, OWNER_COUNT,
    PROPOSALS,
};

// version info for migration info
const CONTRACT_NAME: &str = "crates.io:cw-threshold-multisig";
const CONTRACT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Bound on live proposals, keeping the table within storage limits.
/// Terminal proposals can always be pruned with Close to free capacity.
pub const MAX_OPEN_PROPOSALS: u64 = 100;
/// Bound on actions per proposal, enforced before anything is stored.
pub const MAX_ACTIONS: usize = 16;

const COMPRESSED_PUBKEY_LEN: usize = 33;

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn instantiate(
    deps: DepsMut,
    _env: Env,
    _info: MessageInfo,
    msg: InstantiateMsg,
) -> Result<Response, ContractError> {
    set_contract_version(deps.storage, CONTRACT_NAME, CONTRACT_VERSION)?;

    let owners = validate_owner_set(deps.as_ref(), &msg.owners, msg.threshold)?;
    save_owner_set(deps.storage, owners)?;

    let cfg = Config {
        threshold: msg.threshold,
        expiry_window: msg.expiry_window,
    };
    CONFIG.save(deps.storage, &cfg)?;
    OPEN_COUNT.save(deps.storage, &0)?;

    Ok(Response::default())
}

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn execute(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    msg: ExecuteMsg,
) -> Result<Response, ContractError> {
    match msg {
        ExecuteMsg::Propose {
            title,
            description,
            actions,
        } => execute_propose(deps, env, info, title, description, actions),
        ExecuteMsg::Sign { proposal_id, auth } => execute_sign(deps, env, info, proposal_id, auth),
        ExecuteMsg::Execute { proposal_id } => execute_retry(deps, env, info, proposal_id),
        ExecuteMsg::Close { proposal_id } => execute_close(deps, env, info, proposal_id),
        ExecuteMsg::UpdateConfig {
            owners,
            threshold,
            expiry_window,
        } => execute_update_config(deps, env, info, owners, threshold, expiry_window),
        ExecuteMsg::DispatchPayload { proposal_id } => {
            execute_dispatch_payload(deps, env, info, proposal_id)
        }
    }
}

pub fn execute_propose(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    title: String,
    description: String,
    actions: Vec<ProposalAction>,
) -> Result<Response, ContractError> {
    // only owners may open proposals
    if !OWNERS.has(deps.storage, &info.sender) {
        return Err(ContractError::Unauthorized {});
    }
    validate_actions(deps.as_ref(), &actions)?;

    let open = OPEN_COUNT.load(deps.storage)?;
    if open >= MAX_OPEN_PROPOSALS {
        return Err(ContractError::StorageExhausted {});
    }

    let cfg = CONFIG.load(deps.storage)?;

    // creating the proposal and recording the creator's approval are a
    // single step, so there is never a zero-approval window
    let mut prop = Proposal {
        title,
        description,
        actions,
        status: Status::Open,
        expires: cfg.expiry_window.after(&env.block),
        approvals: vec![info.sender.clone()],
        threshold: cfg.threshold,
        dispatched: false,
    };
    let id = next_id(deps.storage)?;

    let mut res = Response::new()
        .add_attribute("action", "propose")
        .add_attribute("sender", info.sender)
        .add_attribute("proposal_id", id.to_string());

    if prop.quorum_reached() {
        // a threshold of one executes in the same message
        prop.status = Status::Executed;
        res = res.add_submessage(dispatch_submsg(&env, id)?);
    } else {
        OPEN_COUNT.save(deps.storage, &(open + 1))?;
    }
    res = res.add_attribute("status", format!("{:?}", prop.status));
    PROPOSALS.save(deps.storage, id, &prop)?;

    Ok(res)
}

pub fn execute_sign(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    proposal_id: u64,
    auth: Option<ApprovalSignature>,
) -> Result<Response, ContractError> {
    let signer = match auth {
        // relayed approval: anyone may carry an owner's detached signature
        Some(auth) => verify_relayed_approval(
            deps.storage,
            deps.api,
            &env.contract.address,
            proposal_id,
            &auth,
        )?,
        None => {
            if !OWNERS.has(deps.storage, &info.sender) {
                return Err(ContractError::Unauthorized {});
            }
            info.sender.clone()
        }
    };

    let mut prop = PROPOSALS
        .may_load(deps.storage, proposal_id)?
        .ok_or(ContractError::UnknownProposal {})?;
    // executed proposals accept no further signatures
    if prop.status != Status::Open {
        return Err(ContractError::UnknownProposal {});
    }
    if prop.expires.is_expired(&env.block) {
        return Err(ContractError::Expired {});
    }
    if prop.has_approved(&signer) {
        return Err(ContractError::AlreadySigned {});
    }
    prop.approvals.push(signer.clone());

    let mut res = Response::new()
        .add_attribute("action", "sign")
        .add_attribute("sender", info.sender)
        .add_attribute("signer", signer)
        .add_attribute("proposal_id", proposal_id.to_string());

    if prop.quorum_reached() {
        // the k-th approval and the dispatch are one atomic step; no
        // ordering of sign messages can trigger this twice
        prop.status = Status::Executed;
        release_open_slot(deps.storage)?;
        res = res.add_submessage(dispatch_submsg(&env, proposal_id)?);
    }
    res = res.add_attribute("status", format!("{:?}", prop.status));
    PROPOSALS.save(deps.storage, proposal_id, &prop)?;

    Ok(res)
}

pub fn execute_retry(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    proposal_id: u64,
) -> Result<Response, ContractError> {
    if !OWNERS.has(deps.storage, &info.sender) {
        return Err(ContractError::Unauthorized {});
    }

    let mut prop = PROPOSALS
        .may_load(deps.storage, proposal_id)?
        .ok_or(ContractError::UnknownProposal {})?;
    // only proposals a failed dispatch rolled back qualify: open, with quorum
    if prop.status != Status::Open || !prop.quorum_reached() {
        return Err(ContractError::WrongExecuteStatus {});
    }
    if prop.expires.is_expired(&env.block) {
        return Err(ContractError::Expired {});
    }

    prop.status = Status::Executed;
    release_open_slot(deps.storage)?;
    PROPOSALS.save(deps.storage, proposal_id, &prop)?;

    Ok(Response::new()
        .add_submessage(dispatch_submsg(&env, proposal_id)?)
        .add_attribute("action", "execute")
        .add_attribute("sender", info.sender)
        .add_attribute("proposal_id", proposal_id.to_string()))
}

pub fn execute_close(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    proposal_id: u64,
) -> Result<Response, ContractError> {
    // anyone can prune a terminal proposal; the id is never reused
    let prop = PROPOSALS
        .may_load(deps.storage, proposal_id)?
        .ok_or(ContractError::UnknownProposal {})?;

    match prop.current_status(&env.block) {
        Status::Open => return Err(ContractError::NotExpired {}),
        Status::Expired => {
            // stored status is still Open, so this frees a live slot
            release_open_slot(deps.storage)?;
        }
        Status::Executed => {}
    }
    PROPOSALS.remove(deps.storage, proposal_id);

    Ok(Response::new()
        .add_attribute("action", "close")
        .add_attribute("sender", info.sender)
        .add_attribute("proposal_id", proposal_id.to_string()))
}

pub fn execute_update_config(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    owners: Vec<OwnerSpec>,
    threshold: u64,
    expiry_window: Option<Duration>,
) -> Result<Response, ContractError> {
    // self-amendment only: reachable solely through an executed proposal
    if info.sender != env.contract.address {
        return Err(ContractError::Unauthorized {});
    }

    let validated = validate_owner_set(deps.as_ref(), &owners, threshold)?;
    save_owner_set(deps.storage, validated)?;
    CONFIG.update(deps.storage, |mut cfg| -> StdResult<_> {
        cfg.threshold = threshold;
        if let Some(window) = expiry_window {
            cfg.expiry_window = window;
        }
        Ok(cfg)
    })?;

    Ok(Response::new()
        .add_attribute("action", "update_config")
        .add_attribute("threshold", threshold.to_string()))
}

pub fn execute_dispatch_payload(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    proposal_id: u64,
) -> Result<Response, ContractError> {
    if info.sender != env.contract.address {
        return Err(ContractError::Unauthorized {});
    }

    let mut prop = PROPOSALS
        .may_load(deps.storage, proposal_id)?
        .ok_or(ContractError::UnknownProposal {})?;
    if prop.status != Status::Executed || prop.dispatched {
        return Err(ContractError::WrongExecuteStatus {});
    }
    // the flag write lives in the same sub-transaction as the payload:
    // a failed dispatch reverts it, a successful one burns the id for good
    prop.dispatched = true;
    PROPOSALS.save(deps.storage, proposal_id, &prop)?;

    let msgs = prop
        .actions
        .iter()
        .map(|action| action_to_msg(&env, action))
        .collect::<StdResult<Vec<CosmosMsg>>>()?;

    Ok(Response::new()
        .add_messages(msgs)
        .add_attribute("action", "dispatch")
        .add_attribute("proposal_id", proposal_id.to_string()))
}

/// The payload runs in its own submessage so the action set commits or
/// reverts as a unit; failures come back through reply() with the
/// proposal id.
fn dispatch_submsg(env: &Env, proposal_id: u64) -> StdResult<SubMsg> {
    let msg = WasmMsg::Execute {
        contract_addr: env.contract.address.to_string(),
        msg: to_binary(&ExecuteMsg::DispatchPayload { proposal_id })?,
        funds: vec![],
    };
    Ok(SubMsg::reply_on_error(msg, proposal_id))
}

fn action_to_msg(env: &Env, action: &ProposalAction) -> StdResult<CosmosMsg> {
    let msg = match action {
        ProposalAction::TransferValue { recipient, amount } => BankMsg::Send {
            to_address: recipient.clone(),
            amount: amount.clone(),
        }
        .into(),
        ProposalAction::UpdateOwners {
            owners,
            threshold,
            expiry_window,
        } => WasmMsg::Execute {
            contract_addr: env.contract.address.to_string(),
            msg: to_binary(&ExecuteMsg::UpdateConfig {
                owners: owners.clone(),
                threshold: *threshold,
                expiry_window: *expiry_window,
            })?,
            funds: vec![],
        }
        .into(),
        ProposalAction::Raw(msg) => msg.clone(),
    };
    Ok(msg)
}

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn reply(deps: DepsMut, _env: Env, msg: Reply) -> Result<Response, ContractError> {
    match msg.result {
        // only reply_on_error submessages are registered
        SubMsgResult::Ok(_) => Ok(Response::new()),
        SubMsgResult::Err(err) => rollback_failed_dispatch(deps, msg.id, err),
    }
}

/// Recovery policy for a failed dispatch: the proposal reopens with its
/// approvals intact and any owner may retry with Execute once the cause
/// (e.g. missing contract balance) is fixed. The failed dispatch itself
/// had no effect, so re-dispatching cannot double-spend.
fn rollback_failed_dispatch(
    deps: DepsMut,
    proposal_id: u64,
    err: String,
) -> Result<Response, ContractError> {
    let mut prop = PROPOSALS
        .may_load(deps.storage, proposal_id)?
        .ok_or(ContractError::ExecutionFailed { reason: err.clone() })?;
    if prop.status != Status::Executed {
        return Err(ContractError::ExecutionFailed { reason: err });
    }

    prop.status = Status::Open;
    PROPOSALS.save(deps.storage, proposal_id, &prop)?;
    let open = OPEN_COUNT.load(deps.storage)?;
    OPEN_COUNT.save(deps.storage, &(open + 1))?;

    Ok(Response::new()
        .add_attribute("action", "execution_failed")
        .add_attribute("proposal_id", proposal_id.to_string())
        .add_attribute("error", err))
}

fn validate_actions(deps: Deps, actions: &[ProposalAction]) -> Result<(), ContractError> {
    if actions.is_empty() {
        return Err(ContractError::InvalidPayload {
            reason: "empty action set".to_string(),
        });
    }
    if actions.len() > MAX_ACTIONS {
        return Err(ContractError::InvalidPayload {
            reason: "too many actions".to_string(),
        });
    }
    for action in actions {
        match action {
            ProposalAction::TransferValue { recipient, amount } => {
                deps.api
                    .addr_validate(recipient)
                    .map_err(|_| ContractError::InvalidPayload {
                        reason: format!("invalid recipient: {}", recipient),
                    })?;
                if amount.is_empty() || amount.iter().any(|c| c.amount.is_zero()) {
                    return Err(ContractError::InvalidPayload {
                        reason: "transfer amount must be positive".to_string(),
                    });
                }
            }
            ProposalAction::UpdateOwners {
                owners, threshold, ..
            } => {
                // surface a bad replacement set at propose time, not at dispatch
                validate_owner_set(deps, owners, *threshold).map_err(|err| {
                    ContractError::InvalidPayload {
                        reason: err.to_string(),
                    }
                })?;
            }
            ProposalAction::Raw(_) => {}
        }
    }
    Ok(())
}

fn validate_owner_set(
    deps: Deps,
    specs: &[OwnerSpec],
    threshold: u64,
) -> Result<Vec<(Addr, OwnerInfo)>, ContractError> {
    if specs.is_empty() {
        return Err(ContractError::NoOwners {});
    }
    if threshold == 0 || threshold > specs.len() as u64 {
        return Err(ContractError::InvalidThreshold {});
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut owners = Vec::with_capacity(specs.len());
    for spec in specs {
        let addr = deps.api.addr_validate(&spec.addr)?;
        if !seen.insert(addr.to_string()) {
            return Err(ContractError::DuplicateOwner {
                addr: spec.addr.clone(),
            });
        }
        if let Some(pubkey) = &spec.pubkey {
            if pubkey.len() != COMPRESSED_PUBKEY_LEN {
                return Err(ContractError::InvalidPubkey {});
            }
        }
        owners.push((
            addr,
            OwnerInfo {
                pubkey: spec.pubkey.clone(),
            },
        ));
    }
    Ok(owners)
}

fn save_owner_set(storage: &mut dyn Storage, owners: Vec<(Addr, OwnerInfo)>) -> StdResult<()> {
    let old: Vec<Addr> = OWNERS
        .keys(storage, None, None, Order::Ascending)
        .collect::<StdResult<_>>()?;
    for addr in old {
        OWNERS.remove(storage, &addr);
    }
    OWNER_COUNT.save(storage, &(owners.len() as u64))?;
    for (addr, info) in owners {
        OWNERS.save(storage, &addr, &info)?;
    }
    Ok(())
}

fn release_open_slot(storage: &mut dyn Storage) -> StdResult<()> {
    let open = OPEN_COUNT.load(storage)?;
    OPEN_COUNT.save(storage, &open.saturating_sub(1))
}

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn query(deps: Deps, env: Env, msg: QueryMsg) -> StdResult<Binary> {
    match msg {
        QueryMsg::Threshold {} => to_binary(&query_threshold(deps)?),
        QueryMsg::Owners { start_after, limit } => {
            to_binary(&query_owners(deps, start_after, limit)?)
        }
        QueryMsg::Proposal { proposal_id } => to_binary(&query_proposal(deps, env, proposal_id)?),
        QueryMsg::ListProposals { start_after, limit } => {
            to_binary(&list_proposals(deps, env, start_after, limit)?)
        }
        QueryMsg::Nonce { owner } => to_binary(&query_nonce(deps, owner)?),
    }
}

fn query_threshold(deps: Deps) -> StdResult<ThresholdResponse> {
    let cfg = CONFIG.load(deps.storage)?;
    Ok(ThresholdResponse {
        threshold: cfg.threshold,
        total_owners: OWNER_COUNT.load(deps.storage)?,
    })
}

// settings for pagination
const MAX_LIMIT: u32 = 30;
const DEFAULT_LIMIT: u32 = 10;

fn query_owners(
    deps: Deps,
    start_after: Option<String>,
    limit: Option<u32>,
) -> StdResult<OwnerListResponse> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT) as usize;
    let addr = maybe_addr(deps.api, start_after)?;
    let start = addr.as_ref().map(Bound::exclusive);

    let owners: StdResult<Vec<_>> = OWNERS
        .range(deps.storage, start, None, Order::Ascending)
        .take(limit)
        .map(|item| {
            let (addr, info) = item?;
            Ok(OwnerResponse {
                addr,
                pubkey: info.pubkey,
            })
        })
        .collect();

    Ok(OwnerListResponse { owners: owners? })
}

fn query_proposal(deps: Deps, env: Env, id: u64) -> StdResult<ProposalResponse> {
    let prop = PROPOSALS.load(deps.storage, id)?;
    Ok(map_proposal(&env, id, prop))
}

fn list_proposals(
    deps: Deps,
    env: Env,
    start_after: Option<u64>,
    limit: Option<u32>,
) -> StdResult<ProposalListResponse> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT) as usize;
    let start = start_after.map(Bound::exclusive);

    let proposals: StdResult<Vec<_>> = PROPOSALS
        .range(deps.storage, start, None, Order::Ascending)
        .take(limit)
        .map(|item| {
            let (id, prop) = item?;
            Ok(map_proposal(&env, id, prop))
        })
        .collect();

    Ok(ProposalListResponse {
        proposals: proposals?,
    })
}

fn map_proposal(env: &Env, id: u64, prop: Proposal) -> ProposalResponse {
    let status = prop.current_status(&env.block);
    ProposalResponse {
        id,
        title: prop.title,
        description: prop.description,
        actions: prop.actions,
        status,
        expires: prop.expires,
        approvals: prop.approvals,
        threshold: prop.threshold,
    }
}

fn query_nonce(deps: Deps, owner: String) -> StdResult<NonceResponse> {
    let owner = deps.api.addr_validate(&owner)?;
    Ok(NonceResponse {
        nonce: NONCES.may_load(deps.storage, &owner)?.unwrap_or_default(),
    })
}
