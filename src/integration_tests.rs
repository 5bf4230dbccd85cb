#![cfg(test)]

use cosmwasm_std::{coins, Addr, Coin, Empty};
use cw_multi_test::{App, Contract, ContractWrapper, Executor};
use cw_utils::Duration;

use crate::contract::{execute, instantiate, query, reply};
use crate::error::ContractError;
use crate::msg::{
    ExecuteMsg, InstantiateMsg, OwnerSpec, ProposalAction, ProposalResponse, QueryMsg,
    ThresholdResponse,
};
use crate::state::Status;

const DENOM: &str = "ujuno";

fn contract_multisig() -> Box<dyn Contract<Empty>> {
    let contract = ContractWrapper::new(execute, instantiate, query).with_reply(reply);
    Box::new(contract)
}

fn mock_app(initial_balances: &[(Addr, Vec<Coin>)]) -> App {
    let balances = initial_balances.to_vec();
    App::new(move |router, _, storage| {
        for (addr, funds) in &balances {
            router.bank.init_balance(storage, addr, funds.clone()).unwrap();
        }
    })
}

fn owner(addr: &Addr) -> OwnerSpec {
    OwnerSpec {
        addr: addr.to_string(),
        pubkey: None,
    }
}

fn instantiate_multisig(
    app: &mut App,
    owners: Vec<OwnerSpec>,
    threshold: u64,
    window: Duration,
) -> Addr {
    let code_id = app.store_code(contract_multisig());
    app.instantiate_contract(
        code_id,
        Addr::unchecked("deployer"),
        &InstantiateMsg {
            owners,
            threshold,
            expiry_window: window,
        },
        &[],
        "multisig",
        None,
    )
    .unwrap()
}

fn transfer(recipient: &Addr, amount: u128) -> ProposalAction {
    ProposalAction::TransferValue {
        recipient: recipient.to_string(),
        amount: coins(amount, DENOM),
    }
}

fn propose_msg(actions: Vec<ProposalAction>) -> ExecuteMsg {
    ExecuteMsg::Propose {
        title: "pay the beneficiary".to_string(),
        description: "transfer from the joint account".to_string(),
        actions,
    }
}

fn sign_msg(proposal_id: u64) -> ExecuteMsg {
    ExecuteMsg::Sign {
        proposal_id,
        auth: None,
    }
}

fn balance(app: &App, addr: &Addr) -> u128 {
    app.wrap().query_balance(addr, DENOM).unwrap().amount.u128()
}

fn get_proposal(app: &App, multisig: &Addr, id: u64) -> ProposalResponse {
    app.wrap()
        .query_wasm_smart(multisig, &QueryMsg::Proposal { proposal_id: id })
        .unwrap()
}

#[test]
fn quorum_transfers_exactly_once() {
    let alice = Addr::unchecked("alice");
    let bob = Addr::unchecked("bob");
    let carol = Addr::unchecked("carol");
    let beneficiary = Addr::unchecked("beneficiary");

    let mut app = mock_app(&[(alice.clone(), coins(1000, DENOM))]);
    let multisig = instantiate_multisig(
        &mut app,
        vec![owner(&alice), owner(&bob), owner(&carol)],
        2,
        Duration::Time(3600),
    );

    app.send_tokens(alice.clone(), multisig.clone(), &coins(500, DENOM))
        .unwrap();

    app.execute_contract(
        alice.clone(),
        multisig.clone(),
        &propose_msg(vec![transfer(&beneficiary, 100)]),
        &[],
    )
    .unwrap();

    // one approval is not enough
    assert_eq!(balance(&app, &beneficiary), 0);
    assert_eq!(get_proposal(&app, &multisig, 1).status, Status::Open);

    // the second approval executes within the same transaction
    app.execute_contract(bob, multisig.clone(), &sign_msg(1), &[])
        .unwrap();
    assert_eq!(balance(&app, &beneficiary), 100);
    assert_eq!(balance(&app, &multisig), 400);
    assert_eq!(get_proposal(&app, &multisig, 1).status, Status::Executed);

    // a late approval cannot re-trigger the payout
    let err: ContractError = app
        .execute_contract(carol, multisig.clone(), &sign_msg(1), &[])
        .unwrap_err()
        .downcast()
        .unwrap();
    assert_eq!(err, ContractError::UnknownProposal {});
    assert_eq!(balance(&app, &beneficiary), 100);

    // anyone may prune the executed proposal
    app.execute_contract(
        Addr::unchecked("janitor"),
        multisig.clone(),
        &ExecuteMsg::Close { proposal_id: 1 },
        &[],
    )
    .unwrap();
    assert!(app
        .wrap()
        .query_wasm_smart::<ProposalResponse>(&multisig, &QueryMsg::Proposal { proposal_id: 1 })
        .is_err());
}

#[test]
fn failed_dispatch_rolls_back_and_retries() {
    let alice = Addr::unchecked("alice");
    let bob = Addr::unchecked("bob");
    let beneficiary = Addr::unchecked("beneficiary");

    let mut app = mock_app(&[(alice.clone(), coins(1000, DENOM))]);
    // note: the multisig holds no funds yet
    let multisig = instantiate_multisig(
        &mut app,
        vec![owner(&alice), owner(&bob)],
        2,
        Duration::Time(3600),
    );

    app.execute_contract(
        alice.clone(),
        multisig.clone(),
        &propose_msg(vec![transfer(&beneficiary, 100)]),
        &[],
    )
    .unwrap();

    // quorum is reached but the bank send fails; the transaction still
    // succeeds and the proposal reopens with its approvals intact
    app.execute_contract(bob.clone(), multisig.clone(), &sign_msg(1), &[])
        .unwrap();
    assert_eq!(balance(&app, &beneficiary), 0);
    let prop = get_proposal(&app, &multisig, 1);
    assert_eq!(prop.status, Status::Open);
    assert_eq!(prop.approvals.len(), 2);

    // retrying without fixing the cause reopens again
    app.execute_contract(
        bob.clone(),
        multisig.clone(),
        &ExecuteMsg::Execute { proposal_id: 1 },
        &[],
    )
    .unwrap();
    assert_eq!(get_proposal(&app, &multisig, 1).status, Status::Open);

    // fund the contract, then retry for real
    app.send_tokens(alice, multisig.clone(), &coins(500, DENOM))
        .unwrap();
    app.execute_contract(
        bob.clone(),
        multisig.clone(),
        &ExecuteMsg::Execute { proposal_id: 1 },
        &[],
    )
    .unwrap();
    assert_eq!(balance(&app, &beneficiary), 100);
    assert_eq!(get_proposal(&app, &multisig, 1).status, Status::Executed);

    // and only for real once
    let err: ContractError = app
        .execute_contract(bob, multisig, &ExecuteMsg::Execute { proposal_id: 1 }, &[])
        .unwrap_err()
        .downcast()
        .unwrap();
    assert_eq!(err, ContractError::WrongExecuteStatus {});
}

#[test]
fn expiry_blocks_late_quorum() {
    let alice = Addr::unchecked("alice");
    let bob = Addr::unchecked("bob");
    let carol = Addr::unchecked("carol");
    let beneficiary = Addr::unchecked("beneficiary");
    let window = 3600;

    let mut app = mock_app(&[(alice.clone(), coins(1000, DENOM))]);
    let multisig = instantiate_multisig(
        &mut app,
        vec![owner(&alice), owner(&bob), owner(&carol)],
        3,
        Duration::Time(window),
    );
    app.send_tokens(alice.clone(), multisig.clone(), &coins(500, DENOM))
        .unwrap();

    app.execute_contract(
        alice,
        multisig.clone(),
        &propose_msg(vec![transfer(&beneficiary, 100)]),
        &[],
    )
    .unwrap();
    app.execute_contract(bob, multisig.clone(), &sign_msg(1), &[])
        .unwrap();

    app.update_block(|block| block.time = block.time.plus_seconds(window + 1));

    // the would-be k-th signature arrives too late
    let err: ContractError = app
        .execute_contract(carol, multisig.clone(), &sign_msg(1), &[])
        .unwrap_err()
        .downcast()
        .unwrap();
    assert_eq!(err, ContractError::Expired {});
    assert_eq!(balance(&app, &beneficiary), 0);
    assert_eq!(get_proposal(&app, &multisig, 1).status, Status::Expired);

    app.execute_contract(
        Addr::unchecked("janitor"),
        multisig.clone(),
        &ExecuteMsg::Close { proposal_id: 1 },
        &[],
    )
    .unwrap();
    assert!(app
        .wrap()
        .query_wasm_smart::<ProposalResponse>(&multisig, &QueryMsg::Proposal { proposal_id: 1 })
        .is_err());
}

#[test]
fn self_amendment_replaces_owner_set() {
    let alice = Addr::unchecked("alice");
    let bob = Addr::unchecked("bob");
    let carol = Addr::unchecked("carol");
    let dave = Addr::unchecked("dave");

    let mut app = mock_app(&[]);
    let multisig = instantiate_multisig(
        &mut app,
        vec![owner(&alice), owner(&bob), owner(&carol)],
        2,
        Duration::Time(3600),
    );

    let amendment = ProposalAction::UpdateOwners {
        owners: vec![owner(&bob), owner(&carol), owner(&dave)],
        threshold: 3,
        expiry_window: None,
    };
    app.execute_contract(
        alice.clone(),
        multisig.clone(),
        &propose_msg(vec![amendment]),
        &[],
    )
    .unwrap();
    app.execute_contract(bob.clone(), multisig.clone(), &sign_msg(1), &[])
        .unwrap();

    let threshold: ThresholdResponse = app
        .wrap()
        .query_wasm_smart(&multisig, &QueryMsg::Threshold {})
        .unwrap();
    assert_eq!(
        threshold,
        ThresholdResponse {
            threshold: 3,
            total_owners: 3
        }
    );

    // the removed owner lost all rights; the added owner gained them
    let err: ContractError = app
        .execute_contract(
            alice,
            multisig.clone(),
            &propose_msg(vec![transfer(&dave, 1)]),
            &[],
        )
        .unwrap_err()
        .downcast()
        .unwrap();
    assert_eq!(err, ContractError::Unauthorized {});
    app.execute_contract(dave, multisig, &propose_msg(vec![transfer(&bob, 1)]), &[])
        .unwrap();
}

#[test]
fn mixed_payload_is_atomic() {
    let alice = Addr::unchecked("alice");
    let bob = Addr::unchecked("bob");
    let beneficiary = Addr::unchecked("beneficiary");

    let mut app = mock_app(&[(alice.clone(), coins(1000, DENOM))]);
    let multisig = instantiate_multisig(
        &mut app,
        vec![owner(&alice), owner(&bob)],
        2,
        Duration::Time(3600),
    );
    // enough for the first transfer but not the second
    app.send_tokens(alice.clone(), multisig.clone(), &coins(150, DENOM))
        .unwrap();

    app.execute_contract(
        alice,
        multisig.clone(),
        &propose_msg(vec![transfer(&beneficiary, 100), transfer(&beneficiary, 100)]),
        &[],
    )
    .unwrap();
    app.execute_contract(bob, multisig.clone(), &sign_msg(1), &[])
        .unwrap();

    // neither transfer landed: the payload commits or reverts as a unit
    assert_eq!(balance(&app, &beneficiary), 0);
    assert_eq!(balance(&app, &multisig), 150);
    assert_eq!(get_proposal(&app, &multisig, 1).status, Status::Open);
}

#[test]
fn deploy_time_config_is_queryable() {
    let alice = Addr::unchecked("alice");
    let bob = Addr::unchecked("bob");

    let mut app = mock_app(&[]);
    let multisig = instantiate_multisig(
        &mut app,
        vec![owner(&alice), owner(&bob)],
        2,
        Duration::Height(100),
    );

    let threshold: ThresholdResponse = app
        .wrap()
        .query_wasm_smart(&multisig, &QueryMsg::Threshold {})
        .unwrap();
    assert_eq!(
        threshold,
        ThresholdResponse {
            threshold: 2,
            total_owners: 2
        }
    );

    let owners: crate::msg::OwnerListResponse = app
        .wrap()
        .query_wasm_smart(
            &multisig,
            &QueryMsg::Owners {
                start_after: None,
                limit: None,
            },
        )
        .unwrap();
    let names: Vec<String> = owners.owners.iter().map(|o| o.addr.to_string()).collect();
    assert_eq!(names, vec!["alice".to_string(), "bob".to_string()]);
}
