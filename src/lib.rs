/*!
A k-of-n multisig with on-chain approval aggregation.

A fixed set of owners and a threshold are configured at instantiation.
Any owner may propose a set of typed actions; the proposal executes
atomically in the same message that delivers the k-th distinct approval,
so there is never a window where a passed proposal sits waiting for a
separate execute call. Owner-set and threshold changes are themselves
proposal actions, dispatched back at the contract, so there is no
privileged admin path.

Approvals arrive either directly from an owner's account, or relayed by
any third party carrying the owner's secp256k1 signature over a
nonce-bound digest (see [`auth`]).
*/

pub mod auth;
pub mod contract;
mod error;
mod integration_tests;
pub mod msg;
pub mod state;

pub use crate::error::ContractError;
