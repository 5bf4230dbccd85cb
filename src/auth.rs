//! Relayed-approval verification.
//!
//! An owner with a registered public key can approve a proposal without
//! sending a transaction themselves: they sign a digest binding the
//! contract instance, the proposal id and a fresh nonce, and hand the
//! signature to any relayer. The nonce high-water mark is persisted in
//! the same storage transaction as the rest of the message, so a nonce
//! can never be consumed twice regardless of downstream outcome.

use cosmwasm_std::{Addr, Api, Storage};
use sha2::{Digest, Sha256};

use crate::error::ContractError;
use crate::msg::ApprovalSignature;
use crate::state::{NONCES, OWNERS};

/// Domain separator, so an approval signature can never be confused with
/// a signature over any other message type.
const APPROVAL_DOMAIN: &[u8] = b"multisig-approval";

/// The exact bytes an owner signs (pre-hash). Binding the contract
/// address prevents cross-instance replay; the nonce prevents
/// same-instance replay.
pub fn approval_preimage(contract: &Addr, proposal_id: u64, nonce: u64) -> Vec<u8> {
    let mut data = Vec::with_capacity(APPROVAL_DOMAIN.len() + contract.as_bytes().len() + 16);
    data.extend_from_slice(APPROVAL_DOMAIN);
    data.extend_from_slice(contract.as_bytes());
    data.extend_from_slice(&proposal_id.to_be_bytes());
    data.extend_from_slice(&nonce.to_be_bytes());
    data
}

pub fn approval_digest(contract: &Addr, proposal_id: u64, nonce: u64) -> [u8; 32] {
    Sha256::digest(approval_preimage(contract, proposal_id, nonce)).into()
}

/// Verifies a relayed approval and consumes its nonce, returning the
/// owner the approval speaks for.
pub fn verify_relayed_approval(
    storage: &mut dyn Storage,
    api: &dyn Api,
    contract: &Addr,
    proposal_id: u64,
    auth: &ApprovalSignature,
) -> Result<Addr, ContractError> {
    let owner = api.addr_validate(&auth.owner)?;
    let info = OWNERS
        .may_load(storage, &owner)?
        .ok_or(ContractError::Unauthorized {})?;
    // owners without a registered key can only approve directly
    let pubkey = info.pubkey.ok_or(ContractError::InvalidSignature {})?;

    let consumed = NONCES.may_load(storage, &owner)?.unwrap_or_default();
    if auth.nonce <= consumed {
        return Err(ContractError::ReplayedMessage { nonce: auth.nonce });
    }

    let digest = approval_digest(contract, proposal_id, auth.nonce);
    let valid = api
        .secp256k1_verify(&digest, auth.signature.as_slice(), pubkey.as_slice())
        .map_err(|_| ContractError::InvalidSignature {})?;
    if !valid {
        return Err(ContractError::InvalidSignature {});
    }

    NONCES.save(storage, &owner, &auth.nonce)?;
    Ok(owner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_binds_all_inputs() {
        let contract = Addr::unchecked("multisig1");
        let base = approval_digest(&contract, 1, 1);

        assert_eq!(base, approval_digest(&contract, 1, 1));
        assert_ne!(base, approval_digest(&contract, 2, 1));
        assert_ne!(base, approval_digest(&contract, 1, 2));
        assert_ne!(base, approval_digest(&Addr::unchecked("multisig2"), 1, 1));
    }
}
