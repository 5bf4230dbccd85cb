use cosmwasm_std::StdError;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ContractError {
    #[error("{0}")]
    Std(#[from] StdError),

    #[error("No owners")]
    NoOwners {},

    #[error("Duplicate owner: {addr}")]
    DuplicateOwner { addr: String },

    #[error("Threshold must be between 1 and the number of owners")]
    InvalidThreshold {},

    #[error("Owner public key must be a 33-byte compressed secp256k1 key")]
    InvalidPubkey {},

    #[error("Unauthorized")]
    Unauthorized {},

    #[error("Signature verification failed")]
    InvalidSignature {},

    #[error("Nonce {nonce} has already been consumed")]
    ReplayedMessage { nonce: u64 },

    #[error("Unknown proposal")]
    UnknownProposal {},

    #[error("Already signed this proposal")]
    AlreadySigned {},

    #[error("Invalid proposal payload: {reason}")]
    InvalidPayload { reason: String },

    #[error("Proposal signing period has expired")]
    Expired {},

    #[error("Proposal must be executed or expired before it can be closed")]
    NotExpired {},

    #[error("Proposal is not awaiting dispatch")]
    WrongExecuteStatus {},

    #[error("Execution failed: {reason}")]
    ExecutionFailed { reason: String },

    #[error("Too many open proposals, close expired ones first")]
    StorageExhausted {},
}
