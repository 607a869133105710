pub mod credential_verifier;
pub mod types;
pub mod verify;
pub mod error;
