pub mod certificate;
pub mod cose;
pub mod cose_key;
pub mod key_source;
