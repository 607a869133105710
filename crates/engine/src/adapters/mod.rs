pub mod common;
pub mod mdoc;
pub mod trust_list;
pub mod x509;
