//! Bank account arithmetic: Spanish CCC control digits, IBAN check digits and
//! BIC lookup. Everything here is pure; malformed input yields `None`/`false`
//! and the caller decides how to report it.

pub mod bic;
pub mod ccc;
pub mod iban;

pub use bic::bic_from_entity;
pub use ccc::{ccc_control_digit, canonize_ccc, pretty_ccc, validate_ccc};
pub use iban::{ccc_from_spanish_iban, iban_from_ccc, normalize_iban, validate_iban};
