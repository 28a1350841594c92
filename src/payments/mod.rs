pub mod redsys;
pub mod sepa;

pub use redsys::RedsysGateway;
pub use sepa::{SepaBatch, SepaDebitRecord};
