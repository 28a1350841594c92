pub mod collaborations;
pub mod orders;
pub mod root;
