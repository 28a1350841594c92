pub mod collaboration;
pub mod order;
pub mod period;
pub mod sepa_reasons;
pub mod user;

pub use collaboration::*;
pub use order::*;
pub use period::*;
pub use sepa_reasons::*;
pub use user::*;
