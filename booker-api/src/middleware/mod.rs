pub mod identity;

pub use identity::{require_caller, Caller, USER_ID_HEADER};
