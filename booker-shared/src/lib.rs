pub mod models;

pub use models::event::{Event, EventDetail};
pub use models::hold::{BookingRequest, Hold, HoldStatus, UnknownStatus};
