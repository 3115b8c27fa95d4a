pub mod event;
pub mod hold;
