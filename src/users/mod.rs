pub mod handlers;
pub mod sweep;
