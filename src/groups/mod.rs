pub mod authority;
pub mod handlers;
