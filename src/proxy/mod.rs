pub mod auth;
pub mod forward;
pub mod listener;
pub mod request;
pub mod tunnel;
