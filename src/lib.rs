pub mod access_log;
pub mod app_state;
pub mod config;
pub mod error;
pub mod proxy;
pub mod stream;

pub use app_state::AppState;
pub use config::{Config, Credentials};
pub use error::{AuthFailure, ProxyError};
