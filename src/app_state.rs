use std::{sync::Arc, time::Duration};

use crate::{access_log::AccessLog, config::Credentials};

/// Per-process values every connection reads. Built once at startup and
/// cloned into each connection task.
#[derive(Debug, Clone)]
pub struct AppState {
    pub credentials: Arc<Credentials>,
    pub access_log: AccessLog,
    pub connect_timeout: Duration,
    pub idle_timeout: Option<Duration>,
}

impl AppState {
    pub fn new(
        credentials: Credentials,
        access_log: AccessLog,
        connect_timeout: Duration,
        idle_timeout: Option<Duration>,
    ) -> Self {
        Self {
            credentials: Arc::new(credentials),
            access_log,
            connect_timeout,
            idle_timeout,
        }
    }
}
