use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use clap::Parser;

/// Expected proxy credentials, compared exactly against what the client sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub pass: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, pass: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            pass: pass.into(),
        }
    }
}

/// Startup configuration. Each value can come from a flag or an
/// environment variable, falling back to a fixed default.
#[derive(Debug, Clone, Parser)]
#[command(name = "crabby_forward", version, about = "Authenticating HTTP forward proxy")]
pub struct Config {
    /// Address to listen on
    #[arg(long = "bind", env = "PROXY_BIND", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,

    /// Port to listen on
    #[arg(long = "proxy-port", env = "PROXY_PORT", default_value_t = 8080)]
    pub port: u16,

    #[arg(long, env = "PROXY_USER", default_value = "user")]
    pub username: String,

    #[arg(long, env = "PROXY_PASSWORD", default_value = "pass", hide_env_values = true)]
    pub password: String,

    /// File the access log is appended to
    #[arg(long = "log-path", env = "PROXY_LOG_PATH", default_value = "proxy_access.log")]
    pub log_path: PathBuf,

    /// Dial timeout for CONNECT targets, in seconds
    #[arg(long = "connect-timeout", env = "PROXY_CONNECT_TIMEOUT", default_value_t = 10)]
    pub connect_timeout_secs: u64,

    /// Close a relay direction after this many idle seconds (unbounded if unset)
    #[arg(long = "idle-timeout", env = "PROXY_IDLE_TIMEOUT")]
    pub idle_timeout_secs: Option<u64>,
}

impl Config {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.username, &self.password)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_arguments() {
        let config = Config::try_parse_from(["crabby_forward"]).unwrap();

        // env may override these on a developer machine, so only check the
        // values no test environment sets
        assert_eq!(config.connect_timeout_secs, 10);
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn flags_override_defaults() {
        let config = Config::try_parse_from([
            "crabby_forward",
            "--bind",
            "127.0.0.1",
            "--proxy-port",
            "9000",
            "--username",
            "alice",
            "--password",
            "secret",
            "--log-path",
            "/tmp/access.log",
            "--idle-timeout",
            "30",
        ])
        .unwrap();

        assert_eq!(config.listen_addr(), "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.credentials(), Credentials::new("alice", "secret"));
        assert_eq!(config.log_path, PathBuf::from("/tmp/access.log"));
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn zero_idle_timeout_means_unbounded() {
        let config =
            Config::try_parse_from(["crabby_forward", "--idle-timeout", "0"]).unwrap();
        assert_eq!(config.idle_timeout(), None);
    }

    #[test]
    fn rejects_invalid_port() {
        assert!(Config::try_parse_from(["crabby_forward", "--proxy-port", "70000"]).is_err());
    }
}
