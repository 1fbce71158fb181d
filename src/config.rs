use crate::ntfy::DEFAULT_TOPIC_URL;
use anyhow::{bail, Context, Result};
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

const DEFAULT_BIND: &str = "0.0.0.0:3146";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub topic_url: String,
    pub notify_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_raw = get("CSPWATCH_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind_addr: SocketAddr = bind_raw
            .parse()
            .with_context(|| format!("CSPWATCH_BIND is not a socket address: {}", bind_raw))?;

        let topic_url = get("NTFY_TOPIC_URL").unwrap_or_else(|| DEFAULT_TOPIC_URL.to_string());
        if !(topic_url.starts_with("https://") || topic_url.starts_with("http://")) {
            bail!("NTFY_TOPIC_URL must be an http(s) URL, got {}", topic_url);
        }

        let timeout_secs = match get("NTFY_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("NTFY_TIMEOUT_SECS is not a number: {}", raw))?,
            None => DEFAULT_TIMEOUT_SECS,
        };
        if timeout_secs == 0 {
            bail!("NTFY_TIMEOUT_SECS must be greater than zero");
        }

        Ok(Self {
            bind_addr,
            topic_url,
            notify_timeout: Duration::from_secs(timeout_secs),
        })
    }
}
