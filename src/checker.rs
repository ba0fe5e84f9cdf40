//! Reachability checks: ICMP for IPv4 addresses, HTTP for domains

use crate::errors::{Result, WatcherError};
use crate::models::{CheckResult, EndpointKind};
use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, redirect::Policy};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Decides whether an endpoint is up. Implementations never fail: any doubt is "down".
#[async_trait]
pub trait Checker: Send + Sync {
    async fn check(&self, endpoint: &str) -> CheckResult;
}

/// Whether ping output shows a reply (none of the known failure phrases)
pub fn ping_output_reachable(output: &str) -> bool {
    static FAILURES: OnceLock<Regex> = OnceLock::new();
    let failures = FAILURES.get_or_init(|| {
        Regex::new(
            r"(?i)no answer|host unreachable|could not find host|request timed out|100% packet loss",
        )
        .unwrap()
    });

    !failures.is_match(output)
}

#[derive(Debug, Clone)]
pub struct ReachabilityChecker {
    client: Client,
    timeout: Duration,
    ping_program: String,
    ping_args: Vec<String>,
}

impl ReachabilityChecker {
    /// Create a checker using `<ping_program> -c 1 <ip>` for IPv4 targets
    pub fn new(check_timeout: Duration, ping_program: impl Into<String>, follow_redirects: bool) -> Result<Self> {
        let redirect = if follow_redirects {
            Policy::default()
        } else {
            Policy::none()
        };

        let client = Client::builder()
            .timeout(check_timeout)
            .redirect(redirect)
            .user_agent(format!("site_watcher/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(WatcherError::Http)?;

        Ok(Self {
            client,
            timeout: check_timeout,
            ping_program: ping_program.into(),
            ping_args: vec!["-c".to_string(), "1".to_string(), "{target}".to_string()],
        })
    }

    /// Replace the ping arguments; `{target}` is substituted with the address
    pub fn with_ping_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ping_args = args.into_iter().map(Into::into).collect();
        self
    }

    async fn check_ip(&self, address: &str) -> bool {
        let args: Vec<String> = self
            .ping_args
            .iter()
            .map(|arg| arg.replace("{target}", address))
            .collect();

        let child = Command::new(&self.ping_program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn {} for {}: {}", self.ping_program, address, e);
                return false;
            }
        };

        match timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                let reachable = output.status.success() && ping_output_reachable(&text);
                debug!("Ping {} finished with {}, reachable: {}", address, output.status, reachable);
                reachable
            }
            Ok(Err(e)) => {
                warn!("Ping {} failed: {}", address, e);
                false
            }
            Err(_) => {
                warn!("Ping {} timed out after {:?}", address, self.timeout);
                false
            }
        }
    }

    async fn check_domain(&self, domain: &str) -> bool {
        let url = format!("http://{}/", domain);

        match timeout(self.timeout, self.client.get(&url).send()).await {
            Ok(Ok(response)) => {
                let status = response.status();
                debug!("GET {} returned {}", url, status);
                status.is_success()
            }
            Ok(Err(e)) => {
                warn!("GET {} failed: {}", url, e);
                false
            }
            Err(_) => {
                warn!("GET {} timed out after {:?}", url, self.timeout);
                false
            }
        }
    }
}

#[async_trait]
impl Checker for ReachabilityChecker {
    async fn check(&self, endpoint: &str) -> CheckResult {
        let kind = EndpointKind::classify(endpoint);
        let reachable = match kind {
            EndpointKind::Ip => self.check_ip(endpoint).await,
            EndpointKind::Domain => self.check_domain(endpoint).await,
        };

        CheckResult { reachable, kind }
    }
}
