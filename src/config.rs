//! Configuration management for the site watcher

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default SMS gateway host
pub const DEFAULT_GATEWAY_HOST: &str = "api.sms24x7.ru";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding one file per monitored endpoint
    pub sites_dir: PathBuf,

    /// Directory for debounce locks and the run lock
    pub state_dir: PathBuf,

    /// SMS gateway account email
    pub gateway_email: String,

    /// SMS gateway account password
    pub gateway_password: String,

    /// SMS gateway host
    pub gateway_host: String,

    /// Use HTTPS for gateway requests
    pub gateway_secure: bool,

    /// Verify the gateway TLS certificate
    pub gateway_verify_tls: bool,

    /// Timeout for a single gateway request
    pub gateway_timeout: Duration,

    /// Hard timeout for one reachability check
    pub check_timeout: Duration,

    /// Follow HTTP redirects during domain checks
    pub follow_redirects: bool,

    /// How long a sent "down" alert suppresses repeats
    pub cooldown: Duration,

    /// Program used for ICMP checks
    pub ping_program: String,

    /// Country digit written in front of normalized phone numbers
    pub phone_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sites_dir: PathBuf::from("sites"),
            state_dir: PathBuf::from("tmp"),
            gateway_email: String::new(),
            gateway_password: String::new(),
            gateway_host: DEFAULT_GATEWAY_HOST.to_string(),
            gateway_secure: true,
            gateway_verify_tls: true,
            gateway_timeout: Duration::from_secs(30),
            check_timeout: Duration::from_secs(30),
            follow_redirects: false,
            cooldown: Duration::from_secs(30 * 60),
            ping_program: "ping".to_string(),
            phone_prefix: "7".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(sites_dir) = env::var("SITES_DIR") {
            config.sites_dir = PathBuf::from(sites_dir);
        }

        if let Ok(state_dir) = env::var("STATE_DIR") {
            config.state_dir = PathBuf::from(state_dir);
        }

        if let Ok(email) = env::var("SMS_EMAIL") {
            config.gateway_email = email;
        }

        if let Ok(password) = env::var("SMS_PASSWORD") {
            config.gateway_password = password;
        }

        if let Ok(host) = env::var("SMS_HOST") {
            config.gateway_host = host;
        }

        if let Ok(secure) = env::var("SMS_SECURE") {
            config.gateway_secure = secure.to_lowercase() == "true";
        }

        if let Ok(verify) = env::var("SMS_VERIFY_TLS") {
            config.gateway_verify_tls = verify.to_lowercase() == "true";
        }

        if let Ok(timeout) = env::var("SMS_TIMEOUT_SECONDS") {
            if let Ok(seconds) = timeout.parse::<u64>() {
                config.gateway_timeout = Duration::from_secs(seconds);
            }
        }

        if let Ok(timeout) = env::var("CHECK_TIMEOUT_SECONDS") {
            if let Ok(seconds) = timeout.parse::<u64>() {
                config.check_timeout = Duration::from_secs(seconds);
            }
        }

        if let Ok(follow) = env::var("CHECK_FOLLOW_REDIRECTS") {
            config.follow_redirects = follow.to_lowercase() == "true";
        }

        if let Ok(cooldown) = env::var("LOCK_COOLDOWN_SECONDS") {
            if let Ok(seconds) = cooldown.parse::<u64>() {
                config.cooldown = Duration::from_secs(seconds);
            }
        }

        if let Ok(program) = env::var("PING_PROGRAM") {
            config.ping_program = program;
        }

        if let Ok(prefix) = env::var("PHONE_PREFIX") {
            config.phone_prefix = prefix;
        }

        config
    }

    /// Validate the settings every command needs
    pub fn validate(&self) -> Result<(), String> {
        if self.sites_dir.as_os_str().is_empty() {
            return Err("sites_dir cannot be empty".to_string());
        }

        if self.state_dir.as_os_str().is_empty() {
            return Err("state_dir cannot be empty".to_string());
        }

        if self.gateway_host.is_empty() {
            return Err("gateway_host cannot be empty".to_string());
        }

        if self.gateway_timeout.is_zero() {
            return Err("gateway_timeout must be greater than 0".to_string());
        }

        if self.check_timeout.is_zero() {
            return Err("check_timeout must be greater than 0".to_string());
        }

        if self.cooldown.is_zero() {
            return Err("cooldown must be greater than 0".to_string());
        }

        if self.ping_program.is_empty() {
            return Err("ping_program cannot be empty".to_string());
        }

        Ok(())
    }

    /// Validate the gateway credentials, needed only by commands that send SMS
    pub fn validate_credentials(&self) -> Result<(), String> {
        if self.gateway_email.is_empty() {
            return Err("gateway_email cannot be empty".to_string());
        }

        if self.gateway_password.is_empty() {
            return Err("gateway_password cannot be empty".to_string());
        }

        Ok(())
    }
}
