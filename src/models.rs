//! Endpoint and check result data structures

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// A monitored target and the phones to notify about it
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Endpoint {
    pub id: String,
    pub subscribers: Vec<String>,
}

impl Endpoint {
    pub fn new(id: impl Into<String>, subscribers: Vec<String>) -> Self {
        Self {
            id: id.into(),
            subscribers,
        }
    }

    pub fn kind(&self) -> EndpointKind {
        EndpointKind::classify(&self.id)
    }

    pub fn has_subscribers(&self) -> bool {
        !self.subscribers.is_empty()
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum EndpointKind {
    Ip,
    Domain,
}

impl EndpointKind {
    /// Dotted-quad IPv4 addresses are pinged, everything else is fetched over HTTP
    pub fn classify(endpoint: &str) -> Self {
        static IPV4: OnceLock<Regex> = OnceLock::new();
        let pattern = IPV4.get_or_init(|| {
            let octet = r"([01]?\d{1,2}|2([0-4]\d|5[0-5]))";
            Regex::new(&format!(r"\A({octet}\.){{3}}{octet}\z")).unwrap()
        });

        if pattern.is_match(endpoint) {
            EndpointKind::Ip
        } else {
            EndpointKind::Domain
        }
    }

    /// Word used for this kind in alert texts
    pub fn noun(&self) -> &'static str {
        match self {
            EndpointKind::Ip => "Сервер",
            EndpointKind::Domain => "Сайт",
        }
    }
}

impl std::fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointKind::Ip => write!(f, "IP"),
            EndpointKind::Domain => write!(f, "DOMAIN"),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckResult {
    pub reachable: bool,
    pub kind: EndpointKind,
}

impl CheckResult {
    pub fn up(kind: EndpointKind) -> Self {
        Self {
            reachable: true,
            kind,
        }
    }

    pub fn down(kind: EndpointKind) -> Self {
        Self {
            reachable: false,
            kind,
        }
    }
}
