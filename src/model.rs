//! Service inventory types shared by discovery, the registry and capture

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

/// Where a service definition was derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceKind {
    /// A Dockerfile (or `*.dockerfile`); the service is named after its directory
    SingleContainer,
    /// A service entry inside a docker-compose manifest
    Composed,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKind::SingleContainer => write!(f, "single-container"),
            ServiceKind::Composed => write!(f, "composed"),
        }
    }
}

/// An exposed port, kept as an opaque digits-only token
///
/// Raw declarations such as `"8080/tcp"` or `" 3000 "` are normalized by
/// [`PortToken::parse`]; anything that is not purely numeric after the
/// protocol suffix is stripped (ranges, variables) is rejected.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortToken(String);

impl PortToken {
    pub fn parse(raw: &str) -> Option<Self> {
        let token = raw.trim();
        let token = token.split('/').next().unwrap_or(token).trim();

        if token.is_empty() || !token.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }

        Some(Self(token.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PortToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Nested build context of a composed service, carried through unresolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BuildRef {
    Context(String),
    Detailed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dockerfile: Option<String>,
    },
}

/// One discovered service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDefinition {
    pub name: String,
    pub kind: ServiceKind,
    pub source_path: PathBuf,
    pub exposed_ports: BTreeSet<PortToken>,
    pub environment: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_ref: Option<BuildRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
}

impl ServiceDefinition {
    pub fn new(name: impl Into<String>, kind: ServiceKind, source_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            kind,
            source_path: source_path.into(),
            exposed_ports: BTreeSet::new(),
            environment: BTreeMap::new(),
            image: None,
            build_ref: None,
            workdir: None,
            entrypoint: None,
            command: None,
        }
    }

    pub fn with_port(mut self, port: &str) -> Self {
        if let Some(token) = PortToken::parse(port) {
            self.exposed_ports.insert(token);
        }
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn port_strings(&self) -> Vec<&str> {
        self.exposed_ports.iter().map(PortToken::as_str).collect()
    }
}

/// Browser viewport used for isolated contexts and recorded in capture metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1920, 1080)
    }
}

/// The per-service "latest metadata" record written next to each capture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureMetadata {
    pub service: String,
    pub url: String,
    pub timestamp: String,
    pub filepath: PathBuf,
    pub viewport: Viewport,
}
