//! Container identifier type

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;

/// Identifier of a container, optionally nested inside a parent container
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId {
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent: Option<Box<ContainerId>>,
}

impl ContainerId {
    /// Create a top-level container ID
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            parent: None,
        }
    }

    /// Create a container ID nested under `parent`
    pub fn nested(value: impl Into<String>, parent: ContainerId) -> Self {
        Self {
            value: value.into(),
            parent: Some(Box::new(parent)),
        }
    }

    /// Get the raw value of this level
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Get the parent container, if this container is nested
    pub fn parent(&self) -> Option<&ContainerId> {
        self.parent.as_deref()
    }

    /// Whether this container is nested in another one
    pub fn is_nested(&self) -> bool {
        self.parent.is_some()
    }
}

/// Dotted form, outermost container first: `parent.child`
impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(parent) = &self.parent {
            write!(f, "{}.", parent)?;
        }
        write!(f, "{}", self.value)
    }
}

impl FromStr for ContainerId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut id: Option<ContainerId> = None;
        for segment in s.split('.') {
            if segment.is_empty() {
                return Err(ProtocolError::InvalidContainerId(s.to_string()));
            }
            id = Some(match id {
                Some(parent) => ContainerId::nested(segment, parent),
                None => ContainerId::new(segment),
            });
        }
        id.ok_or_else(|| ProtocolError::InvalidContainerId(s.to_string()))
    }
}

impl From<&str> for ContainerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ContainerId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}
