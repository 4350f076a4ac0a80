//! Name <-> connection bookkeeping.
//!
//! The registry keeps a bijection between display names and connection ids:
//! a name is bound to at most one connection and a connection holds at most
//! one name. It is owned by a single task (see [`crate::server`]), so every
//! operation observes the effects of all earlier ones.

use std::collections::{BTreeMap, HashMap};

use clap::ValueEnum;
use thiserror::Error;

use crate::transport::ConnectionId;

/// Longest display name accepted, in bytes. Keeps a LIST reply well inside
/// the frame limit for any realistic number of clients.
pub const MAX_NAME_BYTES: usize = 255;

/// What happens when a connection claims a name another connection holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum NamePolicy {
    /// Refuse the claim; the current holder keeps the name.
    #[default]
    Reject,
    /// Last writer wins; the current holder silently loses the name.
    Evict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Created,
    Unchanged,
    Renamed {
        previous: String,
    },
    Evicted {
        previous_owner: ConnectionId,
        previous: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("{name} is already registered")]
    NameConflict { name: String },
    #[error("invalid name {name:?}")]
    InvalidName { name: String },
    #[error("not registered")]
    NotFound,
}

#[derive(Debug, Default)]
pub struct Registry {
    policy: NamePolicy,
    by_name: BTreeMap<String, ConnectionId>,
    by_id: HashMap<ConnectionId, String>,
}

impl Registry {
    pub fn new(policy: NamePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> NamePolicy {
        self.policy
    }

    pub fn register(
        &mut self,
        id: ConnectionId,
        name: &str,
    ) -> Result<Registration, RegistryError> {
        if !is_valid_name(name) {
            return Err(RegistryError::InvalidName {
                name: name.to_string(),
            });
        }

        let evicted = match self.by_name.get(name).copied() {
            Some(owner) if owner == id => return Ok(Registration::Unchanged),
            Some(owner) => match self.policy {
                NamePolicy::Reject => {
                    return Err(RegistryError::NameConflict {
                        name: name.to_string(),
                    });
                }
                NamePolicy::Evict => {
                    self.by_id.remove(&owner);
                    Some(owner)
                }
            },
            None => None,
        };

        let previous = self.by_id.insert(id, name.to_string());
        if let Some(previous) = &previous {
            self.by_name.remove(previous);
        }
        self.by_name.insert(name.to_string(), id);

        Ok(match (evicted, previous) {
            (Some(previous_owner), previous) => Registration::Evicted {
                previous_owner,
                previous,
            },
            (None, Some(previous)) => Registration::Renamed { previous },
            (None, None) => Registration::Created,
        })
    }

    pub fn lookup(&self, name: &str) -> Result<ConnectionId, RegistryError> {
        self.by_name.get(name).copied().ok_or(RegistryError::NotFound)
    }

    pub fn reverse_lookup(&self, id: ConnectionId) -> Result<&str, RegistryError> {
        self.by_id
            .get(&id)
            .map(String::as_str)
            .ok_or(RegistryError::NotFound)
    }

    pub fn is_registered(&self, id: ConnectionId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Registered names in lexical order.
    pub fn snapshot(&self) -> Vec<String> {
        self.by_name.keys().cloned().collect()
    }

    /// Drops whatever name `id` holds and returns it.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<String> {
        let name = self.by_id.remove(&id)?;
        self.by_name.remove(&name);
        Some(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.len() <= MAX_NAME_BYTES && !name.chars().any(char::is_whitespace)
}
