use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Swarm-wide key/value secrets with a monotonically increasing revision.
///
/// Every change produces a new value with `revision + 1`; peers keep
/// whichever copy has the higher revision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SwarmSecrets {
    pub id: String,
    pub revision: i64,
    pub created: DateTime<Utc>,
    pub map: BTreeMap<String, String>,
}

impl SwarmSecrets {
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            revision: 0,
            created: Utc::now(),
            map: BTreeMap::new(),
        }
    }

    pub fn set(&self, key: &str, value: &str) -> Self {
        let mut map = self.map.clone();
        map.insert(key.to_string(), value.to_string());
        Self {
            revision: self.revision + 1,
            map,
            ..self.clone()
        }
    }

    pub fn remove(&self, key: &str) -> Self {
        let mut map = self.map.clone();
        map.remove(key);
        Self {
            revision: self.revision + 1,
            map,
            ..self.clone()
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.map.keys().cloned().collect()
    }
}

impl Default for SwarmSecrets {
    fn default() -> Self {
        Self::new()
    }
}

/// What happened to an incoming secrets blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretsUpdate {
    Adopted,
    /// Same revision as the local copy.
    Unchanged,
    /// Lower revision than the local copy.
    Rejected,
}
