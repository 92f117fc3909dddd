//! Pilot identity

use serde::{Deserialize, Serialize};

use super::PilotId;

/// A competitor. The id is stable; the display attributes may change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pilot {
    pub id: PilotId,
    pub name: String,
    /// Practice pilots fly races but are excluded from standings
    #[serde(default)]
    pub practice: bool,
}

impl Pilot {
    pub fn new(name: impl Into<String>) -> Self {
        Self { id: PilotId::new(), name: name.into(), practice: false }
    }

    pub fn practice(name: impl Into<String>) -> Self {
        Self { practice: true, ..Self::new(name) }
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }
}

impl std::fmt::Display for Pilot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}
