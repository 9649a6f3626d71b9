use std::fmt;
use uuid::Uuid;

/// Opaque turret id, stable for the lifetime of the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TurretId(String);

impl TurretId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TurretId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for TurretId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Turret {
    pub id: TurretId,
    pub level: u32,
}

impl Turret {
    pub fn new(level: u32) -> Self {
        Self {
            id: TurretId::generate(),
            level,
        }
    }

    pub fn level_up(&mut self) {
        self.level = self.level.saturating_add(1);
    }
}
