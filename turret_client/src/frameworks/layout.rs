// Turret layout file: where the headless client places its turrets.
//
//     [[turret]]
//     left = 200.0
//     top = 260.0
//     level = 1

use crate::domain::CanvasGeometry;
use crate::domain::geometry::{TURRET_SIZE_PX, TurretPlacement};
use serde::Deserialize;
use std::{fmt, path::Path};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TurretSpec {
    pub left: f64,
    pub top: f64,
    #[serde(default)]
    pub level: u32,
}

impl TurretSpec {
    pub fn placement(&self) -> TurretPlacement {
        TurretPlacement {
            left: self.left,
            top: self.top,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct TurretLayout {
    #[serde(rename = "turret", default)]
    pub turrets: Vec<TurretSpec>,
}

impl TurretLayout {
    /// One level-0 turret where a freshly added turret would appear.
    pub fn single_default(geometry: &CanvasGeometry) -> Self {
        let placement = geometry.default_placement(TURRET_SIZE_PX);
        Self {
            turrets: vec![TurretSpec {
                left: placement.left,
                top: placement.top,
                level: 0,
            }],
        }
    }
}

#[derive(Debug)]
pub enum LayoutError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutError::Io(err) => write!(f, "failed to read turret layout: {err}"),
            LayoutError::Parse(err) => write!(f, "failed to parse turret layout: {err}"),
        }
    }
}

impl std::error::Error for LayoutError {}

pub fn parse_layout(text: &str) -> Result<TurretLayout, LayoutError> {
    toml::from_str(text).map_err(LayoutError::Parse)
}

pub fn load_layout(path: &Path) -> Result<TurretLayout, LayoutError> {
    let text = std::fs::read_to_string(path).map_err(LayoutError::Io)?;
    parse_layout(&text)
}
