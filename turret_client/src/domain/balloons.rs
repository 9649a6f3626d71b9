// Balloon positions as reported by the telemetry feed.

use crate::domain::geometry::TelemetryPoint;

#[derive(Debug, Clone, PartialEq)]
pub struct BalloonPosition {
    pub id: String,
    pub position_x: f64,
    pub position_y: f64,
}

impl BalloonPosition {
    pub fn new(id: impl Into<String>, position_x: f64, position_y: f64) -> Self {
        Self {
            id: id.into(),
            position_x,
            position_y,
        }
    }

    pub fn point(&self) -> TelemetryPoint {
        TelemetryPoint {
            x: self.position_x,
            y: self.position_y,
        }
    }
}

/// Every balloon from one `loonState` frame, in the order the frame listed them.
///
/// Ids are unique. Inserting an id that is already present replaces the
/// earlier entry in place, so a frame with a repeated key keeps the last value
/// at the first key's position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BalloonPositionSet {
    balloons: Vec<BalloonPosition>,
}

impl BalloonPositionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, balloon: BalloonPosition) {
        match self.balloons.iter_mut().find(|b| b.id == balloon.id) {
            Some(existing) => *existing = balloon,
            None => self.balloons.push(balloon),
        }
    }

    pub fn get(&self, id: &str) -> Option<&BalloonPosition> {
        self.balloons.iter().find(|b| b.id == id)
    }

    pub fn len(&self) -> usize {
        self.balloons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balloons.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BalloonPosition> {
        self.balloons.iter()
    }
}

impl FromIterator<BalloonPosition> for BalloonPositionSet {
    fn from_iter<I: IntoIterator<Item = BalloonPosition>>(iter: I) -> Self {
        let mut set = Self::new();
        for balloon in iter {
            set.insert(balloon);
        }
        set
    }
}
