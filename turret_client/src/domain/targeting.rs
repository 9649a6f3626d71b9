use crate::domain::balloons::BalloonPositionSet;
use crate::domain::geometry::{TelemetryPoint, distance};

/// Id of the balloon nearest to `turret`, or `None` when there are no balloons.
///
/// Ties go to the balloon seen first in frame order.
pub fn closest_balloon(balloons: &BalloonPositionSet, turret: TelemetryPoint) -> Option<&str> {
    let mut closest: Option<&str> = None;
    let mut min_distance = f64::INFINITY;

    for balloon in balloons.iter() {
        let d = distance(turret, balloon.point());
        if d < min_distance {
            min_distance = d;
            closest = Some(balloon.id.as_str());
        }
    }

    closest
}
