// Conversions between the canvas pixel frame (turrets) and the telemetry frame (balloons).
//
// Telemetry X runs 0..=width_units left to right. Telemetry Y runs -h/2..=h/2 bottom to top,
// so the canvas flips the vertical axis around its middle.

/// Size of a turret on the canvas, in pixels.
pub const TURRET_SIZE_PX: f64 = 32.0;

/// Position on the canvas in pixels; `left` grows rightward, `top` grows downward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurretPlacement {
    pub top: f64,
    pub left: f64,
}

/// Position in telemetry units, the frame balloons are reported in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasGeometry {
    // Pixels per telemetry unit.
    pub scale: f64,
    pub width_units: f64,
    pub height_units: f64,
}

impl Default for CanvasGeometry {
    fn default() -> Self {
        Self {
            scale: 4.0,
            width_units: 200.0,
            height_units: 130.0,
        }
    }
}

impl CanvasGeometry {
    pub fn with_scale(scale: f64) -> Self {
        Self {
            scale,
            ..Self::default()
        }
    }

    pub fn width_px(&self) -> f64 {
        self.width_units * self.scale
    }

    pub fn height_px(&self) -> f64 {
        self.height_units * self.scale
    }

    /// Pixel placement -> telemetry point. Inverse of [`CanvasGeometry::to_placement`].
    pub fn to_telemetry_frame(&self, placement: TurretPlacement) -> TelemetryPoint {
        TelemetryPoint {
            x: placement.left / self.scale,
            y: -(placement.top / self.scale - self.height_units / 2.0),
        }
    }

    /// Telemetry point -> pixel placement, i.e. where a balloon is drawn.
    pub fn to_placement(&self, point: TelemetryPoint) -> TurretPlacement {
        TurretPlacement {
            left: point.x * self.scale,
            top: (self.height_units / 2.0 - point.y) * self.scale,
        }
    }

    /// Keep an element of `element_size_px` fully inside the canvas.
    pub fn clamp_placement(&self, placement: TurretPlacement, element_size_px: f64) -> TurretPlacement {
        let half = element_size_px / 2.0;
        TurretPlacement {
            left: clamp_axis(placement.left, half, self.width_px() - half),
            top: clamp_axis(placement.top, half, self.height_px() - half),
        }
    }

    /// Where a freshly added element sits before it is dragged: the top-left corner.
    pub fn default_placement(&self, element_size_px: f64) -> TurretPlacement {
        TurretPlacement {
            left: element_size_px / 2.0,
            top: element_size_px / 2.0,
        }
    }
}

// An element larger than the canvas is centered instead of clamped.
fn clamp_axis(value: f64, min: f64, max: f64) -> f64 {
    if min > max {
        return (min + max) / 2.0;
    }
    if value.is_nan() {
        return min;
    }
    value.clamp(min, max)
}

pub fn distance(a: TelemetryPoint, b: TelemetryPoint) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}
