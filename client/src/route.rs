//! Enemy lines: one spawner and one patrol route per player.

use shared::Vec3;

/// Horizontal spacing between neighbouring lines.
pub const LINE_SPACING: f32 = 60.0;

/// Closed waypoint loop an enemy walks forever.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    waypoints: Vec<Vec3>,
}

impl Route {
    pub fn new(waypoints: Vec<Vec3>) -> Self {
        Self { waypoints }
    }

    /// Rectangular loop around the lane of `line`.
    pub fn lane(line: usize) -> Self {
        let ox = line as f32 * LINE_SPACING;
        Self::new(vec![
            Vec3::new(ox - 10.0, 0.0, -20.0),
            Vec3::new(ox + 10.0, 0.0, -20.0),
            Vec3::new(ox + 10.0, 0.0, 20.0),
            Vec3::new(ox - 10.0, 0.0, 20.0),
        ])
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn waypoint(&self, index: usize) -> Option<Vec3> {
        if self.waypoints.is_empty() {
            return None;
        }
        self.waypoints.get(index % self.waypoints.len()).copied()
    }

    pub fn next_index(&self, index: usize) -> usize {
        if self.waypoints.is_empty() {
            0
        } else {
            (index + 1) % self.waypoints.len()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub spawner_position: Vec3,
    pub forward: Vec3,
    pub route: Route,
}

impl Line {
    pub fn for_player(index: usize) -> Self {
        let route = Route::lane(index);
        let spawner_position = Vec3::new(index as f32 * LINE_SPACING - 10.0, 0.0, -24.0);
        Self {
            spawner_position,
            forward: Vec3::new(0.0, 0.0, 1.0),
            route,
        }
    }
}

pub fn default_lines(count: usize) -> Vec<Line> {
    (0..count).map(Line::for_player).collect()
}
