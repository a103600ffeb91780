//! Click-to-zoom: which district is focused and the pane transform that follows.

use geo::Coord;
use serde::Serialize;

/// Affine map `p -> p * scale + translate` applied to the map group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ViewTransform {
    pub translate_x: f64,
    pub translate_y: f64,
    pub scale: f64,
}

impl ViewTransform {
    pub const fn identity() -> Self {
        Self { translate_x: 0.0, translate_y: 0.0, scale: 1.0 }
    }

    /// Puts `focus` at the middle of a `width` x `height` pane, zoomed by `scale`.
    pub fn centered_on(focus: Coord<f64>, width: f64, height: f64, scale: f64) -> Self {
        Self {
            translate_x: width / 2.0 - scale * focus.x,
            translate_y: height / 2.0 - scale * focus.y,
            scale,
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    pub fn apply(&self, p: Coord<f64>) -> Coord<f64> {
        Coord {
            x: p.x * self.scale + self.translate_x,
            y: p.y * self.scale + self.translate_y,
        }
    }

    pub fn invert(&self, p: Coord<f64>) -> Coord<f64> {
        Coord {
            x: (p.x - self.translate_x) / self.scale,
            y: (p.y - self.translate_y) / self.scale,
        }
    }

    /// SVG `transform` attribute value.
    pub fn to_svg(&self) -> String {
        format!(
            "translate({:.3},{:.3})scale({})",
            self.translate_x, self.translate_y, self.scale
        )
    }
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self::identity()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "district")]
pub enum SelectionState {
    #[default]
    Unfocused,
    Focused(String),
}

impl SelectionState {
    pub fn focused(&self) -> Option<&str> {
        match self {
            SelectionState::Unfocused => None,
            SelectionState::Focused(name) => Some(name),
        }
    }

    pub fn is_focused(&self, district: &str) -> bool {
        self.focused() == Some(district)
    }

    /// Toggles focus on `clicked` and returns the transform to show.
    ///
    /// Clicking the focused district again unfocuses; clicking any other
    /// district moves focus straight to it.
    pub fn on_district_clicked(&mut self, clicked: &str, centroid: Coord<f64>, pane: Pane) -> ViewTransform {
        if self.is_focused(clicked) {
            *self = SelectionState::Unfocused;
            ViewTransform::identity()
        } else {
            *self = SelectionState::Focused(clicked.to_string());
            ViewTransform::centered_on(centroid, pane.width, pane.height, pane.focus_scale)
        }
    }
}

/// Size of the map pane and how far a focused district is zoomed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pane {
    pub width: f64,
    pub height: f64,
    pub focus_scale: f64,
}

impl Pane {
    pub fn center(&self) -> Coord<f64> {
        Coord { x: self.width / 2.0, y: self.height / 2.0 }
    }
}
