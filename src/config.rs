use std::path::Path;

use anyhow::{Context, Result};
use eframe::egui::Color32;
use serde::Deserialize;

use crate::topology::EntityKind;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct VizConfig {
    pub viewport: Viewport,
    pub forces: ForceConfig,
    pub palette: PaletteConfig,
    pub drag_release: DragReleasePolicy,
}

impl VizConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid config JSON in {}", path.display()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
        }
    }
}

impl Viewport {
    /// Clamps a coordinate pair so a circle of `radius` stays fully inside.
    pub fn clamp(self, x: f32, y: f32, radius: f32) -> (f32, f32) {
        let max_x = (self.width - radius).max(radius);
        let max_y = (self.height - radius).max(radius);
        (x.clamp(radius, max_x), y.clamp(radius, max_y))
    }
}

/// Physics tuning. Defaults follow the d3-force setup the dashboard has
/// always shipped with.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct ForceConfig {
    /// Rest length of a link whose far endpoint is a pod.
    pub link_distance_pod: f32,
    /// Rest length for any other relation.
    pub link_distance_other: f32,
    pub link_strength: f32,
    pub charge_node: f32,
    pub charge_pod: f32,
    pub position_strength: f32,
    pub collide_radius_node: f32,
    pub collide_radius_pod: f32,
    pub collision_strength: f32,
    pub render_radius_node: f32,
    pub render_radius_pod: f32,
    pub alpha_initial: f32,
    pub alpha_min: f32,
    pub alpha_decay: f32,
    pub velocity_decay: f32,
    pub drag_alpha: f32,
    pub cooling_alpha: f32,
    pub max_speed: f32,
    pub seed: u64,
}

impl Default for ForceConfig {
    fn default() -> Self {
        let alpha_min = 0.001_f32;
        Self {
            link_distance_pod: 120.0,
            link_distance_other: 300.0,
            link_strength: 1.0,
            charge_node: -800.0,
            charge_pod: -200.0,
            position_strength: 0.1,
            collide_radius_node: 100.0,
            collide_radius_pod: 40.0,
            collision_strength: 1.0,
            render_radius_node: 15.0,
            render_radius_pod: 8.0,
            alpha_initial: 1.0,
            alpha_min,
            alpha_decay: 1.0 - alpha_min.powf(1.0 / 300.0),
            velocity_decay: 0.4,
            drag_alpha: 0.3,
            cooling_alpha: 0.1,
            max_speed: 60.0,
            seed: 0x6b75_706f_7669,
        }
    }
}

impl ForceConfig {
    pub fn charge(&self, kind: EntityKind) -> f32 {
        match kind {
            EntityKind::Node => self.charge_node,
            EntityKind::Pod => self.charge_pod,
        }
    }

    pub fn collide_radius(&self, kind: EntityKind) -> f32 {
        match kind {
            EntityKind::Node => self.collide_radius_node,
            EntityKind::Pod => self.collide_radius_pod,
        }
    }

    pub fn render_radius(&self, kind: EntityKind) -> f32 {
        match kind {
            EntityKind::Node => self.render_radius_node,
            EntityKind::Pod => self.render_radius_pod,
        }
    }

    pub fn link_distance(&self, far_endpoint: EntityKind) -> f32 {
        match far_endpoint {
            EntityKind::Pod => self.link_distance_pod,
            EntityKind::Node => self.link_distance_other,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PaletteConfig {
    /// Categorical palette as `#rrggbb` strings, drawn from in order.
    pub colors: Vec<String>,
    pub node_color: String,
    pub alarm_color: String,
    /// Scheduled, ready pods without a deployment.
    pub ungrouped_color: String,
    /// Minimum Euclidean RGB distance from both reserved colors.
    pub reserved_distance: f32,
}

impl Default for PaletteConfig {
    fn default() -> Self {
        Self {
            colors: [
                "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2",
                "#7f7f7f", "#bcbd22", "#17becf",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
            node_color: "#800080".to_owned(),
            alarm_color: "#ff0000".to_owned(),
            ungrouped_color: "#008000".to_owned(),
            reserved_distance: 100.0,
        }
    }
}

/// What happens to a dragged entity once the pointer is released.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DragReleasePolicy {
    /// Every entity is unpinned and rejoins the simulation.
    #[default]
    Release,
    /// Cluster nodes stay where they were dropped; pods are released.
    PinClusterNodes,
}

pub fn parse_hex_color(value: &str) -> Option<Color32> {
    let hex = value.trim().strip_prefix('#').unwrap_or(value.trim());
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }

    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
    Some(Color32::from_rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
}
