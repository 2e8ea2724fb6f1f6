use std::collections::HashMap;

use eframe::egui::Color32;
use tracing::{debug, warn};

use crate::config::{PaletteConfig, parse_hex_color};

const FALLBACK_NODE_COLOR: Color32 = Color32::from_rgb(128, 0, 128);
const FALLBACK_ALARM_COLOR: Color32 = Color32::from_rgb(255, 0, 0);
const FALLBACK_UNGROUPED_COLOR: Color32 = Color32::from_rgb(0, 128, 0);

pub fn rgb_distance(a: Color32, b: Color32) -> f32 {
    let dr = a.r() as f32 - b.r() as f32;
    let dg = a.g() as f32 - b.g() as f32;
    let db = a.b() as f32 - b.b() as f32;
    ((dr * dr) + (dg * dg) + (db * db)).sqrt()
}

/// Append-only deployment → color table. A group keeps its first color for
/// the life of the assigner, even across snapshots where it is absent.
pub struct ColorAssigner {
    palette: Vec<Color32>,
    /// Palette indices far enough from both reserved colors, in palette order.
    eligible: Vec<usize>,
    node_color: Color32,
    alarm_color: Color32,
    ungrouped_color: Color32,
    assigned: HashMap<String, Color32>,
    next_eligible: usize,
    wrap_cursor: usize,
}

impl ColorAssigner {
    pub fn new(config: &PaletteConfig) -> Self {
        let node_color = parse_hex_color(&config.node_color).unwrap_or_else(|| {
            warn!(value = %config.node_color, "invalid node color, using default");
            FALLBACK_NODE_COLOR
        });
        let alarm_color = parse_hex_color(&config.alarm_color).unwrap_or_else(|| {
            warn!(value = %config.alarm_color, "invalid alarm color, using default");
            FALLBACK_ALARM_COLOR
        });
        let ungrouped_color =
            parse_hex_color(&config.ungrouped_color).unwrap_or(FALLBACK_UNGROUPED_COLOR);

        let palette = config
            .colors
            .iter()
            .filter_map(|value| {
                let parsed = parse_hex_color(value);
                if parsed.is_none() {
                    warn!(value = %value, "skipping invalid palette color");
                }
                parsed
            })
            .collect::<Vec<_>>();

        let eligible = palette
            .iter()
            .enumerate()
            .filter(|(_, color)| {
                rgb_distance(**color, alarm_color) > config.reserved_distance
                    && rgb_distance(**color, node_color) > config.reserved_distance
            })
            .map(|(index, _)| index)
            .collect();

        Self {
            palette,
            eligible,
            node_color,
            alarm_color,
            ungrouped_color,
            assigned: HashMap::new(),
            next_eligible: 0,
            wrap_cursor: 0,
        }
    }

    pub fn node_color(&self) -> Color32 {
        self.node_color
    }

    pub fn alarm_color(&self) -> Color32 {
        self.alarm_color
    }

    pub fn ungrouped_color(&self) -> Color32 {
        self.ungrouped_color
    }

    pub fn assigned_count(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.next_eligible >= self.eligible.len()
    }

    pub fn color_for(&mut self, group: &str) -> Color32 {
        if let Some(color) = self.assigned.get(group) {
            return *color;
        }

        let color = self.draw_next();
        debug!(group, color = ?color, "assigned group color");
        self.assigned.insert(group.to_owned(), color);
        color
    }

    fn draw_next(&mut self) -> Color32 {
        if let Some(&index) = self.eligible.get(self.next_eligible) {
            self.next_eligible += 1;
            return self.palette[index];
        }

        // Exhausted: cycle again, still preferring colors clear of the
        // reserved ones when any exist.
        let pool_len = if self.eligible.is_empty() {
            self.palette.len()
        } else {
            self.eligible.len()
        };
        if pool_len == 0 {
            return self.node_color;
        }

        let slot = self.wrap_cursor % pool_len;
        self.wrap_cursor = self.wrap_cursor.wrapping_add(1);
        if self.eligible.is_empty() {
            self.palette[slot]
        } else {
            self.palette[self.eligible[slot]]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_is_stable_per_group() {
        let mut assigner = ColorAssigner::new(&PaletteConfig::default());
        let first = assigner.color_for("web");
        let other = assigner.color_for("db");
        assert_ne!(first, other);
        for _ in 0..5 {
            assert_eq!(assigner.color_for("web"), first);
        }
        assert_eq!(assigner.assigned_count(), 2);
    }

    #[test]
    fn assigned_colors_avoid_reserved_colors() {
        let config = PaletteConfig::default();
        let mut assigner = ColorAssigner::new(&config);
        let mut handed_out = Vec::new();
        let mut group = 0usize;
        while !assigner.is_exhausted() {
            handed_out.push(assigner.color_for(&format!("group-{group}")));
            group += 1;
        }

        assert!(!handed_out.is_empty());
        for color in handed_out {
            assert!(rgb_distance(color, assigner.alarm_color()) > config.reserved_distance);
            assert!(rgb_distance(color, assigner.node_color()) > config.reserved_distance);
        }
    }

    #[test]
    fn red_palette_entry_is_skipped() {
        let mut assigner = ColorAssigner::new(&PaletteConfig::default());
        let colors = (0..10)
            .map(|index| assigner.color_for(&format!("g{index}")))
            .collect::<Vec<_>>();
        assert!(!colors.contains(&Color32::from_rgb(0xd6, 0x27, 0x28)));
    }

    #[test]
    fn exhausted_palette_wraps_in_order() {
        let config = PaletteConfig {
            colors: vec!["#1f77b4".to_owned(), "#2ca02c".to_owned()],
            ..PaletteConfig::default()
        };
        let mut assigner = ColorAssigner::new(&config);
        let a = assigner.color_for("a");
        let b = assigner.color_for("b");
        assert!(assigner.is_exhausted());
        assert_eq!(assigner.color_for("c"), a);
        assert_eq!(assigner.color_for("d"), b);
        assert_eq!(assigner.color_for("a"), a);
    }

    #[test]
    fn group_keeps_color_after_disappearing() {
        let mut assigner = ColorAssigner::new(&PaletteConfig::default());
        let web = assigner.color_for("web");
        for index in 0..20 {
            assigner.color_for(&format!("churn-{index}"));
        }
        assert_eq!(assigner.color_for("web"), web);
    }
}
