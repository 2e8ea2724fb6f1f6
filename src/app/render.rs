use eframe::egui::{Align2, Color32, FontId, Painter, Pos2, Rect, Stroke, Vec2, vec2};

use crate::session::{RenderSink, SceneFrame};
use crate::topology::EntityKind;

const BACKGROUND: Color32 = Color32::from_rgb(19, 23, 29);
const CANVAS: Color32 = Color32::from_rgb(28, 33, 41);
const EDGE_COLOR: Color32 = Color32::from_rgba_premultiplied(128, 128, 128, 200);
const LABEL_COLOR: Color32 = Color32::from_gray(225);
const READOUT_COLOR: Color32 = Color32::from_gray(140);

/// Maps viewport coordinates onto the allocated screen rect, keeping aspect
/// ratio and centering the canvas.
#[derive(Clone, Copy, Debug)]
pub(super) struct ViewTransform {
    origin: Pos2,
    scale: f32,
}

impl ViewTransform {
    pub(super) fn fit(rect: Rect, width: f32, height: f32) -> Self {
        let scale = (rect.width() / width.max(1.0))
            .min(rect.height() / height.max(1.0))
            .max(0.01);
        let origin = rect.center() - vec2(width, height) * (scale * 0.5);
        Self { origin, scale }
    }

    pub(super) fn to_screen(self, world: Vec2) -> Pos2 {
        self.origin + world * self.scale
    }

    pub(super) fn to_world(self, screen: Pos2) -> Vec2 {
        (screen - self.origin) / self.scale
    }
}

pub(super) fn dim_color(color: Color32, factor: f32) -> Color32 {
    let factor = factor.clamp(0.0, 1.0);
    Color32::from_rgba_unmultiplied(
        (color.r() as f32 * factor) as u8,
        (color.g() as f32 * factor) as u8,
        (color.b() as f32 * factor) as u8,
        color.a(),
    )
}

/// Render sink drawing onto an egui painter.
pub(super) struct PainterSink<'a> {
    pub(super) painter: &'a Painter,
    pub(super) transform: ViewTransform,
    pub(super) hovered: Option<&'a str>,
}

impl RenderSink for PainterSink<'_> {
    fn present(&mut self, frame: &SceneFrame) {
        let painter = self.painter;
        let transform = self.transform;
        painter.rect_filled(painter.clip_rect(), 0.0, BACKGROUND);
        let canvas = Rect::from_min_max(
            transform.to_screen(Vec2::ZERO),
            transform.to_screen(vec2(frame.width, frame.height)),
        );
        painter.rect_filled(canvas, 4.0, CANVAS);
        if frame.phase.is_some() {
            painter.text(
                canvas.left_top() + vec2(6.0, 4.0),
                Align2::LEFT_TOP,
                format!("tick {}  α {:.3}", frame.tick, frame.alpha),
                FontId::monospace(11.0),
                READOUT_COLOR,
            );
        }

        for edge in &frame.edges {
            painter.line_segment(
                [transform.to_screen(edge.from), transform.to_screen(edge.to)],
                Stroke::new(1.0, EDGE_COLOR),
            );
        }

        // Nodes first so pods draw on top of the node circles they orbit.
        let ordered = frame
            .entities
            .iter()
            .filter(|entity| entity.kind == EntityKind::Node)
            .chain(
                frame
                    .entities
                    .iter()
                    .filter(|entity| entity.kind == EntityKind::Pod),
            );

        for entity in ordered {
            let center = transform.to_screen(entity.position);
            let radius = entity.radius * transform.scale;
            let is_hovered = self.hovered == Some(entity.id.as_str());

            painter.circle_filled(center, radius, entity.color);
            painter.circle_stroke(
                center,
                radius,
                Stroke::new(1.0, dim_color(entity.color, 0.45)),
            );
            if entity.pinned || is_hovered {
                painter.circle_stroke(
                    center,
                    radius + 3.0,
                    Stroke::new(1.5, Color32::from_gray(240)),
                );
            }

            let label_color = if entity.alarm {
                entity.color
            } else {
                LABEL_COLOR
            };
            let label_pos = Pos2::new(
                center.x.clamp(canvas.left(), canvas.right()),
                (center.y - radius - 4.0).max(canvas.top() + 14.0),
            );
            painter.text(
                label_pos,
                Align2::CENTER_BOTTOM,
                &entity.label,
                FontId::proportional(12.0),
                label_color,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_round_trips_and_centers() {
        let rect = Rect::from_min_size(Pos2::new(0.0, 0.0), vec2(1600.0, 600.0));
        let transform = ViewTransform::fit(rect, 800.0, 600.0);

        assert_eq!(transform.to_screen(Vec2::ZERO), Pos2::new(400.0, 0.0));
        assert_eq!(transform.to_screen(vec2(800.0, 600.0)), Pos2::new(1200.0, 600.0));

        let world = vec2(123.0, 45.0);
        let back = transform.to_world(transform.to_screen(world));
        assert!((back - world).length() < 1e-3);
    }

    #[test]
    fn dim_color_keeps_alpha() {
        let dimmed = dim_color(Color32::from_rgb(200, 100, 50), 0.5);
        assert_eq!(dimmed, Color32::from_rgb(100, 50, 25));
    }
}
