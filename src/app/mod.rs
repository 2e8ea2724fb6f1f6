use std::time::Duration;

use eframe::egui::{self, Context, Sense};

use crate::physics::SimulationPhase;
use crate::session::Session;

mod render;

use render::{PainterSink, ViewTransform};

const IDLE_REPAINT: Duration = Duration::from_millis(250);

pub struct KupoviApp {
    session: Session,
    source_label: String,
    dragging: Option<String>,
}

impl KupoviApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, session: Session, source_label: String) -> Self {
        Self {
            session,
            source_label,
            dragging: None,
        }
    }

    fn status_text(&self) -> String {
        let model = self.session.model();
        let stats = self.session.stats();
        let phase = match self.session.simulation().map(|simulation| simulation.phase()) {
            None => "waiting for data",
            Some(SimulationPhase::Cold) => "cold",
            Some(SimulationPhase::Running) => "running",
            Some(SimulationPhase::Cooling) => "cooling",
            Some(SimulationPhase::AtRest) => "at rest",
            Some(SimulationPhase::Perturbed) => "perturbed",
        };
        let (alpha, held) = self
            .session
            .simulation()
            .map(|simulation| (simulation.alpha(), simulation.alpha_target() > 0.0))
            .unwrap_or((0.0, false));
        let held = if held { ", held" } else { "" };

        format!(
            "{}  |  nodes {}  pods {}  |  layout {phase} (α {alpha:.3}{held})  |  restarts {}  unchanged {}  failures {}",
            self.source_label,
            model.nodes.len(),
            model.units.len(),
            stats.restarts,
            stats.unchanged,
            stats.fetch_failures + stats.malformed,
        )
    }

    fn handle_drag(&mut self, ui: &egui::Ui, response: &egui::Response, transform: ViewTransform) {
        if response.drag_started_by(egui::PointerButton::Primary)
            && let Some(origin) = ui.input(|input| input.pointer.press_origin())
            && let Some(id) = self.session.entity_at(transform.to_world(origin))
            && self.session.drag_start(&id)
        {
            self.dragging = Some(id);
        }

        if response.dragged()
            && let Some(id) = self.dragging.as_deref()
            && let Some(pointer) = response.interact_pointer_pos()
        {
            self.session.drag_move(id, transform.to_world(pointer));
        }

        if response.drag_stopped()
            && let Some(id) = self.dragging.take()
        {
            self.session.drag_end(&id);
        }
    }
}

impl eframe::App for KupoviApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        self.session.pump();
        self.session.tick();

        let status = self.status_text();
        egui::TopBottomPanel::bottom("status")
            .resizable(false)
            .show(ctx, |ui| {
                ui.label(status);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            let (response, painter) =
                ui.allocate_painter(ui.available_size(), Sense::click_and_drag());
            let viewport = self.session.config().viewport;
            let transform = ViewTransform::fit(response.rect, viewport.width, viewport.height);

            self.handle_drag(ui, &response, transform);

            let hovered = response
                .hover_pos()
                .and_then(|pointer| self.session.entity_at(transform.to_world(pointer)));
            let mut sink = PainterSink {
                painter: &painter,
                transform,
                hovered: hovered.as_deref(),
            };
            self.session.present(&mut sink);
        });

        if self.session.is_animating() || self.session.is_dragging() {
            ctx.request_repaint();
        } else {
            ctx.request_repaint_after(IDLE_REPAINT);
        }
    }
}

impl Drop for KupoviApp {
    fn drop(&mut self) {
        self.session.shutdown();
    }
}
