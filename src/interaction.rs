use std::collections::HashSet;

use eframe::egui::Vec2;
use tracing::debug;

use crate::config::DragReleasePolicy;
use crate::physics::ForceSimulation;
use crate::topology::EntityKind;

/// Turns pointer drags into pin/unpin commands. While any drag is active the
/// simulation's α is held at the boost value so neighbors keep reacting.
pub struct InteractionController {
    policy: DragReleasePolicy,
    drag_alpha: f32,
    active: HashSet<String>,
}

impl InteractionController {
    pub fn new(policy: DragReleasePolicy, drag_alpha: f32) -> Self {
        Self {
            policy,
            drag_alpha,
            active: HashSet::new(),
        }
    }

    pub fn is_dragging(&self) -> bool {
        !self.active.is_empty()
    }

    pub fn on_drag_start(&mut self, simulation: &mut ForceSimulation, id: &str) -> bool {
        let Some(current) = simulation.position_of(id) else {
            return false;
        };

        simulation.pin(id, current);
        if simulation.is_at_rest() {
            simulation.perturb(self.drag_alpha);
        }
        simulation.set_alpha_target(self.drag_alpha);
        self.active.insert(id.to_owned());
        debug!(id, "drag started");
        true
    }

    pub fn on_drag_move(&mut self, simulation: &mut ForceSimulation, id: &str, pointer: Vec2) {
        if !self.active.contains(id) {
            return;
        }
        simulation.pin(id, pointer);
    }

    pub fn on_drag_end(&mut self, simulation: &mut ForceSimulation, id: &str) {
        if !self.active.remove(id) {
            return;
        }

        let keep_pinned = self.policy == DragReleasePolicy::PinClusterNodes
            && simulation
                .entity(id)
                .is_some_and(|entity| entity.kind == EntityKind::Node);
        if !keep_pinned {
            simulation.unpin(id);
        }

        if self.active.is_empty() {
            simulation.set_alpha_target(0.0);
        }
        debug!(id, keep_pinned, "drag ended");
    }

    /// Forgets drags whose entity vanished after an engine restart; restores
    /// the held α on the new engine for the drags that survived.
    pub fn reattach(&mut self, simulation: &mut ForceSimulation) {
        self.active.retain(|id| simulation.entity(id).is_some());
        if !self.active.is_empty() {
            simulation.set_alpha_target(self.drag_alpha);
        }
    }
}

#[cfg(test)]
mod tests {
    use eframe::egui::vec2;

    use super::*;
    use crate::config::{ForceConfig, Viewport};
    use crate::physics::SimulationPhase;
    use crate::topology::{TopologyModel, parse_snapshot};

    fn simulation() -> ForceSimulation {
        let snapshot = parse_snapshot(
            r#"{"nodes":[{"name":"n1"},{"name":"n2"}],
                "pods":[{"name":"p1","node":"n1","deployment":"d"},{"name":"p2","node":"n2"}]}"#,
        )
        .expect("payload parses");
        let model = TopologyModel::build(&snapshot).expect("well formed");
        ForceSimulation::new(&model, ForceConfig::default(), Viewport::default(), None)
    }

    #[test]
    fn drag_pins_follows_pointer_and_releases() {
        let mut simulation = simulation();
        let mut controller = InteractionController::new(DragReleasePolicy::Release, 0.3);

        let start = simulation.position_of("p1").expect("pod exists");
        assert!(controller.on_drag_start(&mut simulation, "p1"));
        assert_eq!(simulation.entity("p1").and_then(|entity| entity.pin), Some(start));

        controller.on_drag_move(&mut simulation, "p1", vec2(200.0, 220.0));
        simulation.step();
        assert_eq!(simulation.position_of("p1"), Some(vec2(200.0, 220.0)));

        controller.on_drag_end(&mut simulation, "p1");
        assert!(simulation.entity("p1").and_then(|entity| entity.pin).is_none());
        assert_eq!(simulation.alpha_target(), 0.0);
        assert!(!controller.is_dragging());
    }

    #[test]
    fn drag_start_wakes_resting_simulation() {
        let mut simulation = simulation();
        while simulation.step() {}
        assert!(simulation.is_at_rest());

        let mut controller = InteractionController::new(DragReleasePolicy::Release, 0.3);
        controller.on_drag_start(&mut simulation, "n1");
        assert_eq!(simulation.phase(), SimulationPhase::Perturbed);
        assert!((simulation.alpha() - 0.3).abs() < 1e-6);

        let alpha_before_move = simulation.alpha();
        controller.on_drag_move(&mut simulation, "n1", vec2(300.0, 300.0));
        assert_eq!(simulation.alpha(), alpha_before_move);
        assert!(simulation.step());
    }

    #[test]
    fn pin_cluster_nodes_policy_keeps_nodes_fixed() {
        let mut simulation = simulation();
        let mut controller = InteractionController::new(DragReleasePolicy::PinClusterNodes, 0.3);

        controller.on_drag_start(&mut simulation, "n2");
        controller.on_drag_move(&mut simulation, "n2", vec2(600.0, 100.0));
        controller.on_drag_end(&mut simulation, "n2");
        assert_eq!(
            simulation.entity("n2").and_then(|entity| entity.pin),
            Some(vec2(600.0, 100.0))
        );

        controller.on_drag_start(&mut simulation, "p2");
        controller.on_drag_end(&mut simulation, "p2");
        assert!(simulation.entity("p2").and_then(|entity| entity.pin).is_none());
    }

    #[test]
    fn alpha_stays_held_until_last_drag_ends() {
        let mut simulation = simulation();
        let mut controller = InteractionController::new(DragReleasePolicy::Release, 0.3);

        controller.on_drag_start(&mut simulation, "p1");
        controller.on_drag_start(&mut simulation, "p2");
        controller.on_drag_end(&mut simulation, "p1");
        assert_eq!(simulation.alpha_target(), 0.3);
        controller.on_drag_end(&mut simulation, "p2");
        assert_eq!(simulation.alpha_target(), 0.0);
    }

    #[test]
    fn unknown_entities_and_stray_events_are_ignored() {
        let mut simulation = simulation();
        let mut controller = InteractionController::new(DragReleasePolicy::Release, 0.3);

        assert!(!controller.on_drag_start(&mut simulation, "ghost"));
        controller.on_drag_move(&mut simulation, "p1", vec2(10.0, 10.0));
        assert!(simulation.entity("p1").and_then(|entity| entity.pin).is_none());
        controller.on_drag_end(&mut simulation, "p1");
        assert!(!controller.is_dragging());
    }

    #[test]
    fn reattach_drops_vanished_drags() {
        let mut simulation = simulation();
        let mut controller = InteractionController::new(DragReleasePolicy::Release, 0.3);
        controller.on_drag_start(&mut simulation, "p1");

        let snapshot = parse_snapshot(r#"{"nodes":[{"name":"n1"}],"pods":[]}"#).expect("parses");
        let model = TopologyModel::build(&snapshot).expect("well formed");
        let mut restarted = ForceSimulation::new(
            &model,
            ForceConfig::default(),
            Viewport::default(),
            Some(&simulation),
        );
        controller.reattach(&mut restarted);
        assert!(!controller.is_dragging());
        assert_eq!(restarted.alpha_target(), 0.0);
    }
}
