use std::collections::HashMap;
use std::time::Duration;

use eframe::egui::{Color32, Vec2};
use tracing::{debug, info, warn};

use crate::config::VizConfig;
use crate::interaction::InteractionController;
use crate::palette::ColorAssigner;
use crate::physics::{ForceSimulation, SimulationPhase, TickFrame};
use crate::source::{PollResult, Poller, SnapshotSource};
use crate::topology::{
    EntityKind, RawSnapshot, SnapshotError, TopologyModel, WorkloadUnit, has_changed,
};

const HIT_SLACK: f32 = 4.0;

#[derive(Clone, Debug)]
pub struct SceneEntity {
    pub id: String,
    pub kind: EntityKind,
    pub position: Vec2,
    pub radius: f32,
    pub color: Color32,
    pub label: String,
    pub alarm: bool,
    pub pinned: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct SceneEdge {
    pub from: Vec2,
    pub to: Vec2,
}

/// Everything a renderer needs for one frame, in viewport coordinates.
#[derive(Clone, Debug)]
pub struct SceneFrame {
    pub width: f32,
    pub height: f32,
    pub entities: Vec<SceneEntity>,
    pub edges: Vec<SceneEdge>,
    pub tick: u64,
    pub alpha: f32,
    pub phase: Option<SimulationPhase>,
}

pub trait RenderSink {
    fn present(&mut self, frame: &SceneFrame);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// Topology changed; a new simulation replaced the old one.
    Restarted,
    Unchanged,
    /// Fetch failed or the snapshot was malformed; the previous model stays.
    Rejected,
    /// Arrived after shutdown.
    Discarded,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub restarts: u64,
    pub unchanged: u64,
    pub malformed: u64,
    pub fetch_failures: u64,
}

/// Single owner of the live state: last accepted snapshot and model, the
/// color table, the running simulation and drag state. Only the UI loop
/// touches it, so snapshot application and ticks never interleave.
pub struct Session {
    config: VizConfig,
    colors: ColorAssigner,
    interaction: InteractionController,
    accepted: Option<RawSnapshot>,
    model: TopologyModel,
    units_by_id: HashMap<String, usize>,
    simulation: Option<ForceSimulation>,
    poller: Option<Poller>,
    stats: SessionStats,
    disposed: bool,
}

impl Session {
    pub fn new(config: VizConfig) -> Self {
        let colors = ColorAssigner::new(&config.palette);
        let interaction = InteractionController::new(config.drag_release, config.forces.drag_alpha);
        Self {
            config,
            colors,
            interaction,
            accepted: None,
            model: TopologyModel::default(),
            units_by_id: HashMap::new(),
            simulation: None,
            poller: None,
            stats: SessionStats::default(),
            disposed: false,
        }
    }

    pub fn with_source<S: SnapshotSource>(config: VizConfig, source: S, interval: Duration) -> Self {
        let mut session = Self::new(config);
        session.poller = Some(Poller::spawn(source, interval));
        session
    }

    pub fn model(&self) -> &TopologyModel {
        &self.model
    }

    pub fn simulation(&self) -> Option<&ForceSimulation> {
        self.simulation.as_ref()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn config(&self) -> &VizConfig {
        &self.config
    }

    pub fn is_dragging(&self) -> bool {
        self.interaction.is_dragging()
    }

    /// Whether another tick would change anything.
    pub fn is_animating(&self) -> bool {
        self.simulation
            .as_ref()
            .is_some_and(|simulation| !simulation.is_at_rest() && !simulation.is_stopped())
    }

    /// Applies every snapshot the poller delivered since the last call.
    pub fn pump(&mut self) -> usize {
        let Some(poller) = self.poller.as_ref() else {
            return 0;
        };
        let results = poller.drain();
        let count = results.len();
        for result in results {
            self.apply(result);
        }
        count
    }

    pub fn apply(&mut self, result: PollResult) -> SnapshotOutcome {
        if self.disposed {
            debug!("discarding snapshot that arrived after shutdown");
            return SnapshotOutcome::Discarded;
        }

        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(error) => return self.reject(error),
        };

        let model = match TopologyModel::build(&snapshot) {
            Ok(model) => model,
            Err(error) => return self.reject(error),
        };

        if !has_changed(self.accepted.as_ref(), &snapshot) {
            self.stats.unchanged += 1;
            debug!("topology unchanged, keeping current layout");
            return SnapshotOutcome::Unchanged;
        }

        let mut simulation = ForceSimulation::new(
            &model,
            self.config.forces,
            self.config.viewport,
            self.simulation.as_ref(),
        );
        self.interaction.reattach(&mut simulation);
        if let Some(previous) = self.simulation.as_mut() {
            debug!(ticks = previous.tick_count(), "stopping previous layout");
            previous.stop();
        }

        for unit in &model.units {
            if let Some(group) = unit.group.as_deref()
                && !unit.is_alarm()
            {
                self.colors.color_for(group);
            }
        }
        if self.colors.is_exhausted() {
            debug!(
                groups = self.colors.assigned_count(),
                "palette exhausted, group colors repeat"
            );
        }

        info!(
            nodes = model.nodes.len(),
            pods = model.units.len(),
            edges = model.edges.len(),
            "topology changed, restarting layout"
        );

        self.units_by_id = model
            .units
            .iter()
            .enumerate()
            .map(|(index, unit)| (unit.id.clone(), index))
            .collect();
        self.simulation = Some(simulation);
        self.model = model;
        self.accepted = Some(snapshot);
        self.stats.restarts += 1;
        SnapshotOutcome::Restarted
    }

    fn reject(&mut self, error: SnapshotError) -> SnapshotOutcome {
        match &error {
            SnapshotError::Malformed(_) => self.stats.malformed += 1,
            SnapshotError::TransientFetch(_) => self.stats.fetch_failures += 1,
        }
        warn!(error = %error, "keeping previous topology");
        SnapshotOutcome::Rejected
    }

    pub fn tick(&mut self) -> Option<TickFrame> {
        if self.disposed {
            return None;
        }
        self.simulation.as_mut()?.ticks().next()
    }

    /// Topmost entity whose circle contains `point` (viewport coordinates).
    pub fn entity_at(&self, point: Vec2) -> Option<String> {
        let simulation = self.simulation.as_ref()?;
        simulation
            .entities()
            .iter()
            .rev()
            .find(|entity| (entity.position - point).length() <= entity.radius + HIT_SLACK)
            .map(|entity| entity.id.clone())
    }

    pub fn drag_start(&mut self, id: &str) -> bool {
        match self.simulation.as_mut() {
            Some(simulation) => self.interaction.on_drag_start(simulation, id),
            None => false,
        }
    }

    pub fn drag_move(&mut self, id: &str, pointer: Vec2) {
        if let Some(simulation) = self.simulation.as_mut() {
            self.interaction.on_drag_move(simulation, id, pointer);
        }
    }

    pub fn drag_end(&mut self, id: &str) {
        if let Some(simulation) = self.simulation.as_mut() {
            self.interaction.on_drag_end(simulation, id);
        }
    }

    pub fn scene(&mut self) -> SceneFrame {
        let viewport = self.config.viewport;
        let Some(simulation) = self.simulation.as_ref() else {
            return SceneFrame {
                width: viewport.width,
                height: viewport.height,
                entities: Vec::new(),
                edges: Vec::new(),
                tick: 0,
                alpha: 0.0,
                phase: None,
            };
        };

        let frame = simulation.frame();
        let viewport = simulation.viewport();
        let entities = simulation
            .entities()
            .iter()
            .zip(&frame.positions)
            .map(|(entity, &position)| {
                let unit = self
                    .units_by_id
                    .get(&entity.id)
                    .map(|&index| &self.model.units[index]);
                let alarm = unit.is_some_and(WorkloadUnit::is_alarm);
                let color = match (entity.kind, unit) {
                    (EntityKind::Node, _) => self.colors.node_color(),
                    (EntityKind::Pod, _) if alarm => self.colors.alarm_color(),
                    (EntityKind::Pod, Some(WorkloadUnit {
                        group: Some(group), ..
                    })) => self.colors.color_for(group),
                    (EntityKind::Pod, _) => self.colors.ungrouped_color(),
                };
                SceneEntity {
                    id: entity.id.clone(),
                    kind: entity.kind,
                    position,
                    radius: entity.radius,
                    color,
                    label: entity.id.clone(),
                    alarm,
                    pinned: entity.pin.is_some(),
                }
            })
            .collect::<Vec<_>>();

        let edges = simulation
            .link_indices()
            .map(|(from, to)| SceneEdge {
                from: entities[from].position,
                to: entities[to].position,
            })
            .collect();

        SceneFrame {
            width: viewport.width,
            height: viewport.height,
            entities,
            edges,
            tick: frame.tick,
            alpha: frame.alpha,
            phase: Some(frame.phase),
        }
    }

    pub fn present<S: RenderSink>(&mut self, sink: &mut S) {
        let frame = self.scene();
        sink.present(&frame);
    }

    /// Stops polling and drops the engine. Anything applied afterwards is
    /// discarded.
    pub fn shutdown(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        if let Some(mut poller) = self.poller.take() {
            poller.stop();
        }
        if let Some(mut simulation) = self.simulation.take() {
            simulation.stop();
        }
        info!("session shut down");
    }
}
