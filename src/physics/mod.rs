mod forces;
mod quadtree;

use std::collections::HashMap;

use eframe::egui::{Vec2, vec2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::config::{ForceConfig, Viewport};
use crate::topology::{EntityKind, TopologyModel};
use crate::util::{stable_hash, stable_pair};
use forces::{
    ChargeParams, CollisionParams, Link, accumulate_charge_for_node, accumulate_collision_pairs,
    accumulate_links, accumulate_positional,
};
use quadtree::QuadNode;

const BARNES_HUT_THETA: f32 = 0.9;
const CHARGE_DISTANCE_MIN_SQ: f32 = 1.0;
const SCATTER_MARGIN: f32 = 10.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimulationPhase {
    /// Built but not yet stepped.
    Cold,
    Running,
    /// α is below the cooling threshold and still decaying.
    Cooling,
    /// α fell below its minimum; no ticks until perturbed.
    AtRest,
    /// Re-energized from outside; becomes `Running` on the next tick.
    Perturbed,
}

#[derive(Clone, Debug)]
pub struct SimEntity {
    pub id: String,
    pub kind: EntityKind,
    pub position: Vec2,
    pub velocity: Vec2,
    pub pin: Option<Vec2>,
    /// Drawn radius; also the margin kept from the viewport edges.
    pub radius: f32,
    collide_radius: f32,
    charge: f32,
    target: PositionTarget,
}

#[derive(Clone, Copy, Debug)]
enum PositionTarget {
    Fixed(Vec2),
    /// Follow another entity (a pod's cluster node).
    Entity(usize),
}

/// Positions of every entity after one integration step, in the same order
/// as [`ForceSimulation::entities`].
#[derive(Clone, Debug)]
pub struct TickFrame {
    pub tick: u64,
    pub alpha: f32,
    pub phase: SimulationPhase,
    pub positions: Vec<Vec2>,
}

struct PhysicsScratch {
    forces: Vec<Vec2>,
    positions: Vec<Vec2>,
    velocities: Vec<Vec2>,
    targets: Vec<Vec2>,
    charges: Vec<f32>,
    collide_radii: Vec<f32>,
}

pub struct ForceSimulation {
    entities: Vec<SimEntity>,
    index_by_id: HashMap<String, usize>,
    links: Vec<Link>,
    config: ForceConfig,
    viewport: Viewport,
    alpha: f32,
    alpha_target: f32,
    phase: SimulationPhase,
    stopped: bool,
    tick: u64,
    rng: StdRng,
    scratch: PhysicsScratch,
}

impl ForceSimulation {
    /// Builds a cold simulation for `model`. Entities that also exist in
    /// `prior` keep their position, pin and scatter target; velocities
    /// always start at zero. Scatter targets of unscheduled pods are seeded
    /// per id, so two pods never share one across restarts.
    pub fn new(
        model: &TopologyModel,
        config: ForceConfig,
        viewport: Viewport,
        prior: Option<&ForceSimulation>,
    ) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        let node_count = model.nodes.len();
        let mut entities = Vec::with_capacity(model.entity_count());
        let mut index_by_id = HashMap::with_capacity(model.entity_count());

        for (index, node) in model.nodes.iter().enumerate() {
            let anchor = vec2(
                viewport.width * (index + 1) as f32 / (node_count + 1) as f32,
                viewport.height * 0.5,
            );
            let (jx, jy) = stable_pair(&node.id);
            let spawn = anchor + vec2(jx, jy) * 40.0;
            index_by_id.insert(node.id.clone(), entities.len());
            entities.push(SimEntity {
                id: node.id.clone(),
                kind: EntityKind::Node,
                position: spawn,
                velocity: Vec2::ZERO,
                pin: None,
                radius: config.render_radius(EntityKind::Node),
                collide_radius: config.collide_radius(EntityKind::Node),
                charge: config.charge(EntityKind::Node),
                target: PositionTarget::Fixed(anchor),
            });
        }

        for unit in &model.units {
            let radius = config.render_radius(EntityKind::Pod);
            let (jx, jy) = stable_pair(&unit.id);
            let parent_index = unit
                .parent
                .as_ref()
                .and_then(|parent| index_by_id.get(parent).copied());

            let (spawn, target) = match parent_index {
                Some(parent) => {
                    let mut direction = vec2(jx, jy);
                    direction = if direction.length_sq() <= 0.0001 {
                        vec2(1.0, 0.0)
                    } else {
                        direction.normalized()
                    };
                    let spawn = entities[parent].position
                        + direction * config.link_distance(EntityKind::Pod);
                    (spawn, PositionTarget::Entity(parent))
                }
                None => {
                    let seed = config.seed ^ stable_hash(&unit.id);
                    let mut scatter_rng = StdRng::seed_from_u64(seed);
                    let scatter =
                        random_in_bounds(&mut scatter_rng, viewport, SCATTER_MARGIN.max(radius));
                    (scatter, PositionTarget::Fixed(scatter))
                }
            };

            index_by_id.insert(unit.id.clone(), entities.len());
            entities.push(SimEntity {
                id: unit.id.clone(),
                kind: EntityKind::Pod,
                position: spawn,
                velocity: Vec2::ZERO,
                pin: None,
                radius,
                collide_radius: config.collide_radius(EntityKind::Pod),
                charge: config.charge(EntityKind::Pod),
                target,
            });
        }

        if let Some(prior) = prior {
            for entity in &mut entities {
                let Some(previous) = prior.entity(&entity.id) else {
                    continue;
                };
                if previous.kind != entity.kind {
                    continue;
                }
                entity.position = previous.position;
                entity.pin = previous.pin;
                if let (PositionTarget::Fixed(_), PositionTarget::Fixed(old)) =
                    (entity.target, previous.target)
                    && entity.kind == EntityKind::Pod
                {
                    entity.target = PositionTarget::Fixed(old);
                }
            }
        }

        for entity in &mut entities {
            let (x, y) = viewport.clamp(entity.position.x, entity.position.y, entity.radius);
            entity.position = vec2(x, y);
            if let Some(pin) = entity.pin {
                let (x, y) = viewport.clamp(pin.x, pin.y, entity.radius);
                entity.pin = Some(vec2(x, y));
                entity.position = vec2(x, y);
            }
        }

        let mut degree = vec![0usize; entities.len()];
        let mut link_pairs = Vec::with_capacity(model.edges.len());
        for edge in &model.edges {
            let (Some(&source), Some(&target)) =
                (index_by_id.get(&edge.source), index_by_id.get(&edge.target))
            else {
                continue;
            };
            if source == target {
                continue;
            }
            degree[source] += 1;
            degree[target] += 1;
            link_pairs.push((source, target));
        }

        let links = link_pairs
            .into_iter()
            .map(|(source, target)| {
                let source_degree = degree[source] as f32;
                let target_degree = degree[target] as f32;
                Link {
                    source,
                    target,
                    distance: config.link_distance(entities[target].kind),
                    strength: config.link_strength / source_degree.min(target_degree),
                    bias: source_degree / (source_degree + target_degree),
                }
            })
            .collect();

        Self {
            entities,
            index_by_id,
            links,
            config,
            viewport,
            alpha: config.alpha_initial,
            alpha_target: 0.0,
            phase: SimulationPhase::Cold,
            stopped: false,
            tick: 0,
            rng,
            scratch: PhysicsScratch {
                forces: Vec::new(),
                positions: Vec::new(),
                velocities: Vec::new(),
                targets: Vec::new(),
                charges: Vec::new(),
                collide_radii: Vec::new(),
            },
        }
    }

    pub fn entities(&self) -> &[SimEntity] {
        &self.entities
    }

    pub fn entity(&self, id: &str) -> Option<&SimEntity> {
        self.index_by_id.get(id).map(|&index| &self.entities[index])
    }

    pub fn position_of(&self, id: &str) -> Option<Vec2> {
        self.entity(id).map(|entity| entity.position)
    }

    /// Edges as entity index pairs `(cluster node, pod)`.
    pub fn link_indices(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.links.iter().map(|link| (link.source, link.target))
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn phase(&self) -> SimulationPhase {
        self.phase
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn is_at_rest(&self) -> bool {
        self.phase == SimulationPhase::AtRest
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn stop(&mut self) {
        self.stopped = true;
    }

    /// Fixes an entity in place. The pin is clamped to the viewport so the
    /// entity never leaves it. Returns `false` for unknown ids.
    pub fn pin(&mut self, id: &str, at: Vec2) -> bool {
        let Some(&index) = self.index_by_id.get(id) else {
            return false;
        };
        let entity = &mut self.entities[index];
        let (x, y) = self.viewport.clamp(at.x, at.y, entity.radius);
        entity.pin = Some(vec2(x, y));
        entity.position = vec2(x, y);
        entity.velocity = Vec2::ZERO;
        true
    }

    pub fn unpin(&mut self, id: &str) -> bool {
        let Some(&index) = self.index_by_id.get(id) else {
            return false;
        };
        self.entities[index].pin.take().is_some()
    }

    /// α that the simulation converges toward instead of zero; held above
    /// zero while the user is dragging.
    pub fn set_alpha_target(&mut self, target: f32) {
        self.alpha_target = target.clamp(0.0, 1.0);
    }

    pub fn alpha_target(&self) -> f32 {
        self.alpha_target
    }

    /// Re-energizes a resting simulation with at least `alpha`.
    pub fn perturb(&mut self, alpha: f32) {
        if self.stopped {
            return;
        }
        self.alpha = self.alpha.max(alpha.clamp(0.0, 1.0));
        self.phase = SimulationPhase::Perturbed;
    }

    /// Lazy tick sequence; ends when the simulation rests or is stopped.
    pub fn ticks(&mut self) -> TickStream<'_> {
        TickStream { simulation: self }
    }

    pub fn frame(&self) -> TickFrame {
        TickFrame {
            tick: self.tick,
            alpha: self.alpha,
            phase: self.phase,
            positions: self.entities.iter().map(|entity| entity.position).collect(),
        }
    }

    /// Advances one integration step. Returns `false` without touching any
    /// state when resting or stopped.
    pub fn step(&mut self) -> bool {
        if self.stopped || self.phase == SimulationPhase::AtRest {
            return false;
        }

        self.repair_degenerate();

        self.alpha += (self.alpha_target - self.alpha) * self.config.alpha_decay;
        let alpha = self.alpha;
        let entity_count = self.entities.len();

        let scratch = &mut self.scratch;
        scratch.forces.clear();
        scratch.forces.resize(entity_count, Vec2::ZERO);
        scratch.positions.clear();
        scratch.velocities.clear();
        scratch.charges.clear();
        scratch.collide_radii.clear();
        scratch.targets.clear();
        let mut max_collide_radius = 0.0_f32;
        for entity in &self.entities {
            scratch.positions.push(entity.position);
            scratch.velocities.push(entity.velocity);
            scratch.charges.push(entity.charge);
            scratch.collide_radii.push(entity.collide_radius);
            max_collide_radius = max_collide_radius.max(entity.collide_radius);
        }
        for entity in &self.entities {
            let target = match entity.target {
                PositionTarget::Fixed(point) => point,
                PositionTarget::Entity(owner) => scratch.positions[owner],
            };
            scratch.targets.push(target);
        }

        let forces = &mut scratch.forces;
        let positions = &scratch.positions;

        accumulate_links(&self.links, positions, &scratch.velocities, alpha, forces);

        if let Some(quadtree) = QuadNode::build(positions, &scratch.charges) {
            let params = ChargeParams {
                alpha,
                theta: BARNES_HUT_THETA,
                distance_min_sq: CHARGE_DISTANCE_MIN_SQ,
            };
            for (index, force) in forces.iter_mut().enumerate() {
                accumulate_charge_for_node(
                    &quadtree,
                    index,
                    positions,
                    &scratch.charges,
                    params,
                    force,
                );
            }

            let max_collision_distance = max_collide_radius * 2.0;
            if max_collision_distance > 0.0 && self.config.collision_strength > 0.0 {
                accumulate_collision_pairs(
                    &quadtree,
                    &quadtree,
                    true,
                    positions,
                    &scratch.collide_radii,
                    CollisionParams {
                        collision_strength: self.config.collision_strength,
                        max_collision_distance_sq: max_collision_distance
                            * max_collision_distance,
                    },
                    forces,
                );
            }
        }

        accumulate_positional(
            positions,
            &scratch.targets,
            self.config.position_strength,
            alpha,
            forces,
        );

        let damping = (1.0 - self.config.velocity_decay).clamp(0.0, 1.0);
        let max_speed = self.config.max_speed.max(0.0);
        let max_speed_sq = max_speed * max_speed;
        for (entity, force) in self.entities.iter_mut().zip(forces.iter()) {
            if let Some(pin) = entity.pin {
                entity.position = pin;
                entity.velocity = Vec2::ZERO;
                continue;
            }

            let mut velocity = (entity.velocity + *force) * damping;
            let speed_sq = velocity.length_sq();
            if speed_sq > max_speed_sq {
                velocity *= max_speed / speed_sq.sqrt();
            }

            entity.velocity = velocity;
            entity.position += velocity;
        }

        self.repair_degenerate();
        for entity in &mut self.entities {
            let (x, y) = self
                .viewport
                .clamp(entity.position.x, entity.position.y, entity.radius);
            entity.position = vec2(x, y);
        }

        self.tick += 1;
        self.phase = if self.alpha < self.config.alpha_min {
            SimulationPhase::AtRest
        } else if self.alpha < self.config.cooling_alpha && self.alpha_target < self.alpha {
            SimulationPhase::Cooling
        } else {
            SimulationPhase::Running
        };
        if self.phase == SimulationPhase::AtRest {
            debug!(ticks = self.tick, "simulation at rest");
        }
        true
    }

    /// Replaces NaN or infinite coordinates with a random in-bounds point.
    fn repair_degenerate(&mut self) {
        for entity in &mut self.entities {
            if !is_finite(entity.position) {
                entity.position = random_in_bounds(&mut self.rng, self.viewport, entity.radius);
                entity.velocity = Vec2::ZERO;
                debug!(id = %entity.id, "reset non-finite position");
            }
            if !is_finite(entity.velocity) {
                entity.velocity = Vec2::ZERO;
            }
            if let Some(pin) = entity.pin
                && !is_finite(pin)
            {
                entity.pin = Some(entity.position);
            }
        }
    }

    #[cfg(test)]
    fn corrupt_position(&mut self, id: &str, position: Vec2) {
        if let Some(&index) = self.index_by_id.get(id) {
            self.entities[index].position = position;
        }
    }
}

pub struct TickStream<'a> {
    simulation: &'a mut ForceSimulation,
}

impl Iterator for TickStream<'_> {
    type Item = TickFrame;

    fn next(&mut self) -> Option<Self::Item> {
        if self.simulation.step() {
            Some(self.simulation.frame())
        } else {
            None
        }
    }
}

fn is_finite(value: Vec2) -> bool {
    value.x.is_finite() && value.y.is_finite()
}

fn random_in_bounds(rng: &mut StdRng, viewport: Viewport, margin: f32) -> Vec2 {
    let max_x = (viewport.width - margin).max(margin);
    let max_y = (viewport.height - margin).max(margin);
    vec2(
        rng.random_range(margin..=max_x),
        rng.random_range(margin..=max_y),
    )
}
