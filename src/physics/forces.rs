use eframe::egui::{Vec2, vec2};

use super::quadtree::QuadNode;

#[derive(Clone, Copy)]
pub(super) struct ChargeParams {
    pub(super) alpha: f32,
    pub(super) theta: f32,
    pub(super) distance_min_sq: f32,
}

#[derive(Clone, Copy)]
pub(super) struct CollisionParams {
    pub(super) collision_strength: f32,
    pub(super) max_collision_distance_sq: f32,
}

/// Spring between two entity indices, resolved once per engine instance.
#[derive(Clone, Copy, Debug)]
pub(super) struct Link {
    pub(super) source: usize,
    pub(super) target: usize,
    pub(super) distance: f32,
    pub(super) strength: f32,
    /// Share of the correction applied to `target`; the rest goes to `source`.
    pub(super) bias: f32,
}

/// Unit vector used when two entities sit on the same spot. Antisymmetric in
/// `(a, b)` so the pair separates instead of drifting together.
pub(super) fn fallback_direction(a: usize, b: usize) -> Vec2 {
    let (low, high) = if a < b { (a, b) } else { (b, a) };
    let angle = ((low as f32) * 0.618_034 + (high as f32) * 0.414_214) * std::f32::consts::TAU;
    let direction = vec2(angle.cos(), angle.sin());
    if a < b { direction } else { -direction }
}

fn charge_between(
    point: Vec2,
    source: Vec2,
    strength: f32,
    index: usize,
    other: usize,
    params: ChargeParams,
) -> Vec2 {
    let mut delta = source - point;
    let mut distance_sq = delta.length_sq();
    if distance_sq <= 0.000_001 {
        delta = -fallback_direction(index, other);
        distance_sq = 1.0;
    }
    delta * (strength * params.alpha / distance_sq.max(params.distance_min_sq))
}

/// Many-body force on `index`; negative charges repel.
pub(super) fn accumulate_charge_for_node(
    node: &QuadNode,
    index: usize,
    positions: &[Vec2],
    charges: &[f32],
    params: ChargeParams,
    force: &mut Vec2,
) {
    if node.count == 0 {
        return;
    }

    let point = positions[index];

    if node.is_leaf() {
        for &other_index in &node.members {
            if other_index == index {
                continue;
            }
            *force += charge_between(
                point,
                positions[other_index],
                charges[other_index],
                index,
                other_index,
                params,
            );
        }
        return;
    }

    let delta = node.center_of_charge - point;
    let distance_sq = delta.length_sq().max(0.0001);
    let distance = distance_sq.sqrt();
    let can_approximate = !node.bounds.contains(point)
        && ((node.bounds.side() / distance) < params.theta)
        && node.count > 1;

    if can_approximate {
        *force += delta * (node.charge * params.alpha / distance_sq.max(params.distance_min_sq));
        return;
    }

    for child in node.children.iter().flatten() {
        accumulate_charge_for_node(child, index, positions, charges, params, force);
    }
}

fn collide_pair(
    from: usize,
    to: usize,
    positions: &[Vec2],
    radii: &[f32],
    params: CollisionParams,
    forces: &mut [Vec2],
) {
    let min_distance = radii[from] + radii[to];
    let delta = positions[from] - positions[to];
    let distance_sq = delta.length_sq();
    if distance_sq >= min_distance * min_distance {
        return;
    }

    let distance = distance_sq.sqrt();
    let direction = if distance > 0.0001 {
        delta / distance
    } else {
        fallback_direction(from, to)
    };

    let overlap = (min_distance - distance) * params.collision_strength;
    let from_sq = radii[from] * radii[from];
    let to_sq = radii[to] * radii[to];
    let share = if from_sq + to_sq > 0.0 {
        to_sq / (from_sq + to_sq)
    } else {
        0.5
    };

    forces[from] += direction * (overlap * share);
    forces[to] -= direction * (overlap * (1.0 - share));
}

/// Dual-tree traversal that only visits cell pairs close enough to contain
/// overlapping circles.
pub(super) fn accumulate_collision_pairs(
    node_a: &QuadNode,
    node_b: &QuadNode,
    same_node: bool,
    positions: &[Vec2],
    radii: &[f32],
    params: CollisionParams,
    forces: &mut [Vec2],
) {
    if node_a.bounds.gap_sq(node_b.bounds) > params.max_collision_distance_sq {
        return;
    }

    if node_a.is_leaf() && node_b.is_leaf() {
        if same_node {
            for i in 0..node_a.members.len() {
                for j in (i + 1)..node_a.members.len() {
                    collide_pair(
                        node_a.members[i],
                        node_a.members[j],
                        positions,
                        radii,
                        params,
                        forces,
                    );
                }
            }
        } else {
            for &from in &node_a.members {
                for &to in &node_b.members {
                    collide_pair(from, to, positions, radii, params, forces);
                }
            }
        }
        return;
    }

    if same_node {
        for first in 0..4 {
            let Some(child_a) = node_a.children[first].as_ref() else {
                continue;
            };

            accumulate_collision_pairs(child_a, child_a, true, positions, radii, params, forces);

            for second in (first + 1)..4 {
                let Some(child_b) = node_a.children[second].as_ref() else {
                    continue;
                };
                accumulate_collision_pairs(
                    child_a, child_b, false, positions, radii, params, forces,
                );
            }
        }
        return;
    }

    let split_a = if node_a.is_leaf() {
        false
    } else if node_b.is_leaf() {
        true
    } else {
        node_a.bounds.side() >= node_b.bounds.side()
    };

    if split_a {
        for child in node_a.children.iter().flatten() {
            accumulate_collision_pairs(child, node_b, false, positions, radii, params, forces);
        }
    } else {
        for child in node_b.children.iter().flatten() {
            accumulate_collision_pairs(node_a, child, false, positions, radii, params, forces);
        }
    }
}

/// Spring pass. Uses the position each endpoint is about to reach so stiff
/// springs do not overshoot.
pub(super) fn accumulate_links(
    links: &[Link],
    positions: &[Vec2],
    velocities: &[Vec2],
    alpha: f32,
    forces: &mut [Vec2],
) {
    for link in links {
        let (source, target) = (link.source, link.target);
        if source >= positions.len() || target >= positions.len() || source == target {
            continue;
        }

        let mut delta = (positions[target] + velocities[target] + forces[target])
            - (positions[source] + velocities[source] + forces[source]);
        let mut distance = delta.length();
        if distance <= 0.0001 {
            delta = fallback_direction(source, target) * 0.0001;
            distance = 0.0001;
        }

        let correction = delta * ((distance - link.distance) / distance * alpha * link.strength);
        forces[target] -= correction * link.bias;
        forces[source] += correction * (1.0 - link.bias);
    }
}

/// Weak pull toward a per-entity target point.
pub(super) fn accumulate_positional(
    positions: &[Vec2],
    targets: &[Vec2],
    strength: f32,
    alpha: f32,
    forces: &mut [Vec2],
) {
    for ((force, position), target) in forces.iter_mut().zip(positions).zip(targets) {
        *force += (*target - *position) * (strength * alpha);
    }
}
