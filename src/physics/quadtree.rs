use eframe::egui::{Rect, Vec2, pos2};

const LEAF_CAPACITY: usize = 12;
const MAX_DEPTH: usize = 10;

/// Axis-aligned square covered by one tree cell.
#[derive(Clone, Copy, Debug)]
pub(super) struct CellBounds(Rect);

impl CellBounds {
    /// Smallest square (plus a unit margin) around every point, or `None`
    /// when the set is empty or holds a non-finite coordinate.
    fn enclosing(points: &[Vec2]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut rect = Rect::NOTHING;
        for point in points {
            if !point.x.is_finite() || !point.y.is_finite() {
                return None;
            }
            rect.extend_with(point.to_pos2());
        }

        let side = rect.width().max(rect.height()).max(1.0) + 2.0;
        Some(Self(Rect::from_center_size(rect.center(), Vec2::splat(side))))
    }

    pub(super) fn contains(self, point: Vec2) -> bool {
        self.0.contains(point.to_pos2())
    }

    pub(super) fn side(self) -> f32 {
        self.0.width()
    }

    /// Squared gap between two cells; zero when they touch or overlap.
    pub(super) fn gap_sq(self, other: Self) -> f32 {
        let (a, b) = (self.0, other.0);
        let dx = (b.min.x - a.max.x).max(a.min.x - b.max.x).max(0.0);
        let dy = (b.min.y - a.max.y).max(a.min.y - b.max.y).max(0.0);
        dx * dx + dy * dy
    }

    /// Quadrant index: bit 0 set for the right half, bit 1 for the lower half.
    fn quadrant_of(self, point: Vec2) -> usize {
        let center = self.0.center();
        usize::from(point.x >= center.x) | (usize::from(point.y >= center.y) << 1)
    }

    fn quadrant(self, quadrant: usize) -> Self {
        let center = self.0.center();
        let min = pos2(
            if quadrant & 1 == 0 { self.0.min.x } else { center.x },
            if quadrant & 2 == 0 { self.0.min.y } else { center.y },
        );
        Self(Rect::from_min_size(min, Vec2::splat(self.side() * 0.5)))
    }
}

/// Barnes-Hut cell. `charge` is the signed sum of member charges and
/// `center_of_charge` is weighted by charge magnitude.
pub(super) struct QuadNode {
    pub(super) bounds: CellBounds,
    pub(super) center_of_charge: Vec2,
    pub(super) charge: f32,
    pub(super) count: usize,
    /// Entity indices; only populated on leaves.
    pub(super) members: Vec<usize>,
    pub(super) children: [Option<Box<QuadNode>>; 4],
}

impl QuadNode {
    pub(super) fn build(positions: &[Vec2], charges: &[f32]) -> Option<Self> {
        let bounds = CellBounds::enclosing(positions)?;
        Some(Self::subdivide(
            bounds,
            (0..positions.len()).collect(),
            positions,
            charges,
            0,
        ))
    }

    fn subdivide(
        bounds: CellBounds,
        members: Vec<usize>,
        positions: &[Vec2],
        charges: &[f32],
        depth: usize,
    ) -> Self {
        let (center_of_charge, charge) = summarize(&members, positions, charges, bounds);
        let mut cell = Self {
            bounds,
            center_of_charge,
            charge,
            count: members.len(),
            members,
            children: Default::default(),
        };

        if depth >= MAX_DEPTH || cell.members.len() <= LEAF_CAPACITY {
            return cell;
        }

        let mut split: [Vec<usize>; 4] = Default::default();
        for &index in &cell.members {
            split[bounds.quadrant_of(positions[index])].push(index);
        }
        // Coincident points never separate; keep them in one leaf.
        if split.iter().filter(|part| !part.is_empty()).count() < 2 {
            return cell;
        }

        for (quadrant, part) in split.into_iter().enumerate() {
            if !part.is_empty() {
                cell.children[quadrant] = Some(Box::new(Self::subdivide(
                    bounds.quadrant(quadrant),
                    part,
                    positions,
                    charges,
                    depth + 1,
                )));
            }
        }
        cell.members = Vec::new();
        cell
    }

    pub(super) fn is_leaf(&self) -> bool {
        self.children.iter().all(Option::is_none)
    }
}

fn summarize(
    members: &[usize],
    positions: &[Vec2],
    charges: &[f32],
    bounds: CellBounds,
) -> (Vec2, f32) {
    if members.is_empty() {
        return (bounds.0.center().to_vec2(), 0.0);
    }

    let mut charge = 0.0_f32;
    let mut magnitude = 0.0_f32;
    let mut weighted = Vec2::ZERO;
    let mut centroid = Vec2::ZERO;
    for &index in members {
        let value = charges.get(index).copied().unwrap_or(0.0);
        charge += value;
        magnitude += value.abs();
        weighted += positions[index] * value.abs();
        centroid += positions[index];
    }

    let center = if magnitude > 0.0 {
        weighted / magnitude
    } else {
        centroid / members.len() as f32
    };
    (center, charge)
}

#[cfg(test)]
mod tests {
    use eframe::egui::vec2;

    use super::*;

    fn grid(count: usize) -> Vec<Vec2> {
        (0..count)
            .map(|index| vec2((index % 10) as f32 * 30.0, (index / 10) as f32 * 30.0))
            .collect()
    }

    fn leaf_members(node: &QuadNode) -> usize {
        if node.is_leaf() {
            return node.members.len();
        }
        node.children.iter().flatten().map(|child| leaf_members(child)).sum()
    }

    #[test]
    fn tree_keeps_every_point_once() {
        let positions = grid(60);
        let charges = vec![-200.0; positions.len()];
        let tree = QuadNode::build(&positions, &charges).expect("finite points");

        assert!(!tree.is_leaf(), "60 points exceed one leaf");
        assert_eq!(tree.count, 60);
        assert_eq!(leaf_members(&tree), 60);
        assert!((tree.charge + 12_000.0).abs() < 0.01);
    }

    #[test]
    fn center_of_charge_leans_toward_stronger_member() {
        let positions = vec![vec2(0.0, 0.0), vec2(100.0, 0.0)];
        let charges = vec![-800.0, -200.0];
        let tree = QuadNode::build(&positions, &charges).expect("finite points");
        assert!((tree.center_of_charge.x - 20.0).abs() < 0.01);
    }

    #[test]
    fn coincident_points_share_a_leaf() {
        let positions = vec![vec2(5.0, 5.0); 30];
        let tree = QuadNode::build(&positions, &[-1.0; 30]).expect("finite points");
        assert!(tree.is_leaf());
        assert_eq!(tree.members.len(), 30);
    }

    #[test]
    fn non_finite_or_empty_input_yields_no_tree() {
        let positions = vec![vec2(f32::NAN, 0.0), vec2(1.0, 1.0)];
        assert!(QuadNode::build(&positions, &[-1.0, -1.0]).is_none());
        assert!(QuadNode::build(&[], &[]).is_none());
    }

    #[test]
    fn cell_gap_is_zero_when_overlapping() {
        let cell = |x: f32| CellBounds(Rect::from_center_size(pos2(x, 0.0), Vec2::splat(20.0)));
        let (a, b, far) = (cell(0.0), cell(15.0), cell(50.0));

        assert_eq!(a.gap_sq(b), 0.0);
        assert!((a.gap_sq(far) - 900.0).abs() < 0.01);
        assert!(a.contains(vec2(5.0, -5.0)));
        assert!((a.side() - 20.0).abs() < f32::EPSILON);
        assert_eq!(a.quadrant_of(vec2(3.0, -3.0)), 1);
        assert!((a.quadrant(3).0.min - pos2(0.0, 0.0)).length() < f32::EPSILON);
    }
}
