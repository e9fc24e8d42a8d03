//! Rotation inference from position-only correspondences.
//!
//! When the user pins positions but not orientations, each pin's rotation
//! is estimated from where the other pins sit. Every pair (and, for the
//! triple orienter, every triple) casts a weighted rotation vote; each
//! correspondence accumulates its votes by running-weight slerp.
//!
//! Pair vote: the yaw taking the horizontal model direction a→b onto the
//! horizontal locked direction a→b, weighted `1 / |model_a - model_b|²`.
//!
//! Triple vote, vertex b:
//! ```text
//!   first  = from_to(model b→a, locked b→a)
//!   x      = locked b→a,  z = x × locked b→c,  y = z × x
//!   second = rotation about x by -atan2((first·model b→c)·z, (first·model b→c)·y)
//!   vote   = second * first
//! ```
//! weighted `(1 - |cos θ|) / max(leg)`, zero for short or collinear legs.

use serde::{Deserialize, Serialize};

use crate::anchor::{AlignmentId, FragmentId};
use crate::constants::{COLLINEAR_DOT_LIMIT, MIN_ORIENTATION_LEG};
use crate::quaternion::Quaternion;
use crate::vector::Vec3;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrienterConfig {
    /// Legs (and pair separations) shorter than this carry no direction.
    pub min_leg_length: f64,
    /// Triples whose legs have |cos| above this are treated as collinear.
    pub collinear_dot_limit: f64,
}

impl Default for OrienterConfig {
    fn default() -> Self {
        Self {
            min_leg_length: MIN_ORIENTATION_LEG,
            collinear_dot_limit: COLLINEAR_DOT_LIMIT,
        }
    }
}

impl OrienterConfig {
    /// `collinear_dot_limit` in (0, 1] and a non-negative leg length.
    pub fn is_valid(&self) -> bool {
        self.min_leg_length >= 0.0
            && self.collinear_dot_limit > 0.0
            && self.collinear_dot_limit <= 1.0
    }
}

/// A pin as seen by the orienter: where it is authored, where it belongs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Correspondence {
    pub id: AlignmentId,
    pub model_position: Vec3,
    pub locked_position: Vec3,
}

/// Source of correspondences and sink of computed rotations.
pub trait AlignmentContext {
    /// Active correspondences belonging to `fragment`.
    fn correspondences(&self, fragment: FragmentId) -> Vec<Correspondence>;
    /// Push the rotation (locked from model) computed for one correspondence.
    fn set_rotation(&mut self, id: AlignmentId, rotation: Quaternion);
}

pub trait Orienter {
    /// Recompute and push rotations for every correspondence in `fragment`.
    fn reorient(&self, fragment: FragmentId, ctx: &mut dyn AlignmentContext);
}

/// Running slerp average of weighted rotation votes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeightedRotation {
    pub rotation: Quaternion,
    pub weight: f64,
}

impl Default for WeightedRotation {
    fn default() -> Self {
        Self {
            rotation: Quaternion::identity(),
            weight: 0.0,
        }
    }
}

impl WeightedRotation {
    /// Fold in one vote. Non-positive weights are ignored.
    pub fn add(&mut self, rotation: Quaternion, weight: f64) {
        if weight <= 0.0 {
            return;
        }
        let total = self.weight + weight;
        self.rotation = self.rotation.slerp(rotation, weight / total);
        self.weight = total;
    }
}

/// Rotation about up taking horizontal `from` onto horizontal `to`.
fn yaw_between(from: Vec3, to: Vec3) -> Quaternion {
    let f = from.horizontal().normalize();
    let t = to.horizontal().normalize();
    if f == Vec3::ZERO || t == Vec3::ZERO {
        return Quaternion::identity();
    }
    let sin = f.cross(t).dot(Vec3::UP);
    let cos = f.dot(t);
    Quaternion::from_yaw(sin.atan2(cos))
}

/// Pairwise votes for every correspondence, in input order.
fn pair_votes(points: &[Correspondence], config: &OrienterConfig) -> Vec<WeightedRotation> {
    let mut votes = vec![WeightedRotation::default(); points.len()];
    let min_sq = config.min_leg_length * config.min_leg_length;

    for i in 0..points.len() {
        for j in (i + 1)..points.len() {
            let (a, b) = (&points[i], &points[j]);
            let rotation = yaw_between(
                b.model_position - a.model_position,
                b.locked_position - a.locked_position,
            );
            let dist_sq = a.model_position.distance_squared(b.model_position);
            let weight = 1.0 / dist_sq.max(min_sq);
            votes[i].add(rotation, weight);
            votes[j].add(rotation, weight);
        }
    }
    votes
}

/// Vote of the triple with vertex `b`, or `None` when it is degenerate.
fn triple_vote(
    a: &Correspondence,
    b: &Correspondence,
    c: &Correspondence,
    config: &OrienterConfig,
) -> Option<(Quaternion, f64)> {
    let locked_ba = a.locked_position - b.locked_position;
    let locked_bc = c.locked_position - b.locked_position;
    let model_ba = a.model_position - b.model_position;
    let model_bc = c.model_position - b.model_position;

    let legs = [
        locked_ba.length(),
        locked_bc.length(),
        model_ba.length(),
        model_bc.length(),
    ];
    if legs.iter().any(|l| *l < config.min_leg_length) {
        return None;
    }

    let x = locked_ba.normalize();
    let cos = x.dot(locked_bc.normalize());
    if cos.abs() > config.collinear_dot_limit {
        return None;
    }
    let z = locked_ba.cross(locked_bc).normalize();
    let y = z.cross(x);

    let first = Quaternion::from_to_rotation(model_ba, locked_ba);
    let rotated = first.rotate(model_bc);
    let angle = -rotated.dot(z).atan2(rotated.dot(y));
    let second = Quaternion::from_axis_angle(x, angle);

    let weight = (1.0 - cos.abs()) / legs[0].max(legs[1]);
    Some((second * first, weight))
}

fn push_votes(
    points: &[Correspondence],
    votes: &[WeightedRotation],
    ctx: &mut dyn AlignmentContext,
) {
    for (point, vote) in points.iter().zip(votes) {
        ctx.set_rotation(point.id, vote.rotation);
    }
}

/// Pairwise-only orienter.
#[derive(Clone, Copy, Debug, Default)]
pub struct PairOrienter {
    pub config: OrienterConfig,
}

impl PairOrienter {
    pub fn new(config: OrienterConfig) -> Self {
        Self { config }
    }

    pub fn compute(&self, points: &[Correspondence]) -> Vec<WeightedRotation> {
        pair_votes(points, &self.config)
    }
}

impl Orienter for PairOrienter {
    fn reorient(&self, fragment: FragmentId, ctx: &mut dyn AlignmentContext) {
        let points = ctx.correspondences(fragment);
        let votes = self.compute(&points);
        push_votes(&points, &votes, ctx);
    }
}

/// Pairwise votes refined by three-body votes.
///
/// With two or fewer correspondences no triple exists and the result is
/// exactly the pairwise one.
#[derive(Clone, Copy, Debug, Default)]
pub struct TripleOrienter {
    pub config: OrienterConfig,
}

impl TripleOrienter {
    pub fn new(config: OrienterConfig) -> Self {
        Self { config }
    }

    pub fn compute(&self, points: &[Correspondence]) -> Vec<WeightedRotation> {
        let mut votes = pair_votes(points, &self.config);
        if points.len() <= 2 {
            return votes;
        }

        let n = points.len();
        for i in 0..n {
            for j in (i + 1)..n {
                for k in (j + 1)..n {
                    for [a, b, c] in [[i, j, k], [j, i, k], [i, k, j]] {
                        let Some((rotation, weight)) =
                            triple_vote(&points[a], &points[b], &points[c], &self.config)
                        else {
                            continue;
                        };
                        for idx in [i, j, k] {
                            votes[idx].add(rotation, weight);
                        }
                    }
                }
            }
        }
        votes
    }
}

impl Orienter for TripleOrienter {
    fn reorient(&self, fragment: FragmentId, ctx: &mut dyn AlignmentContext) {
        let points = ctx.correspondences(fragment);
        let votes = self.compute(&points);
        push_votes(&points, &votes, ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::f64::consts::FRAC_PI_2;

    fn corr(id: u64, model: Vec3, locked: Vec3) -> Correspondence {
        Correspondence {
            id: AlignmentId(id),
            model_position: model,
            locked_position: locked,
        }
    }

    /// Map of points per fragment that records pushed rotations.
    #[derive(Default)]
    struct TestContext {
        points: BTreeMap<FragmentId, Vec<Correspondence>>,
        pushed: BTreeMap<AlignmentId, Quaternion>,
    }

    impl AlignmentContext for TestContext {
        fn correspondences(&self, fragment: FragmentId) -> Vec<Correspondence> {
            self.points.get(&fragment).cloned().unwrap_or_default()
        }

        fn set_rotation(&mut self, id: AlignmentId, rotation: Quaternion) {
            self.pushed.insert(id, rotation);
        }
    }

    fn rotated_set(yaw: f64) -> Vec<Correspondence> {
        let q = Quaternion::from_yaw(yaw);
        let model = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(0.0, 0.5, 3.0),
            Vec3::new(1.5, 1.0, 1.0),
        ];
        model
            .iter()
            .enumerate()
            .map(|(i, m)| corr(i as u64 + 1, *m, q.rotate(*m) + Vec3::new(5.0, 0.0, -1.0)))
            .collect()
    }

    #[test]
    fn test_yaw_between_quarter_turn() {
        let q = yaw_between(Vec3::RIGHT, Vec3::new(0.0, 3.0, -2.0));
        let v = q.rotate(Vec3::RIGHT);
        assert!(v.approx_eq(Vec3::new(0.0, 0.0, -1.0), 1e-9), "got {v:?}");
    }

    #[test]
    fn test_pair_recovers_rigid_yaw() {
        let points = rotated_set(0.7);
        let expected = Quaternion::from_yaw(0.7);
        for vote in PairOrienter::default().compute(&points) {
            assert!(vote.rotation.approx_eq(expected, 1e-9));
        }
    }

    #[test]
    fn test_triple_recovers_rigid_yaw() {
        let points = rotated_set(-1.2);
        let expected = Quaternion::from_yaw(-1.2);
        for vote in TripleOrienter::default().compute(&points) {
            assert!(
                vote.rotation.approx_eq(expected, 1e-6),
                "got {:?}",
                vote.rotation
            );
        }
    }

    #[test]
    fn test_two_points_triple_equals_pair() {
        let points = vec![
            corr(1, Vec3::ZERO, Vec3::ZERO),
            corr(2, Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 1.0)),
        ];
        let pair = PairOrienter::default().compute(&points);
        let triple = TripleOrienter::default().compute(&points);
        assert_eq!(pair, triple);
        assert!(
            pair[0]
                .rotation
                .approx_eq(Quaternion::from_yaw(-FRAC_PI_2), 1e-9)
        );
    }

    #[test]
    fn test_single_point_identity() {
        let points = vec![corr(1, Vec3::ZERO, Vec3::new(3.0, 0.0, 0.0))];
        let votes = TripleOrienter::default().compute(&points);
        assert_eq!(votes[0].rotation, Quaternion::identity());
        assert_eq!(votes[0].weight, 0.0);
    }

    #[test]
    fn test_collinear_triple_has_zero_weight() {
        let a = corr(1, Vec3::ZERO, Vec3::ZERO);
        let b = corr(2, Vec3::new(1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0));
        let c = corr(3, Vec3::new(2.0, 0.0, 0.05), Vec3::new(2.0, 0.0, 0.0));
        let config = OrienterConfig::default();
        assert!(triple_vote(&a, &b, &c, &config).is_none());
        assert!(triple_vote(&b, &a, &c, &config).is_none());

        let points = vec![a, b, c];
        let pair = PairOrienter::default().compute(&points);
        let triple = TripleOrienter::default().compute(&points);
        for (p, t) in pair.iter().zip(&triple) {
            assert!(p.rotation.approx_eq(t.rotation, 1e-9));
        }
    }

    #[test]
    fn test_short_leg_has_zero_weight() {
        let a = corr(1, Vec3::ZERO, Vec3::ZERO);
        let b = corr(2, Vec3::new(0.005, 0.0, 0.0), Vec3::new(0.005, 0.0, 0.0));
        let c = corr(3, Vec3::new(0.0, 0.0, 1.0), Vec3::new(0.0, 0.0, 1.0));
        assert!(triple_vote(&a, &b, &c, &OrienterConfig::default()).is_none());
    }

    #[test]
    fn test_triple_weight_formula() {
        let a = corr(1, Vec3::new(2.0, 0.0, 0.0), Vec3::new(2.0, 0.0, 0.0));
        let b = corr(2, Vec3::ZERO, Vec3::ZERO);
        let c = corr(3, Vec3::new(0.0, 0.0, 1.0), Vec3::new(0.0, 0.0, 1.0));
        let (rotation, weight) = triple_vote(&a, &b, &c, &OrienterConfig::default()).unwrap();
        assert!(rotation.approx_eq(Quaternion::identity(), 1e-9));
        assert!((weight - 0.5).abs() < 1e-12, "got {weight}");
    }

    #[test]
    fn test_coincident_model_points_get_max_weight() {
        let points = vec![
            corr(1, Vec3::ZERO, Vec3::ZERO),
            corr(2, Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0)),
        ];
        let votes = PairOrienter::default().compute(&points);
        let expected = 1.0 / (MIN_ORIENTATION_LEG * MIN_ORIENTATION_LEG);
        assert!((votes[0].weight - expected).abs() < 1e-6);
        assert!(votes[0].weight.is_finite());
    }

    #[test]
    fn test_reorient_touches_only_target_fragment() {
        let mut ctx = TestContext::default();
        ctx.points.insert(FragmentId(1), rotated_set(0.3));
        ctx.points.insert(
            FragmentId(2),
            vec![
                corr(10, Vec3::ZERO, Vec3::ZERO),
                corr(11, Vec3::RIGHT, Vec3::FORWARD),
            ],
        );

        TripleOrienter::default().reorient(FragmentId(1), &mut ctx);
        assert_eq!(ctx.pushed.len(), 4);
        assert!(!ctx.pushed.contains_key(&AlignmentId(10)));
        assert!(!ctx.pushed.contains_key(&AlignmentId(11)));
    }

    #[test]
    fn test_weighted_rotation_running_average() {
        let mut acc = WeightedRotation::default();
        acc.add(Quaternion::from_yaw(0.0), 1.0);
        acc.add(Quaternion::from_yaw(1.0), 1.0);
        assert!(acc.rotation.approx_eq(Quaternion::from_yaw(0.5), 1e-9));
        acc.add(Quaternion::from_yaw(1.0), 0.0);
        assert!(acc.rotation.approx_eq(Quaternion::from_yaw(0.5), 1e-9));
        assert_eq!(acc.weight, 2.0);
    }
}
