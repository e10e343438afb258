use super::{heading_right, RoadPath, RoadSegment};
use bevy::prelude::*;

/// Read-only nearest-segment queries over a generated road.
///
/// Lookups are a linear scan in the horizontal plane. Points far from the road
/// resolve to whichever segment is closest, so queries never fail.
#[derive(Debug, Clone, Copy)]
pub struct TerrainSampler<'a> {
    road: &'a RoadPath,
}

impl<'a> TerrainSampler<'a> {
    pub fn new(road: &'a RoadPath) -> Self {
        Self { road }
    }

    pub fn road(&self) -> &'a RoadPath {
        self.road
    }

    /// Clamped to the last segment.
    pub fn segment(&self, index: usize) -> &'a RoadSegment {
        self.road.segment(index)
    }

    pub fn nearest_segment(&self, x: f32, z: f32) -> usize {
        let query = Vec2::new(x, z);
        let mut best_index = 0;
        let mut best_distance = f32::INFINITY;

        for segment in self.road.segments() {
            let distance = horizontal(segment.position).distance_squared(query);
            if distance < best_distance {
                best_distance = distance;
                best_index = segment.index;
            }
        }

        best_index
    }

    pub fn sample_elevation(&self, x: f32, z: f32) -> f32 {
        self.segment(self.nearest_segment(x, z)).elevation()
    }

    pub fn sample_heading(&self, x: f32, z: f32) -> f32 {
        self.segment(self.nearest_segment(x, z)).heading
    }

    /// Signed lateral distance from the centerline at `index`; positive is right of travel.
    pub fn perpendicular_offset(&self, x: f32, z: f32, index: usize) -> f32 {
        let segment = self.segment(index);
        let right = heading_right(segment.heading);
        ((x - segment.position.x) * right.x) + ((z - segment.position.z) * right.z)
    }

    /// The pair of consecutive segments around the point and the projection weight between them.
    pub fn bracket(&self, x: f32, z: f32) -> (usize, usize, f32) {
        let nearest = self.nearest_segment(x, z);
        let last = self.road.len() - 1;
        let query = Vec2::new(x, z);

        let ahead = (nearest < last)
            .then(|| projection_weight(self.segment(nearest), self.segment(nearest + 1), query))
            .filter(|weight| *weight > 0.0);
        if let Some(weight) = ahead {
            return (nearest, nearest + 1, weight.min(1.0));
        }

        if nearest > 0 {
            let weight = projection_weight(self.segment(nearest - 1), self.segment(nearest), query);
            return (nearest - 1, nearest, weight.clamp(0.0, 1.0));
        }

        (nearest, (nearest + 1).min(last), 0.0)
    }

    /// Road elevation blended between the bracketing segments.
    pub fn interpolated_elevation(&self, x: f32, z: f32) -> f32 {
        let (from, to, weight) = self.bracket(x, z);
        interpolate_elevation(
            self.segment(from).elevation(),
            self.segment(to).elevation(),
            weight,
        )
    }

    pub fn gradient_at(&self, index: usize) -> f32 {
        self.segment(index).gradient
    }

    /// Ground height beside the road on the side the offset points to.
    pub fn side_ground_elevation(&self, index: usize, perpendicular_offset: f32) -> f32 {
        let segment = self.segment(index);
        if perpendicular_offset >= 0.0 {
            segment.right_ground_y
        } else {
            segment.left_ground_y
        }
    }
}

pub fn interpolate_elevation(from: f32, to: f32, weight: f32) -> f32 {
    from + ((to - from) * weight)
}

fn projection_weight(from: &RoadSegment, to: &RoadSegment, query: Vec2) -> f32 {
    let start = horizontal(from.position);
    let span = horizontal(to.position) - start;
    let span_length_squared = span.length_squared();
    if span_length_squared <= f32::EPSILON {
        return 0.0;
    }
    (query - start).dot(span) / span_length_squared
}

fn horizontal(position: Vec3) -> Vec2 {
    Vec2::new(position.x, position.z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gameplay::road::test_support::{road_from_elevations, straight_road};

    #[test]
    fn interpolates_halfway_between_bracketing_segments() {
        assert_eq!(interpolate_elevation(25.0, 30.0, 0.5), 27.5);

        let road = road_from_elevations(&[25.0, 30.0, 30.0]);
        let sampler = TerrainSampler::new(&road);
        assert!((sampler.interpolated_elevation(0.0, 5.0) - 27.5).abs() < 1.0e-5);
    }

    #[test]
    fn nearest_segment_uses_horizontal_distance() {
        let road = road_from_elevations(&[0.0, 500.0, 0.0, 0.0]);
        let sampler = TerrainSampler::new(&road);

        assert_eq!(sampler.nearest_segment(0.0, 11.0), 1);
        assert_eq!(sampler.sample_elevation(0.5, 9.0), 500.0);
        assert_eq!(sampler.sample_heading(0.0, 11.0), 0.0);
    }

    #[test]
    fn far_away_queries_fall_back_to_the_closest_end() {
        let road = road_from_elevations(&[10.0, 11.0, 12.0]);
        let sampler = TerrainSampler::new(&road);

        assert_eq!(sampler.nearest_segment(0.0, 10_000.0), 2);
        assert_eq!(sampler.sample_elevation(0.0, -10_000.0), 10.0);
        assert_eq!(sampler.interpolated_elevation(0.0, 10_000.0), 12.0);
        assert_eq!(sampler.segment(99).index, 2);
    }

    #[test]
    fn perpendicular_offset_is_positive_to_the_right_of_travel() {
        let road = straight_road(4, 0.0);
        let sampler = TerrainSampler::new(&road);

        // Heading 0 travels +Z, so the right-hand side is +X.
        assert!((sampler.perpendicular_offset(12.0, 10.0, 1) - 12.0).abs() < 1.0e-5);
        assert!((sampler.perpendicular_offset(-3.0, 10.0, 1) + 3.0).abs() < 1.0e-5);
    }

    #[test]
    fn bracket_picks_the_segment_behind_when_past_the_nearest() {
        let road = road_from_elevations(&[0.0, 10.0, 20.0, 30.0]);
        let sampler = TerrainSampler::new(&road);

        let (from, to, weight) = sampler.bracket(0.0, 17.0);
        assert_eq!((from, to), (1, 2));
        assert!((weight - 0.7).abs() < 1.0e-5);

        let (from, to, weight) = sampler.bracket(0.0, 21.0);
        assert_eq!((from, to), (2, 3));
        assert!((weight - 0.1).abs() < 1.0e-5);
    }

    #[test]
    fn side_ground_follows_the_offset_sign() {
        let mut segment = crate::gameplay::road::test_support::flat_segment(0, Vec3::new(0.0, 20.0, 0.0));
        segment.left_ground_y = -5.0;
        segment.right_ground_y = 19.6;
        let mut next = segment;
        next.position.z = 10.0;
        let road = RoadPath::from_segments(vec![segment, next], 10.0).expect("valid road");
        let sampler = TerrainSampler::new(&road);

        assert_eq!(sampler.side_ground_elevation(0, 9.0), 19.6);
        assert_eq!(sampler.side_ground_elevation(0, -9.0), -5.0);
        assert_eq!(sampler.gradient_at(0), 0.0);
    }
}
