mod legs;
mod terrain;

pub use legs::{
    partition_legs, CheckpointReachedEvent, Leg, LegCompletedEvent, LegProgress,
    ProgressUpdate, TrackLegs, CHECKPOINTS_PER_LEG,
};
pub use terrain::{interpolate_elevation, TerrainSampler};

use crate::config::{GameConfig, RoadShapeConfig};
use crate::states::GameState;
use bevy::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::error::Error;
use std::f32::consts::{PI, TAU};
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::Path;

const TURN_RATE_EPSILON: f32 = 1.0e-5;

pub struct RoadPlugin;

impl Plugin for RoadPlugin {
    fn build(&self, app: &mut App) {
        app.add_message::<CheckpointReachedEvent>()
            .add_message::<LegCompletedEvent>()
            .add_systems(
                Update,
                generate_race_track
                    .run_if(in_state(GameState::Boot))
                    .run_if(resource_exists::<GameConfig>)
                    .run_if(not(resource_exists::<RoadPath>)),
            );
    }
}

fn generate_race_track(mut commands: Commands, config: Res<GameConfig>) {
    let legs = partition_legs(&config.legs.legs);
    let road = generate_road_path(&config.game.road, legs.total_segments())
        .unwrap_or_else(|error| panic!("failed to generate road path: {error}"));

    info!(
        "Generated road path: {} segments, {:.2} km over {} legs, {} ramps.",
        road.len(),
        road.length_m() / 1_000.0,
        legs.len(),
        road.segments().iter().filter(|segment| segment.ramp).count()
    );

    if let Some(export_path) = config.game.app.road_export_path.as_deref() {
        match export_road_path(&road, Path::new(export_path)) {
            Ok(()) => info!("Exported road path to `{export_path}`."),
            Err(error) => warn!("Road path export to `{export_path}` failed: {error}"),
        }
    }

    commands.insert_resource(road);
    commands.insert_resource(legs);
}

/// One station along the generated road.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoadSegment {
    pub index: usize,
    /// Centerline position; `y` is the road elevation.
    pub position: Vec3,
    /// Direction of travel in radians, accumulated without wrapping.
    pub heading: f32,
    /// Signed heading change across the neighbouring segments.
    pub heading_change: f32,
    /// Rise over run to the next segment.
    pub gradient: f32,
    pub ramp: bool,
    pub ramp_gradient: f32,
    pub left_ground_y: f32,
    pub right_ground_y: f32,
}

impl RoadSegment {
    pub fn is_corner(&self, threshold: f32) -> bool {
        self.heading_change.abs() >= threshold
    }

    pub fn elevation(&self) -> f32 {
        self.position.y
    }

    pub fn forward(&self) -> Vec3 {
        heading_forward(self.heading)
    }
}

#[derive(Resource, Debug, Clone)]
pub struct RoadPath {
    segments: Vec<RoadSegment>,
    segment_length: f32,
}

impl RoadPath {
    /// Builds a path from pre-computed segments, renumbering indices in order.
    pub fn from_segments(
        mut segments: Vec<RoadSegment>,
        segment_length: f32,
    ) -> Result<Self, RoadGenError> {
        if segments.len() < 2 {
            return Err(RoadGenError::TooFewSegments(segments.len()));
        }
        if !(segment_length.is_finite() && segment_length > 0.0) {
            return Err(RoadGenError::InvalidSegmentLength(segment_length));
        }
        for (index, segment) in segments.iter_mut().enumerate() {
            segment.index = index;
        }
        Ok(Self {
            segments,
            segment_length,
        })
    }

    pub fn segments(&self) -> &[RoadSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn segment_length(&self) -> f32 {
        self.segment_length
    }

    pub fn length_m(&self) -> f32 {
        (self.segments.len().saturating_sub(1)) as f32 * self.segment_length
    }

    /// Out-of-range indices resolve to the last segment.
    pub fn segment(&self, index: usize) -> &RoadSegment {
        let last = self.segments.len() - 1;
        &self.segments[index.min(last)]
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let records: Vec<RoadSegmentRecord> = self
            .segments
            .iter()
            .map(RoadSegmentRecord::from)
            .collect();
        serde_json::to_string_pretty(&RoadPathRecord {
            segment_length: self.segment_length,
            segments: records,
        })
    }
}

#[derive(Serialize)]
struct RoadPathRecord {
    segment_length: f32,
    segments: Vec<RoadSegmentRecord>,
}

#[derive(Serialize)]
struct RoadSegmentRecord {
    index: usize,
    position: [f32; 3],
    heading: f32,
    heading_change: f32,
    gradient: f32,
    ramp: bool,
    left_ground_y: f32,
    right_ground_y: f32,
}

impl From<&RoadSegment> for RoadSegmentRecord {
    fn from(segment: &RoadSegment) -> Self {
        Self {
            index: segment.index,
            position: segment.position.to_array(),
            heading: segment.heading,
            heading_change: segment.heading_change,
            gradient: segment.gradient,
            ramp: segment.ramp,
            left_ground_y: segment.left_ground_y,
            right_ground_y: segment.right_ground_y,
        }
    }
}

fn export_road_path(road: &RoadPath, path: &Path) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, road.to_json()?)?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoadGenError {
    TooFewSegments(usize),
    InvalidSegmentLength(f32),
    InvalidParameter(&'static str),
    ElevationDeltaExceeded { index: usize, delta: f32, max: f32 },
    TurnRateExceeded { index: usize, delta: f32, max: f32 },
}

impl Display for RoadGenError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooFewSegments(count) => {
                write!(f, "road path needs at least 2 segments, got {count}")
            }
            Self::InvalidSegmentLength(length) => {
                write!(f, "segment length must be finite and > 0, got {length}")
            }
            Self::InvalidParameter(name) => {
                write!(f, "road shape parameter `{name}` is out of range")
            }
            Self::ElevationDeltaExceeded { index, delta, max } => write!(
                f,
                "elevation changes by {delta:.3} between segments {index} and {} (max {max})",
                index + 1
            ),
            Self::TurnRateExceeded { index, delta, max } => write!(
                f,
                "heading changes by {delta:.4} rad between segments {index} and {} (max {max})",
                index + 1
            ),
        }
    }
}

impl Error for RoadGenError {}

/// Seeded phases for every wave in the road shape.
struct WavePhases {
    turn_a: f32,
    turn_b: f32,
    elevation_a: f32,
    elevation_b: f32,
    elevation_c: f32,
    cliff: f32,
}

impl WavePhases {
    fn from_seed(seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Self {
            turn_a: rng.gen_range(0.0..TAU),
            turn_b: rng.gen_range(0.0..TAU),
            elevation_a: rng.gen_range(0.0..TAU),
            elevation_b: rng.gen_range(0.0..TAU),
            elevation_c: rng.gen_range(0.0..TAU),
            cliff: rng.gen_range(0.0..TAU),
        }
    }
}

/// Generates `segment_count` segments for the whole track.
///
/// Headings accumulate a clamped, smoothly varying turn rate and elevation is a
/// sum of sinusoids anchored at `base_elevation`, so consecutive segments stay
/// within `max_turn_rate` and `max_elevation_delta`. The invariants are checked
/// after generation; a violation means the shape parameters are wrong.
pub fn generate_road_path(
    shape: &RoadShapeConfig,
    segment_count: usize,
) -> Result<RoadPath, RoadGenError> {
    check_shape(shape, segment_count)?;

    let phases = WavePhases::from_seed(shape.seed);
    let length = shape.segment_length;

    let mut headings = Vec::with_capacity(segment_count);
    let mut positions = Vec::with_capacity(segment_count);
    let mut heading = 0.0_f32;
    let mut cursor = Vec3::ZERO;

    for index in 0..segment_count {
        if index > 0 {
            heading += turn_rate(shape, &phases, index);
            cursor += heading_forward(heading) * length;
        }
        headings.push(heading);
        positions.push(Vec3::new(
            cursor.x,
            elevation_at(shape, &phases, index),
            cursor.z,
        ));
    }

    let mut segments = Vec::with_capacity(segment_count);
    for index in 0..segment_count {
        let previous = index.saturating_sub(1);
        let next = (index + 1).min(segment_count - 1);
        let heading_change = shortest_arc_delta(headings[previous], headings[next]);
        let gradient = if index + 1 < segment_count {
            (positions[index + 1].y - positions[index].y) / length
        } else {
            (positions[index].y - positions[index - 1].y) / length
        };

        let cliff = shape.cliff_amplitude * ((index as f32 * shape.cliff_frequency) + phases.cliff).sin();
        let road_y = positions[index].y;

        segments.push(RoadSegment {
            index,
            position: positions[index],
            heading: headings[index],
            heading_change,
            gradient,
            ramp: false,
            ramp_gradient: 0.0,
            left_ground_y: road_y - shape.verge_drop - cliff.max(0.0),
            right_ground_y: road_y - shape.verge_drop - (-cliff).max(0.0),
        });
    }

    place_ramps(shape, &mut segments);
    verify_invariants(shape, &segments)?;

    RoadPath::from_segments(segments, length)
}

fn check_shape(shape: &RoadShapeConfig, segment_count: usize) -> Result<(), RoadGenError> {
    if segment_count < 2 {
        return Err(RoadGenError::TooFewSegments(segment_count));
    }
    if !(shape.segment_length.is_finite() && shape.segment_length > 0.0) {
        return Err(RoadGenError::InvalidSegmentLength(shape.segment_length));
    }
    if !(shape.max_turn_rate.is_finite() && shape.max_turn_rate > 0.0) {
        return Err(RoadGenError::InvalidParameter("max_turn_rate"));
    }
    if !(shape.max_elevation_delta.is_finite() && shape.max_elevation_delta > 0.0) {
        return Err(RoadGenError::InvalidParameter("max_elevation_delta"));
    }
    let waves = [
        ("turn_a", shape.turn_a_amplitude, shape.turn_a_frequency),
        ("turn_b", shape.turn_b_amplitude, shape.turn_b_frequency),
        ("elevation_a", shape.elevation_a_amplitude, shape.elevation_a_frequency),
        ("elevation_b", shape.elevation_b_amplitude, shape.elevation_b_frequency),
        ("elevation_c", shape.elevation_c_amplitude, shape.elevation_c_frequency),
        ("cliff", shape.cliff_amplitude, shape.cliff_frequency),
    ];
    for (name, amplitude, frequency) in waves {
        if !(amplitude.is_finite() && frequency.is_finite()) {
            return Err(RoadGenError::InvalidParameter(name));
        }
    }
    if !shape.base_elevation.is_finite() {
        return Err(RoadGenError::InvalidParameter("base_elevation"));
    }
    Ok(())
}

fn turn_rate(shape: &RoadShapeConfig, phases: &WavePhases, index: usize) -> f32 {
    let i = index as f32;
    let raw = (shape.turn_a_amplitude * ((i * shape.turn_a_frequency) + phases.turn_a).sin())
        + (shape.turn_b_amplitude * ((i * shape.turn_b_frequency) + phases.turn_b).sin());
    let fade = if shape.lead_in_segments == 0 {
        1.0
    } else {
        smoothstep((i / shape.lead_in_segments as f32).min(1.0))
    };
    (raw * fade).clamp(-shape.max_turn_rate, shape.max_turn_rate)
}

fn elevation_at(shape: &RoadShapeConfig, phases: &WavePhases, index: usize) -> f32 {
    let i = index as f32;
    let wave = |amplitude: f32, frequency: f32, phase: f32| {
        amplitude * (((i * frequency) + phase).sin() - phase.sin())
    };
    shape.base_elevation
        + wave(
            shape.elevation_a_amplitude,
            shape.elevation_a_frequency,
            phases.elevation_a,
        )
        + wave(
            shape.elevation_b_amplitude,
            shape.elevation_b_frequency,
            phases.elevation_b,
        )
        + wave(
            shape.elevation_c_amplitude,
            shape.elevation_c_frequency,
            phases.elevation_c,
        )
}

fn place_ramps(shape: &RoadShapeConfig, segments: &mut [RoadSegment]) {
    if shape.ramp_interval == 0 || shape.ramp_gradient <= 0.0 {
        return;
    }

    let last = segments.len().saturating_sub(2);
    let mut next_ramp = shape.lead_in_segments + shape.ramp_interval;
    while next_ramp <= last {
        let Some(offset) = segments[next_ramp..=last]
            .iter()
            .position(|segment| segment.heading_change.abs() <= shape.ramp_max_heading_change)
        else {
            break;
        };
        let index = next_ramp + offset;
        segments[index].ramp = true;
        segments[index].ramp_gradient = shape.ramp_gradient;
        next_ramp = index + shape.ramp_interval;
    }
}

fn verify_invariants(shape: &RoadShapeConfig, segments: &[RoadSegment]) -> Result<(), RoadGenError> {
    for (index, pair) in segments.windows(2).enumerate() {
        let delta = (pair[1].position.y - pair[0].position.y).abs();
        if !(delta < shape.max_elevation_delta) {
            return Err(RoadGenError::ElevationDeltaExceeded {
                index,
                delta,
                max: shape.max_elevation_delta,
            });
        }

        let turn = (pair[1].heading - pair[0].heading).abs();
        if !(turn <= shape.max_turn_rate + TURN_RATE_EPSILON) {
            return Err(RoadGenError::TurnRateExceeded {
                index,
                delta: turn,
                max: shape.max_turn_rate,
            });
        }
    }
    Ok(())
}

fn smoothstep(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - (2.0 * t))
}

/// Unit direction of travel on the ground plane for `heading`.
pub fn heading_forward(heading: f32) -> Vec3 {
    Vec3::new(heading.sin(), 0.0, heading.cos())
}

/// Unit vector pointing to the right of travel; positive perpendicular offsets lie along it.
pub fn heading_right(heading: f32) -> Vec3 {
    Vec3::new(heading.cos(), 0.0, -heading.sin())
}

/// Wraps an angle into `[0, 2π)`.
pub fn wrap_angle(angle: f32) -> f32 {
    angle.rem_euclid(TAU)
}

/// Signed angle in `(-π, π]` that turns `from` onto `to` the short way round.
pub fn shortest_arc_delta(from: f32, to: f32) -> f32 {
    let delta = (to - from).rem_euclid(TAU);
    if delta > PI {
        delta - TAU
    } else {
        delta
    }
}

pub fn lerp_heading(from: f32, to: f32, progress: f32) -> f32 {
    from + (shortest_arc_delta(from, to) * progress)
}
