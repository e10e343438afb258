use super::dynamics::{BikeDynamics, BikeState, RiderControls};
use super::PlayerBike;
use crate::config::{AutopilotConfig, GameConfig};
use crate::gameplay::road::{shortest_arc_delta, RoadPath, TerrainSampler};
use bevy::prelude::*;

/// Timers for the scripted rider's wheelie routine.
#[derive(Resource, Debug, Clone, Default)]
pub struct ScriptedRiderState {
    pub wheelie_remaining: f32,
    pub wheelie_cooldown: f32,
}

pub(super) fn drive_scripted_rider(
    time: Res<Time>,
    config: Res<GameConfig>,
    road: Res<RoadPath>,
    mut controls: ResMut<RiderControls>,
    mut scripted: ResMut<ScriptedRiderState>,
    bike_query: Query<&BikeDynamics, With<PlayerBike>>,
) {
    let Ok(bike) = bike_query.single() else {
        return;
    };

    let sampler = TerrainSampler::new(&road);
    let dt = time.delta_secs().min(config.game.app.max_tick_seconds);
    *controls = plan_controls(
        bike.state(),
        &sampler,
        &config.game.autopilot,
        &mut scripted,
        dt,
    );
}

/// Steers toward the centerline of the road ahead and picks a speed for the next corner.
pub fn plan_controls(
    state: &BikeState,
    sampler: &TerrainSampler,
    autopilot: &AutopilotConfig,
    scripted: &mut ScriptedRiderState,
    dt: f32,
) -> RiderControls {
    if state.is_crashed() {
        *scripted = ScriptedRiderState {
            wheelie_cooldown: autopilot.wheelie_cooldown_seconds,
            ..default()
        };
        return RiderControls::default();
    }

    let current = state.grounded_segment;
    let lookahead = autopilot.lookahead_segments.max(1);
    let target = sampler.segment(current + lookahead);

    let heading_error = shortest_arc_delta(state.heading, target.heading);
    let offset = sampler.perpendicular_offset(state.position.x, state.position.z, current);
    let steering = ((autopilot.heading_gain * heading_error) - (autopilot.offset_gain * offset))
        .clamp(-1.0, 1.0);

    let corner_ahead = (current..=current + (lookahead * 2))
        .map(|index| sampler.segment(index))
        .any(|segment| segment.is_corner(autopilot.corner_heading_change));
    let target_speed = if corner_ahead {
        autopilot.corner_speed
    } else {
        autopilot.cruise_speed
    };

    let throttle = state.speed < target_speed;
    let brake = state.speed > target_speed + autopilot.brake_margin;

    RiderControls {
        steering,
        throttle,
        brake,
        wheelie: plan_wheelie(state, autopilot, scripted, corner_ahead, dt),
        jump: false,
        reset: false,
    }
}

fn plan_wheelie(
    state: &BikeState,
    autopilot: &AutopilotConfig,
    scripted: &mut ScriptedRiderState,
    corner_ahead: bool,
    dt: f32,
) -> bool {
    if autopilot.wheelie_seconds <= 0.0 || state.is_jumping() {
        return false;
    }

    if scripted.wheelie_remaining > 0.0 {
        scripted.wheelie_remaining -= dt;
        if corner_ahead || scripted.wheelie_remaining <= 0.0 {
            scripted.wheelie_remaining = 0.0;
            scripted.wheelie_cooldown = autopilot.wheelie_cooldown_seconds;
            return false;
        }
        return true;
    }

    scripted.wheelie_cooldown -= dt;
    if scripted.wheelie_cooldown <= 0.0 && !corner_ahead {
        scripted.wheelie_remaining = autopilot.wheelie_seconds;
        return true;
    }
    false
}
