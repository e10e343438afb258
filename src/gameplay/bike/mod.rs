mod autopilot;
mod boundary;
mod dynamics;

pub use autopilot::{plan_controls, ScriptedRiderState};
pub use boundary::{Obstacle, Surface, TrackBoundaryPolicy, TrackClassification};
pub use dynamics::{
    BikeDynamics, BikeEvent, BikeState, CrashCause, CrashState, JumpState, LandingQuality,
    MotionMode, RiderControls, StartPose, SurfaceConditions, WheelieState,
};

use crate::config::GameConfig;
use crate::gameplay::road::{
    wrap_angle, CheckpointReachedEvent, Leg, LegCompletedEvent, LegProgress, RoadPath,
    TerrainSampler, TrackLegs,
};
use crate::states::GameState;
use bevy::prelude::*;

pub struct BikeGameplayPlugin;

impl Plugin for BikeGameplayPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<RiderControls>()
            .init_resource::<ScriptedRiderState>()
            .init_resource::<BikeTelemetry>()
            .add_message::<BikeEvent>()
            .add_systems(OnEnter(GameState::InRace), spawn_player_bike)
            .add_systems(OnExit(GameState::InRace), cleanup_player_bike)
            .add_systems(
                Update,
                (
                    autopilot::drive_scripted_rider,
                    tick_player_bike,
                    recover_crashed_bike,
                    forward_bike_events,
                    track_leg_progress,
                    update_bike_telemetry,
                )
                    .chain()
                    .run_if(in_state(GameState::InRace))
                    .run_if(resource_exists::<GameConfig>)
                    .run_if(resource_exists::<RoadPath>)
                    .run_if(resource_exists::<TrackLegs>),
            );
    }
}

#[derive(Component)]
pub struct PlayerBike;

/// Read-only snapshot of the player bike, refreshed after every tick.
#[derive(Resource, Debug, Clone)]
pub struct BikeTelemetry {
    pub position: Vec3,
    pub speed_mps: f32,
    pub top_speed_mps: f32,
    pub lean_angle: f32,
    /// Wrapped into `[0, 2π)`.
    pub heading: f32,
    pub wheelie_angle: f32,
    pub distance_m: f32,
    /// Last odometer reading from the bike, which restarts on respawn.
    pub odometer_m: f32,
    pub mode: &'static str,
    pub on_road: bool,
    pub leg_index: usize,
    pub checkpoints_passed: usize,
}

impl Default for BikeTelemetry {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            speed_mps: 0.0,
            top_speed_mps: 0.0,
            lean_angle: 0.0,
            heading: 0.0,
            wheelie_angle: 0.0,
            distance_m: 0.0,
            odometer_m: 0.0,
            mode: "normal",
            on_road: true,
            leg_index: 0,
            checkpoints_passed: 0,
        }
    }
}

fn conditions_for_leg(config: &GameConfig, leg: &Leg) -> SurfaceConditions {
    config
        .weather_by_id
        .get(&leg.weather)
        .map(|weather| SurfaceConditions {
            traction: weather.traction,
            drag: weather.drag,
        })
        .unwrap_or_default()
}

fn spawn_player_bike(
    mut commands: Commands,
    config: Res<GameConfig>,
    road: Res<RoadPath>,
    legs: Res<TrackLegs>,
    mut telemetry: ResMut<BikeTelemetry>,
    mut scripted: ResMut<ScriptedRiderState>,
    existing_player: Query<Entity, With<PlayerBike>>,
) {
    if !existing_player.is_empty() {
        return;
    }
    let Some(bike_config) = config.default_bike() else {
        error!(
            "Default bike `{}` is missing; cannot start the race.",
            config.game.app.default_bike
        );
        return;
    };
    let Some(first_leg) = legs.get(0) else {
        error!("Track has no legs; cannot start the race.");
        return;
    };

    let sampler = TerrainSampler::new(&road);
    let mut bike = BikeDynamics::new(bike_config.clone(), StartPose::default());
    bike.begin_at_segment(&sampler, first_leg.start_segment);
    bike.set_conditions(conditions_for_leg(&config, first_leg));

    let mut progress = LegProgress::default();
    progress.start_leg(0);

    let mut policy = TrackBoundaryPolicy::from_config(&config.game.track);
    let obstacle_count: usize = legs
        .legs()
        .iter()
        .filter_map(|leg| {
            let leg_config = config.legs_by_id.get(&leg.id)?;
            Some(policy.add_leg_obstacles(leg, &leg_config.obstacles, &sampler))
        })
        .sum();
    commands.insert_resource(policy);
    *telemetry = BikeTelemetry::default();
    *scripted = ScriptedRiderState::default();

    commands.spawn((Name::new("PlayerBike"), PlayerBike, bike, progress));

    info!(
        "Spawned `{}` at segment {} for leg `{}` ({}, {}, {}).",
        bike_config.id,
        first_leg.start_segment,
        first_leg.name,
        first_leg.difficulty,
        first_leg.time_of_day,
        first_leg.weather
    );
    if obstacle_count > 0 {
        info!("Placed {obstacle_count} roadside obstacles.");
    }
}

fn cleanup_player_bike(mut commands: Commands, player_query: Query<Entity, With<PlayerBike>>) {
    for entity in &player_query {
        commands.entity(entity).despawn();
    }
    commands.remove_resource::<TrackBoundaryPolicy>();
}

fn tick_player_bike(
    time: Res<Time>,
    config: Res<GameConfig>,
    road: Res<RoadPath>,
    controls: Res<RiderControls>,
    policy: Option<Res<TrackBoundaryPolicy>>,
    mut player_query: Query<(&mut BikeDynamics, &mut LegProgress), With<PlayerBike>>,
) {
    let Some(policy) = policy else {
        return;
    };
    let Ok((mut bike, mut progress)) = player_query.single_mut() else {
        return;
    };

    // Stalled frames must not tunnel through terrain.
    let dt = time.delta_secs().min(config.game.app.max_tick_seconds);
    let sampler = TerrainSampler::new(&road);
    bike.update(dt, *controls, &sampler, &policy);
    progress.leg_elapsed_seconds += dt;
}

fn recover_crashed_bike(
    config: Res<GameConfig>,
    road: Res<RoadPath>,
    legs: Res<TrackLegs>,
    mut player_query: Query<(&mut BikeDynamics, &LegProgress), With<PlayerBike>>,
) {
    let Ok((mut bike, progress)) = player_query.single_mut() else {
        return;
    };
    let Some(crashed_for) = bike.state().settled_crash_seconds() else {
        return;
    };
    if crashed_for < config.game.app.crash_recover_seconds {
        return;
    }
    let Some(leg) = legs.get(progress.leg_index) else {
        return;
    };

    let respawn_segment = progress.respawn_segment(leg);
    let sampler = TerrainSampler::new(&road);
    bike.begin_at_segment(&sampler, respawn_segment);
    info!("Bike recovered at segment {respawn_segment} on leg `{}`.", leg.name);
}

fn forward_bike_events(
    mut bike_events: MessageWriter<BikeEvent>,
    mut player_query: Query<&mut BikeDynamics, With<PlayerBike>>,
) {
    let Ok(mut bike) = player_query.single_mut() else {
        return;
    };

    for event in bike.drain_events() {
        match event {
            BikeEvent::Crashed { cause, crash_angle } => {
                info!("Bike crashed ({cause:?}) at lean {crash_angle:.2} rad.");
            }
            BikeEvent::HitGround => info!("Bike hit the ground below the cliff."),
            _ => debug!("Bike event: {event:?}"),
        }
        bike_events.write(event);
    }
}

fn track_leg_progress(
    config: Res<GameConfig>,
    road: Res<RoadPath>,
    legs: Res<TrackLegs>,
    mut checkpoint_events: MessageWriter<CheckpointReachedEvent>,
    mut leg_events: MessageWriter<LegCompletedEvent>,
    mut player_query: Query<(&mut BikeDynamics, &mut LegProgress), With<PlayerBike>>,
) {
    let Ok((mut bike, mut progress)) = player_query.single_mut() else {
        return;
    };
    if bike.state().is_crashed() || bike.state().is_jumping() {
        return;
    }
    let Some(leg) = legs.get(progress.leg_index) else {
        return;
    };

    let segment = bike.state().grounded_segment;
    let before = progress.checkpoints_passed;
    let update = progress.advance(leg, segment);
    let checkpoints = leg.checkpoints();
    for checkpoint in (before + 1)..=(before + update.checkpoints) {
        checkpoint_events.write(CheckpointReachedEvent {
            leg_index: progress.leg_index,
            checkpoint,
            segment: checkpoints[checkpoint - 1],
        });
    }

    if !update.leg_completed {
        return;
    }

    let next_index = progress.leg_index + 1;
    let final_leg = next_index >= legs.len();
    info!(
        "Completed leg `{}` in {:.1}s.",
        leg.name, progress.leg_elapsed_seconds
    );
    leg_events.write(LegCompletedEvent {
        leg_index: progress.leg_index,
        elapsed_seconds: progress.leg_elapsed_seconds,
        final_leg,
    });

    let Some(next_leg) = legs.get(next_index) else {
        return;
    };
    let sampler = TerrainSampler::new(&road);
    bike.begin_at_segment(&sampler, next_leg.start_segment);
    bike.set_conditions(conditions_for_leg(&config, next_leg));
    progress.start_leg(next_index);
    info!(
        "Starting leg `{}` ({}, {}, {}).",
        next_leg.name, next_leg.difficulty, next_leg.time_of_day, next_leg.weather
    );
}

fn update_bike_telemetry(
    mut telemetry: ResMut<BikeTelemetry>,
    player_query: Query<(&BikeDynamics, &LegProgress), With<PlayerBike>>,
) {
    let Ok((bike, progress)) = player_query.single() else {
        return;
    };
    let state = bike.state();

    telemetry.position = state.position;
    telemetry.speed_mps = state.speed;
    telemetry.top_speed_mps = telemetry.top_speed_mps.max(state.speed);
    telemetry.lean_angle = state.lean_angle;
    telemetry.heading = wrap_angle(state.heading);
    telemetry.wheelie_angle = state.wheelie_angle;
    let odometer = state.distance_traveled;
    telemetry.distance_m += if odometer >= telemetry.odometer_m {
        odometer - telemetry.odometer_m
    } else {
        odometer
    };
    telemetry.odometer_m = odometer;
    telemetry.mode = state.mode.label();
    telemetry.on_road = bike
        .last_classification()
        .is_none_or(|classification| classification.on_road);
    telemetry.leg_index = progress.leg_index;
    telemetry.checkpoints_passed = progress.checkpoints_passed;
}
