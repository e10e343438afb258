use crate::config::{GameConfig, ScoringConfig};
use crate::gameplay::bike::{BikeEvent, BikeTelemetry};
use crate::gameplay::road::{CheckpointReachedEvent, LegCompletedEvent, RoadPath};
use bevy::app::AppExit;
use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;
use serde::Serialize;
use std::error::Error;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(States, Debug, Clone, Copy, Eq, PartialEq, Hash, Default)]
pub enum GameState {
    #[default]
    Boot,
    InRace,
    Results,
}

pub struct GameStatePlugin;

impl Plugin for GameStatePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<RunSummary>()
            .add_systems(OnEnter(GameState::Boot), enter_boot)
            .add_systems(
                Update,
                boot_to_race
                    .run_if(in_state(GameState::Boot))
                    .run_if(resource_exists::<RoadPath>),
            )
            .add_systems(
                OnEnter(GameState::InRace),
                (configure_race_clock, enter_race),
            )
            .add_systems(
                Update,
                (
                    apply_bike_score_events,
                    apply_progress_score_events,
                    update_run_summary_progress,
                    end_race_on_time_limit,
                )
                    .chain()
                    .run_if(in_state(GameState::InRace))
                    .run_if(resource_exists::<GameConfig>),
            )
            .add_systems(OnEnter(GameState::Results), enter_results);
    }
}

#[derive(Resource, Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub score: u32,
    pub wheelie_score: u32,
    pub jump_score: u32,
    pub checkpoint_score: u32,
    pub leg_score: u32,
    pub wheelie_count: u32,
    pub jump_count: u32,
    pub full_rotations: u32,
    pub hard_landings: u32,
    pub crash_count: u32,
    pub checkpoints_reached: u32,
    pub legs_completed: u32,
    pub distance_m: f32,
    pub top_speed_mps: f32,
    pub race_seconds: f32,
    pub finished: bool,
    pub timed_out: bool,
}

impl RunSummary {
    fn total(&self) -> u32 {
        self.wheelie_score
            .saturating_add(self.jump_score)
            .saturating_add(self.checkpoint_score)
            .saturating_add(self.leg_score)
    }
}

/// Points a single bike event is worth under `scoring`.
pub fn score_for_event(event: &BikeEvent, scoring: &ScoringConfig) -> u32 {
    match *event {
        BikeEvent::WheelieScored { points, .. } => points,
        BikeEvent::JumpLanded {
            full_rotations,
            quality,
            ..
        } => {
            // A landing that ends in a crash scores nothing.
            if !quality.good_angle {
                return 0;
            }
            let mut points = scoring
                .jump_base_points
                .saturating_add(full_rotations.saturating_mul(scoring.points_per_rotation))
                .saturating_add(scoring.good_angle_bonus);
            if !quality.hard {
                points = points.saturating_add(scoring.safe_landing_bonus);
            }
            points
        }
        BikeEvent::JumpLaunched { .. } | BikeEvent::Crashed { .. } | BikeEvent::HitGround => 0,
    }
}

fn enter_boot() {
    info!("Entered state: Boot");
}

fn boot_to_race(mut next_state: ResMut<NextState<GameState>>) {
    next_state.set(GameState::InRace);
}

fn configure_race_clock(mut commands: Commands, config: Res<GameConfig>) {
    let app = &config.game.app;
    if !app.fast_forward {
        return;
    }

    let step = Duration::from_secs_f32(1.0 / app.fixed_timestep_hz);
    commands.insert_resource(TimeUpdateStrategy::ManualDuration(step));
    info!(
        "Fast-forward enabled: stepping {:.4}s per frame.",
        step.as_secs_f32()
    );
}

fn enter_race(mut run_summary: ResMut<RunSummary>) {
    *run_summary = RunSummary::default();
    info!("Entered state: InRace");
}

fn apply_bike_score_events(
    config: Res<GameConfig>,
    mut bike_events: MessageReader<BikeEvent>,
    mut run_summary: ResMut<RunSummary>,
) {
    let scoring = &config.game.scoring;
    for event in bike_events.read() {
        let points = score_for_event(event, scoring);
        match event {
            BikeEvent::WheelieScored { .. } => {
                run_summary.wheelie_count = run_summary.wheelie_count.saturating_add(1);
                run_summary.wheelie_score = run_summary.wheelie_score.saturating_add(points);
            }
            BikeEvent::JumpLanded {
                full_rotations,
                quality,
                ..
            } => {
                run_summary.jump_count = run_summary.jump_count.saturating_add(1);
                run_summary.full_rotations =
                    run_summary.full_rotations.saturating_add(*full_rotations);
                if quality.hard {
                    run_summary.hard_landings = run_summary.hard_landings.saturating_add(1);
                }
                run_summary.jump_score = run_summary.jump_score.saturating_add(points);
            }
            BikeEvent::Crashed { .. } => {
                run_summary.crash_count = run_summary.crash_count.saturating_add(1);
            }
            BikeEvent::JumpLaunched { .. } | BikeEvent::HitGround => {}
        }
    }
    run_summary.score = run_summary.total();
}

fn apply_progress_score_events(
    config: Res<GameConfig>,
    mut checkpoint_events: MessageReader<CheckpointReachedEvent>,
    mut leg_events: MessageReader<LegCompletedEvent>,
    mut run_summary: ResMut<RunSummary>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    let scoring = &config.game.scoring;
    for _ in checkpoint_events.read() {
        run_summary.checkpoints_reached = run_summary.checkpoints_reached.saturating_add(1);
        run_summary.checkpoint_score = run_summary
            .checkpoint_score
            .saturating_add(scoring.checkpoint_points);
    }

    for event in leg_events.read() {
        run_summary.legs_completed = run_summary.legs_completed.saturating_add(1);
        run_summary.leg_score = run_summary
            .leg_score
            .saturating_add(scoring.leg_completion_points);
        if event.final_leg {
            run_summary.finished = true;
            next_state.set(GameState::Results);
        }
    }
    run_summary.score = run_summary.total();
}

fn update_run_summary_progress(
    time: Res<Time>,
    config: Res<GameConfig>,
    telemetry: Res<BikeTelemetry>,
    mut run_summary: ResMut<RunSummary>,
) {
    run_summary.race_seconds += time.delta_secs().min(config.game.app.max_tick_seconds);
    run_summary.distance_m = telemetry.distance_m.max(0.0);
    run_summary.top_speed_mps = telemetry.top_speed_mps;
}

fn end_race_on_time_limit(
    config: Res<GameConfig>,
    mut run_summary: ResMut<RunSummary>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    if run_summary.finished || run_summary.timed_out {
        return;
    }
    if run_summary.race_seconds < config.game.app.max_race_seconds {
        return;
    }

    warn!(
        "Race time limit of {:.0}s reached after {} legs; ending the run.",
        config.game.app.max_race_seconds, run_summary.legs_completed
    );
    run_summary.timed_out = true;
    next_state.set(GameState::Results);
}

fn enter_results(
    config: Option<Res<GameConfig>>,
    run_summary: Res<RunSummary>,
    mut exit: MessageWriter<AppExit>,
) {
    let title = if run_summary.finished {
        "RESULTS"
    } else {
        "RESULTS (time limit)"
    };
    info!(
        "{title}\n\
Score: {score}\n\
Distance: {distance:.1} m in {seconds:.1}s (top speed {top_speed:.1} m/s)\n\
Legs: {legs} (+{leg_score}) | Checkpoints: {checkpoints} (+{checkpoint_score})\n\
Jumps: {jumps} (+{jump_score}, {rotations} rotations, {hard} hard landings)\n\
Wheelies: {wheelies} (+{wheelie_score}) | Crashes: {crashes}",
        score = run_summary.score,
        distance = run_summary.distance_m,
        seconds = run_summary.race_seconds,
        top_speed = run_summary.top_speed_mps,
        legs = run_summary.legs_completed,
        leg_score = run_summary.leg_score,
        checkpoints = run_summary.checkpoints_reached,
        checkpoint_score = run_summary.checkpoint_score,
        jumps = run_summary.jump_count,
        jump_score = run_summary.jump_score,
        rotations = run_summary.full_rotations,
        hard = run_summary.hard_landings,
        wheelies = run_summary.wheelie_count,
        wheelie_score = run_summary.wheelie_score,
        crashes = run_summary.crash_count,
    );

    let export_path = config
        .as_ref()
        .and_then(|config| config.game.app.results_export_path.clone());
    if let Some(export_path) = export_path {
        match export_run_summary(&run_summary, Path::new(&export_path)) {
            Ok(()) => info!("Exported run summary to `{export_path}`."),
            Err(error) => warn!("Run summary export to `{export_path}` failed: {error}"),
        }
    }

    exit.write(AppExit::Success);
}

fn export_run_summary(run_summary: &RunSummary, path: &Path) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, serde_json::to_string_pretty(run_summary)?)?;
    Ok(())
}
