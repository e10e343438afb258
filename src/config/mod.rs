use bevy::prelude::*;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_DIR: &str = "config";
pub const MIN_LEG_SEGMENTS: usize = 20;

pub struct ConfigPlugin;

impl Plugin for ConfigPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, load_game_config);
    }
}

fn load_game_config(mut commands: Commands) {
    let config = GameConfig::load_from_dir(Path::new(CONFIG_DIR)).unwrap_or_else(|error| {
        panic!("failed to load configuration from `{CONFIG_DIR}`: {error}");
    });

    log_config_summary("Loaded", &config);

    commands.insert_resource(config);
}

fn log_config_summary(prefix: &str, config: &GameConfig) {
    info!(
        "{prefix} config: {} legs ({} segments), {} bikes, {} weather presets.",
        config.legs.legs.len(),
        config.total_segments(),
        config.bikes_by_id.len(),
        config.weather_by_id.len()
    );
}

#[derive(Resource, Debug, Clone)]
pub struct GameConfig {
    pub game: GameFile,
    pub bikes: BikesFile,
    pub legs: LegsFile,
    pub weather: WeatherFile,
    pub bikes_by_id: HashMap<String, BikeConfig>,
    pub legs_by_id: HashMap<String, LegConfig>,
    pub weather_by_id: HashMap<String, WeatherConfig>,
}

impl GameConfig {
    pub fn load_from_dir(config_dir: &Path) -> Result<Self, ConfigError> {
        let game: GameFile = read_toml(&config_dir.join("game.toml"))?;
        let bikes: BikesFile = read_toml(&config_dir.join("bikes.toml"))?;
        let legs: LegsFile = read_toml(&config_dir.join("legs.toml"))?;
        let weather: WeatherFile = read_toml(&config_dir.join("weather.toml"))?;

        let config = Self {
            bikes_by_id: to_index("bikes.toml::bikes", &bikes.bikes)?,
            legs_by_id: to_index("legs.toml::legs", &legs.legs)?,
            weather_by_id: to_index("weather.toml::weather", &weather.weather)?,
            game,
            bikes,
            legs,
            weather,
        };

        config.validate_references()?;
        Ok(config)
    }

    pub fn total_segments(&self) -> usize {
        self.legs.legs.iter().map(|leg| leg.segments).sum()
    }

    pub fn default_bike(&self) -> Option<&BikeConfig> {
        self.bikes_by_id.get(&self.game.app.default_bike)
    }

    fn validate_references(&self) -> Result<(), ConfigError> {
        if !self.bikes_by_id.contains_key(&self.game.app.default_bike) {
            return Err(ConfigError::Validation(format!(
                "game.toml::app.default_bike references unknown bike id `{}`",
                self.game.app.default_bike
            )));
        }

        let app = &self.game.app;
        if app.fixed_timestep_hz <= 0.0 {
            return Err(ConfigError::Validation(
                "game.toml::app.fixed_timestep_hz must be > 0".to_string(),
            ));
        }
        if app.max_tick_seconds <= 0.0 {
            return Err(ConfigError::Validation(
                "game.toml::app.max_tick_seconds must be > 0".to_string(),
            ));
        }
        if app.crash_recover_seconds < 0.0 {
            return Err(ConfigError::Validation(
                "game.toml::app.crash_recover_seconds must be >= 0".to_string(),
            ));
        }
        if app.max_race_seconds <= 0.0 {
            return Err(ConfigError::Validation(
                "game.toml::app.max_race_seconds must be > 0".to_string(),
            ));
        }

        self.validate_road()?;
        self.validate_track()?;

        if self.legs.legs.is_empty() {
            return Err(ConfigError::Validation(
                "legs.toml::legs must contain at least one leg".to_string(),
            ));
        }

        for (index, leg) in self.legs.legs.iter().enumerate() {
            if !self.weather_by_id.contains_key(&leg.weather) {
                return Err(ConfigError::Validation(format!(
                    "legs.toml::legs[{index}].weather references unknown weather id `{}`",
                    leg.weather
                )));
            }
            if leg.segments < MIN_LEG_SEGMENTS {
                return Err(ConfigError::Validation(format!(
                    "legs.toml::legs[{index}].segments must be >= {MIN_LEG_SEGMENTS}"
                )));
            }
            if !matches!(
                leg.difficulty.as_str(),
                "easy" | "medium" | "hard" | "expert"
            ) {
                return Err(ConfigError::Validation(format!(
                    "legs.toml::legs[{index}].difficulty `{}` is unsupported (expected easy/medium/hard/expert)",
                    leg.difficulty
                )));
            }
            if !matches!(
                leg.time_of_day.as_str(),
                "dawn" | "day" | "dusk" | "night"
            ) {
                return Err(ConfigError::Validation(format!(
                    "legs.toml::legs[{index}].time_of_day `{}` is unsupported (expected dawn/day/dusk/night)",
                    leg.time_of_day
                )));
            }
            for (obstacle_index, obstacle) in leg.obstacles.iter().enumerate() {
                if obstacle.segment >= leg.segments {
                    return Err(ConfigError::Validation(format!(
                        "legs.toml::legs[{index}].obstacles[{obstacle_index}].segment must be < {}",
                        leg.segments
                    )));
                }
                if !(obstacle.radius > 0.0 && obstacle.offset.is_finite()) {
                    return Err(ConfigError::Validation(format!(
                        "legs.toml::legs[{index}].obstacles[{obstacle_index}] needs radius > 0 and a finite offset"
                    )));
                }
            }
        }

        for (index, weather) in self.weather.weather.iter().enumerate() {
            if weather.traction <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "weather.toml::weather[{index}].traction must be > 0"
                )));
            }
            if weather.drag < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "weather.toml::weather[{index}].drag must be >= 0"
                )));
            }
        }

        for (index, bike) in self.bikes.bikes.iter().enumerate() {
            validate_bike(index, bike)?;
        }

        Ok(())
    }

    fn validate_road(&self) -> Result<(), ConfigError> {
        let road = &self.game.road;
        if road.segment_length <= 0.0 {
            return Err(ConfigError::Validation(
                "game.toml::road.segment_length must be > 0".to_string(),
            ));
        }
        if road.max_turn_rate <= 0.0 {
            return Err(ConfigError::Validation(
                "game.toml::road.max_turn_rate must be > 0".to_string(),
            ));
        }
        if road.max_elevation_delta <= 0.0 {
            return Err(ConfigError::Validation(
                "game.toml::road.max_elevation_delta must be > 0".to_string(),
            ));
        }
        let frequencies = [
            road.turn_a_frequency,
            road.turn_b_frequency,
            road.elevation_a_frequency,
            road.elevation_b_frequency,
            road.elevation_c_frequency,
            road.cliff_frequency,
        ];
        if frequencies.iter().any(|frequency| *frequency < 0.0) {
            return Err(ConfigError::Validation(
                "game.toml::road wave frequencies must be >= 0".to_string(),
            ));
        }

        // A sinusoid of amplitude A and frequency f moves at most A*f per segment.
        let worst_case_delta = road.elevation_delta_bound();
        if worst_case_delta >= road.max_elevation_delta {
            return Err(ConfigError::Validation(format!(
                "game.toml::road elevation waves can climb {worst_case_delta:.3} per segment, which is not below max_elevation_delta {}",
                road.max_elevation_delta
            )));
        }

        if road.ramp_gradient < 0.0 {
            return Err(ConfigError::Validation(
                "game.toml::road.ramp_gradient must be >= 0".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_track(&self) -> Result<(), ConfigError> {
        let track = &self.game.track;
        if track.road_half_width <= 0.0 {
            return Err(ConfigError::Validation(
                "game.toml::track.road_half_width must be > 0".to_string(),
            ));
        }
        if track.off_road_tolerance < 0.0 {
            return Err(ConfigError::Validation(
                "game.toml::track.off_road_tolerance must be >= 0".to_string(),
            ));
        }
        if track.cliff_drop_threshold <= 0.0 {
            return Err(ConfigError::Validation(
                "game.toml::track.cliff_drop_threshold must be > 0".to_string(),
            ));
        }
        if track.grass_drag < 0.0 {
            return Err(ConfigError::Validation(
                "game.toml::track.grass_drag must be >= 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn validate_bike(index: usize, bike: &BikeConfig) -> Result<(), ConfigError> {
    // A crash stops the bike dead, so the speed range has to include zero.
    if bike.min_speed != 0.0 {
        return Err(ConfigError::Validation(format!(
            "bikes.toml::bikes[{index}].min_speed must be 0"
        )));
    }
    if bike.max_speed <= bike.min_speed {
        return Err(ConfigError::Validation(format!(
            "bikes.toml::bikes[{index}] speed range is invalid (max_speed must be > min_speed)"
        )));
    }
    if !(bike.min_speed..=bike.max_speed).contains(&bike.default_speed) {
        return Err(ConfigError::Validation(format!(
            "bikes.toml::bikes[{index}].default_speed must be within [min_speed, max_speed]"
        )));
    }
    if bike.acceleration <= 0.0 || bike.brake_force <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "bikes.toml::bikes[{index}] acceleration and brake_force must be > 0"
        )));
    }
    if bike.gravity <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "bikes.toml::bikes[{index}].gravity must be > 0"
        )));
    }
    if bike.turn_radius <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "bikes.toml::bikes[{index}].turn_radius must be > 0"
        )));
    }
    if !(0.0 < bike.max_lean_angle_degrees && bike.max_lean_angle_degrees < 90.0) {
        return Err(ConfigError::Validation(format!(
            "bikes.toml::bikes[{index}].max_lean_angle_degrees must be in (0, 90)"
        )));
    }
    if bike.max_steer_angle_degrees <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "bikes.toml::bikes[{index}].max_steer_angle_degrees must be > 0"
        )));
    }
    if !(0.0 < bike.elevation_follow_blend && bike.elevation_follow_blend <= 1.0) {
        return Err(ConfigError::Validation(format!(
            "bikes.toml::bikes[{index}].elevation_follow_blend must be in (0, 1]"
        )));
    }
    if bike.max_wheelie_angle_degrees <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "bikes.toml::bikes[{index}].max_wheelie_angle_degrees must be > 0"
        )));
    }
    if bike.wheelie_reference_speed <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "bikes.toml::bikes[{index}].wheelie_reference_speed must be > 0"
        )));
    }
    if bike.wheelie_points_per_second < 0.0 || bike.wheelie_duration_cap_seconds <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "bikes.toml::bikes[{index}] wheelie scoring requires points_per_second >= 0 and duration_cap_seconds > 0"
        )));
    }
    if !(0.0..=1.0).contains(&bike.hard_landing_speed_factor) {
        return Err(ConfigError::Validation(format!(
            "bikes.toml::bikes[{index}].hard_landing_speed_factor must be in [0, 1]"
        )));
    }
    if bike.max_safe_landing_angle_degrees <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "bikes.toml::bikes[{index}].max_safe_landing_angle_degrees must be > 0"
        )));
    }
    if bike.ramp_gradient_threshold < 0.0 || bike.min_jump_speed < 0.0 {
        return Err(ConfigError::Validation(format!(
            "bikes.toml::bikes[{index}] ramp_gradient_threshold and min_jump_speed must be >= 0"
        )));
    }
    Ok(())
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: Box<toml::de::Error>,
    },
    Validation(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "failed to parse `{}`: {source}", path.display())
            }
            Self::Validation(message) => write!(f, "{message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source: Box::new(source),
    })
}

fn to_index<T>(label: &str, rows: &[T]) -> Result<HashMap<String, T>, ConfigError>
where
    T: HasId + Clone,
{
    let mut map = HashMap::new();

    for row in rows {
        let id = row.id();
        if id.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{label} contains an empty id"
            )));
        }

        if map.insert(id.to_string(), row.clone()).is_some() {
            return Err(ConfigError::Validation(format!(
                "{label} contains duplicate id `{id}`"
            )));
        }
    }

    Ok(map)
}

trait HasId {
    fn id(&self) -> &str;
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameFile {
    pub app: AppConfig,
    pub road: RoadShapeConfig,
    pub track: TrackConfig,
    pub scoring: ScoringConfig,
    pub autopilot: AutopilotConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub fixed_timestep_hz: f32,
    pub max_tick_seconds: f32,
    #[serde(default)]
    pub fast_forward: bool,
    pub default_bike: String,
    pub crash_recover_seconds: f32,
    pub max_race_seconds: f32,
    #[serde(default)]
    pub road_export_path: Option<String>,
    #[serde(default)]
    pub results_export_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoadShapeConfig {
    pub seed: u64,
    pub segment_length: f32,
    pub lead_in_segments: usize,
    pub max_turn_rate: f32,
    pub turn_a_amplitude: f32,
    pub turn_a_frequency: f32,
    pub turn_b_amplitude: f32,
    pub turn_b_frequency: f32,
    pub base_elevation: f32,
    pub max_elevation_delta: f32,
    pub elevation_a_amplitude: f32,
    pub elevation_a_frequency: f32,
    pub elevation_b_amplitude: f32,
    pub elevation_b_frequency: f32,
    #[serde(default)]
    pub elevation_c_amplitude: f32,
    #[serde(default)]
    pub elevation_c_frequency: f32,
    #[serde(default)]
    pub cliff_amplitude: f32,
    #[serde(default)]
    pub cliff_frequency: f32,
    #[serde(default = "default_verge_drop")]
    pub verge_drop: f32,
    #[serde(default)]
    pub ramp_interval: usize,
    #[serde(default)]
    pub ramp_gradient: f32,
    #[serde(default = "default_ramp_max_heading_change")]
    pub ramp_max_heading_change: f32,
}

impl RoadShapeConfig {
    pub fn elevation_delta_bound(&self) -> f32 {
        (self.elevation_a_amplitude.abs() * self.elevation_a_frequency)
            + (self.elevation_b_amplitude.abs() * self.elevation_b_frequency)
            + (self.elevation_c_amplitude.abs() * self.elevation_c_frequency)
    }
}

fn default_verge_drop() -> f32 {
    0.4
}

fn default_ramp_max_heading_change() -> f32 {
    0.02
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackConfig {
    pub road_half_width: f32,
    pub off_road_tolerance: f32,
    pub cliff_drop_threshold: f32,
    pub grass_drag: f32,
    #[serde(default = "default_bike_collision_radius")]
    pub bike_collision_radius: f32,
}

fn default_bike_collision_radius() -> f32 {
    0.8
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    pub jump_base_points: u32,
    pub points_per_rotation: u32,
    pub safe_landing_bonus: u32,
    pub good_angle_bonus: u32,
    pub checkpoint_points: u32,
    #[serde(default)]
    pub leg_completion_points: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutopilotConfig {
    pub lookahead_segments: usize,
    pub heading_gain: f32,
    pub offset_gain: f32,
    pub cruise_speed: f32,
    pub corner_speed: f32,
    pub corner_heading_change: f32,
    pub brake_margin: f32,
    #[serde(default)]
    pub wheelie_seconds: f32,
    #[serde(default)]
    pub wheelie_cooldown_seconds: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BikesFile {
    pub bikes: Vec<BikeConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BikeConfig {
    pub id: String,
    pub default_speed: f32,
    pub min_speed: f32,
    pub max_speed: f32,
    pub acceleration: f32,
    pub brake_force: f32,
    #[serde(default)]
    pub coast_drag: f32,
    pub gravity: f32,
    pub turn_radius: f32,
    pub max_steer_angle_degrees: f32,
    pub steer_rate_degrees: f32,
    pub max_lean_angle_degrees: f32,
    pub lean_stiffness: f32,
    pub lean_damping: f32,
    pub yaw_rate_gain: f32,
    #[serde(default = "default_elevation_follow_blend")]
    pub elevation_follow_blend: f32,
    pub wheelie_min_speed: f32,
    #[serde(default)]
    pub wheelie_pop_velocity: f32,
    pub wheelie_lift: f32,
    pub wheelie_return: f32,
    pub wheelie_damping: f32,
    pub max_wheelie_angle_degrees: f32,
    pub wheelie_settle_rate: f32,
    pub wheelie_points_per_second: f32,
    pub wheelie_duration_cap_seconds: f32,
    pub wheelie_reference_speed: f32,
    pub ramp_gradient_threshold: f32,
    pub min_jump_speed: f32,
    pub hop_angle_degrees: f32,
    pub air_brake_decel: f32,
    pub air_spin_torque: f32,
    pub air_spin_damping: f32,
    pub hard_landing_speed: f32,
    pub hard_landing_speed_factor: f32,
    pub max_safe_landing_angle_degrees: f32,
}

fn default_elevation_follow_blend() -> f32 {
    0.15
}

impl HasId for BikeConfig {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LegsFile {
    pub legs: Vec<LegConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LegConfig {
    pub id: String,
    pub name: String,
    pub segments: usize,
    pub difficulty: String,
    pub time_of_day: String,
    pub landscape: String,
    pub weather: String,
    #[serde(default)]
    pub obstacles: Vec<ObstacleConfig>,
}

/// Roadside hazard placed relative to its leg.
#[derive(Debug, Clone, Deserialize)]
pub struct ObstacleConfig {
    /// Segment index counted from the start of the leg.
    pub segment: usize,
    /// Signed distance right of the centerline.
    pub offset: f32,
    pub radius: f32,
}

impl HasId for LegConfig {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeatherFile {
    pub weather: Vec<WeatherConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeatherConfig {
    pub id: String,
    pub traction: f32,
    pub drag: f32,
}

impl HasId for WeatherConfig {
    fn id(&self) -> &str {
        &self.id
    }
}
