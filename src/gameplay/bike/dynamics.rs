use super::boundary::{Surface, TrackBoundaryPolicy, TrackClassification};
use crate::config::BikeConfig;
use crate::gameplay::road::{heading_forward, shortest_arc_delta, TerrainSampler};
use bevy::prelude::*;
use std::f32::consts::TAU;

/// Per-tick rider input. Values outside their range are clamped before use.
#[derive(Resource, Debug, Clone, Copy, Default, PartialEq)]
pub struct RiderControls {
    pub steering: f32,
    pub throttle: bool,
    pub brake: bool,
    pub wheelie: bool,
    pub jump: bool,
    pub reset: bool,
}

impl RiderControls {
    pub fn sanitized(self) -> Self {
        let steering = if self.steering.is_finite() {
            self.steering.clamp(-1.0, 1.0)
        } else {
            0.0
        };
        Self { steering, ..self }
    }
}

/// Weather-driven grip and rolling drag for the active leg.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceConditions {
    pub traction: f32,
    pub drag: f32,
}

impl Default for SurfaceConditions {
    fn default() -> Self {
        Self {
            traction: 1.0,
            drag: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StartPose {
    pub position: Vec3,
    pub heading: f32,
    /// Road segment the pose sits on.
    pub segment: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelieState {
    pub start_time: f32,
    pub elapsed: f32,
    pub velocity: f32,
    pub score_accumulated: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JumpState {
    pub velocity_y: f32,
    pub start_height: f32,
    pub rotation: f32,
    pub spin_velocity: f32,
    pub airtime: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrashState {
    pub crash_angle: f32,
    pub cause: CrashCause,
    /// Vertical speed while the wreck is still falling.
    pub fall_velocity_y: f32,
    /// Ground to fall onto; `None` falls back to the road surface.
    pub fall_target_y: Option<f32>,
    pub settled: bool,
    pub elapsed: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionMode {
    Normal,
    Wheelie(WheelieState),
    Airborne(JumpState),
    Crashed(CrashState),
}

impl MotionMode {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Wheelie(_) => "wheelie",
            Self::Airborne(_) => "airborne",
            Self::Crashed(_) => "crashed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashCause {
    OffTrack,
    Collision,
    BadLanding,
    Cliff,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LandingQuality {
    pub hard: bool,
    pub good_angle: bool,
    pub impact_speed: f32,
    pub tilt: f32,
}

#[derive(Message, Debug, Clone, Copy, PartialEq)]
pub enum BikeEvent {
    WheelieScored {
        points: u32,
        duration_seconds: f32,
    },
    JumpLaunched {
        launch_speed: f32,
        vertical_velocity: f32,
    },
    JumpLanded {
        full_rotations: u32,
        airtime_seconds: f32,
        quality: LandingQuality,
    },
    Crashed {
        cause: CrashCause,
        crash_angle: f32,
    },
    HitGround,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BikeState {
    pub position: Vec3,
    pub velocity: Vec3,
    pub speed: f32,
    pub lean_angle: f32,
    pub lean_velocity: f32,
    pub steering_angle: f32,
    pub heading: f32,
    /// Visual front-wheel lift; keeps settling after a wheelie ends.
    pub wheelie_angle: f32,
    pub distance_traveled: f32,
    pub last_position: Vec3,
    pub falling_off_cliff: bool,
    pub hit_ground: bool,
    pub mode: MotionMode,
    pub grounded_segment: usize,
    pub last_launch_segment: Option<usize>,
    pub clock_seconds: f32,
}

impl BikeState {
    pub fn at_start(config: &BikeConfig, pose: StartPose) -> Self {
        Self {
            position: pose.position,
            velocity: Vec3::ZERO,
            speed: config.default_speed,
            lean_angle: 0.0,
            lean_velocity: 0.0,
            steering_angle: 0.0,
            heading: pose.heading,
            wheelie_angle: 0.0,
            distance_traveled: 0.0,
            last_position: pose.position,
            falling_off_cliff: false,
            hit_ground: false,
            mode: MotionMode::Normal,
            grounded_segment: pose.segment,
            last_launch_segment: None,
            clock_seconds: 0.0,
        }
    }

    pub fn is_crashed(&self) -> bool {
        matches!(self.mode, MotionMode::Crashed(_))
    }

    pub fn is_jumping(&self) -> bool {
        matches!(self.mode, MotionMode::Airborne(_))
    }

    pub fn is_wheelie(&self) -> bool {
        matches!(self.mode, MotionMode::Wheelie(_))
    }

    pub fn crash_angle(&self) -> f32 {
        match self.mode {
            MotionMode::Crashed(crash) => crash.crash_angle,
            _ => 0.0,
        }
    }

    pub fn crash_cause(&self) -> Option<CrashCause> {
        match self.mode {
            MotionMode::Crashed(crash) => Some(crash.cause),
            _ => None,
        }
    }

    /// Seconds since the crash once the wreck has come to rest.
    pub fn settled_crash_seconds(&self) -> Option<f32> {
        match self.mode {
            MotionMode::Crashed(crash) if crash.settled => Some(crash.elapsed),
            _ => None,
        }
    }

    pub fn jump_velocity_y(&self) -> f32 {
        match self.mode {
            MotionMode::Airborne(jump) => jump.velocity_y,
            _ => 0.0,
        }
    }

    pub fn jump_start_height(&self) -> f32 {
        match self.mode {
            MotionMode::Airborne(jump) => jump.start_height,
            _ => 0.0,
        }
    }

    pub fn jump_rotation(&self) -> f32 {
        match self.mode {
            MotionMode::Airborne(jump) => jump.rotation,
            _ => 0.0,
        }
    }

    pub fn wheelie_velocity(&self) -> f32 {
        match self.mode {
            MotionMode::Wheelie(wheelie) => wheelie.velocity,
            _ => 0.0,
        }
    }

    pub fn wheelie_start_time(&self) -> f32 {
        match self.mode {
            MotionMode::Wheelie(wheelie) => wheelie.start_time,
            _ => 0.0,
        }
    }

    pub fn wheelie_score_accumulated(&self) -> f32 {
        match self.mode {
            MotionMode::Wheelie(wheelie) => wheelie.score_accumulated,
            _ => 0.0,
        }
    }
}

/// Motorcycle physics for one rider. The only writer of its [`BikeState`].
#[derive(Component, Debug, Clone)]
pub struct BikeDynamics {
    config: BikeConfig,
    conditions: SurfaceConditions,
    start_pose: StartPose,
    state: BikeState,
    last_classification: Option<TrackClassification>,
    events: Vec<BikeEvent>,
}

impl BikeDynamics {
    pub fn new(config: BikeConfig, start_pose: StartPose) -> Self {
        let state = BikeState::at_start(&config, start_pose);
        Self {
            config,
            conditions: SurfaceConditions::default(),
            start_pose,
            state,
            last_classification: None,
            events: Vec::new(),
        }
    }

    pub fn state(&self) -> &BikeState {
        &self.state
    }

    pub fn config(&self) -> &BikeConfig {
        &self.config
    }

    pub fn conditions(&self) -> SurfaceConditions {
        self.conditions
    }

    pub fn set_conditions(&mut self, conditions: SurfaceConditions) {
        self.conditions = conditions;
    }

    pub fn start_pose(&self) -> StartPose {
        self.start_pose
    }

    pub fn set_start_pose(&mut self, pose: StartPose) {
        self.start_pose = pose;
    }

    pub fn last_classification(&self) -> Option<&TrackClassification> {
        self.last_classification.as_ref()
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = BikeEvent> + '_ {
        self.events.drain(..)
    }

    /// Advances the bike by one tick. `dt` must already be clamped by the caller.
    pub fn update(
        &mut self,
        dt: f32,
        controls: RiderControls,
        sampler: &TerrainSampler,
        policy: &TrackBoundaryPolicy,
    ) {
        let controls = controls.sanitized();
        if controls.reset {
            self.reset();
            return;
        }
        if !(dt.is_finite() && dt > 0.0) {
            return;
        }

        self.state.clock_seconds += dt;

        match self.state.mode {
            MotionMode::Crashed(_) => {
                self.update_crashed(dt, sampler);
                self.settle_wheelie_angle(dt);
            }
            MotionMode::Airborne(_) => {
                self.update_jump(dt, &controls, sampler);
                self.settle_wheelie_angle(dt);
                if self.state.is_jumping() {
                    let classification = policy.classify(self.state.position, sampler);
                    self.last_classification = Some(classification);
                    if classification.surface == Surface::Collided {
                        self.crash(CrashCause::Collision);
                    }
                }
            }
            MotionMode::Normal | MotionMode::Wheelie(_) => {
                self.ride(dt, &controls, sampler, policy);
            }
        }
    }

    fn ride(
        &mut self,
        dt: f32,
        controls: &RiderControls,
        sampler: &TerrainSampler,
        policy: &TrackBoundaryPolicy,
    ) {
        if controls.wheelie {
            self.start_wheelie();
        } else if self.state.is_wheelie() {
            self.end_wheelie();
        }

        if controls.throttle {
            self.accelerate(dt);
        } else if controls.brake {
            self.brake(dt);
        } else {
            self.coast(dt);
        }

        self.steer(dt, controls.steering);

        if self.state.is_wheelie() {
            self.update_wheelie(dt, controls.throttle);
            if self.state.speed < self.config.wheelie_min_speed {
                self.end_wheelie();
            }
        } else {
            self.settle_wheelie_angle(dt);
        }

        self.integrate_ground_motion(dt);
        self.follow_elevation(sampler);

        let classification = policy.classify(self.state.position, sampler);
        self.last_classification = Some(classification);
        self.state.grounded_segment = classification.segment_index;

        match classification.surface {
            Surface::Cliff => self.fall_off_cliff(classification.side_ground_y),
            Surface::OffTrack => self.crash(CrashCause::OffTrack),
            Surface::Collided => self.crash(CrashCause::Collision),
            Surface::Grass => {
                let drag = policy.grass_drag(&classification);
                self.apply_deceleration(drag * dt);
            }
            Surface::Road => {}
        }

        if self.state.is_crashed() {
            return;
        }

        if controls.jump {
            self.hop(sampler);
        } else {
            self.try_ramp_launch(sampler);
        }
    }

    pub fn accelerate(&mut self, dt: f32) {
        let gain = self.config.acceleration * self.conditions.traction * dt;
        self.state.speed = self.clamp_speed(self.state.speed + gain);
    }

    pub fn brake(&mut self, dt: f32) {
        self.apply_deceleration(self.config.brake_force * dt);
    }

    pub fn coast(&mut self, dt: f32) {
        self.apply_deceleration((self.config.coast_drag + self.conditions.drag) * dt);
    }

    fn apply_deceleration(&mut self, amount: f32) {
        self.state.speed = self.clamp_speed(self.state.speed - amount.max(0.0));
    }

    fn clamp_speed(&self, speed: f32) -> f32 {
        speed.clamp(self.config.min_speed, self.config.max_speed)
    }

    /// Steering sets a target lean from the banking relation; lean chases it as a damped
    /// spring and heading turns in proportion to lean and speed.
    pub fn steer(&mut self, dt: f32, input: f32) {
        let config = &self.config;
        let input = if input.is_finite() {
            input.clamp(-1.0, 1.0)
        } else {
            0.0
        };
        let max_lean = config.max_lean_angle_degrees.to_radians();
        let lean_limit = max_lean * self.conditions.traction.clamp(0.0, 1.0);

        self.state.steering_angle = move_towards(
            self.state.steering_angle,
            input * config.max_steer_angle_degrees.to_radians(),
            config.steer_rate_degrees.to_radians() * dt,
        );

        let speed = self.state.speed;
        let bank = ((speed * speed) / (config.gravity * config.turn_radius)).atan();
        let target_lean = (bank * input).clamp(-lean_limit, lean_limit);

        let spring = config.lean_stiffness * (target_lean - self.state.lean_angle);
        self.state.lean_velocity += (spring - (config.lean_damping * self.state.lean_velocity)) * dt;
        self.state.lean_angle += self.state.lean_velocity * dt;
        if self.state.lean_angle.abs() > max_lean {
            self.state.lean_angle = self.state.lean_angle.clamp(-max_lean, max_lean);
            self.state.lean_velocity = 0.0;
        }

        self.state.heading += self.state.lean_angle * speed * config.yaw_rate_gain * dt;
    }

    fn integrate_ground_motion(&mut self, dt: f32) {
        let forward = heading_forward(self.state.heading);
        self.state.velocity = forward * self.state.speed;
        self.state.position += self.state.velocity * dt;
        self.track_distance();
    }

    fn track_distance(&mut self) {
        let step = Vec2::new(
            self.state.position.x - self.state.last_position.x,
            self.state.position.z - self.state.last_position.z,
        );
        self.state.distance_traveled += step.length();
        self.state.last_position = self.state.position;
    }

    /// Eases the bike toward the interpolated road surface instead of snapping to it.
    pub fn follow_elevation(&mut self, sampler: &TerrainSampler) {
        let target = sampler.interpolated_elevation(self.state.position.x, self.state.position.z);
        let blend = self.config.elevation_follow_blend;
        self.state.position.y = ((1.0 - blend) * self.state.position.y) + (blend * target);
    }

    pub fn start_wheelie(&mut self) {
        if !matches!(self.state.mode, MotionMode::Normal) {
            return;
        }
        if self.state.speed <= self.config.wheelie_min_speed {
            return;
        }

        self.state.mode = MotionMode::Wheelie(WheelieState {
            start_time: self.state.clock_seconds,
            elapsed: 0.0,
            velocity: self.config.wheelie_pop_velocity,
            score_accumulated: 0.0,
        });
    }

    pub fn update_wheelie(&mut self, dt: f32, throttle: bool) {
        let MotionMode::Wheelie(mut wheelie) = self.state.mode else {
            return;
        };
        let config = &self.config;
        let max_angle = config.max_wheelie_angle_degrees.to_radians();
        let lift = if throttle { config.wheelie_lift } else { 0.0 };

        let torque = lift
            - (config.wheelie_return * self.state.wheelie_angle)
            - (config.wheelie_damping * wheelie.velocity);
        wheelie.velocity += torque * dt;
        self.state.wheelie_angle += wheelie.velocity * dt;
        if self.state.wheelie_angle <= 0.0 {
            self.state.wheelie_angle = 0.0;
            wheelie.velocity = wheelie.velocity.max(0.0);
        } else if self.state.wheelie_angle >= max_angle {
            self.state.wheelie_angle = max_angle;
            wheelie.velocity = wheelie.velocity.min(0.0);
        }

        wheelie.elapsed += dt;
        let duration = wheelie.elapsed.min(config.wheelie_duration_cap_seconds);
        let speed_scale = self.state.speed / config.wheelie_reference_speed;
        wheelie.score_accumulated += duration * config.wheelie_points_per_second * speed_scale * dt;

        self.state.mode = MotionMode::Wheelie(wheelie);
    }

    /// Ends an active wheelie and emits its score exactly once.
    pub fn end_wheelie(&mut self) {
        let MotionMode::Wheelie(wheelie) = self.state.mode else {
            return;
        };
        self.state.mode = MotionMode::Normal;
        self.events.push(BikeEvent::WheelieScored {
            points: wheelie.score_accumulated.max(0.0).floor() as u32,
            duration_seconds: wheelie.elapsed,
        });
    }

    fn settle_wheelie_angle(&mut self, dt: f32) {
        self.state.wheelie_angle = move_towards(
            self.state.wheelie_angle,
            0.0,
            self.config.wheelie_settle_rate * dt,
        );
    }

    /// Launches off a steep grade or a kicker. Each segment launches at most once.
    pub fn try_ramp_launch(&mut self, sampler: &TerrainSampler) -> bool {
        let segment = sampler.segment(self.state.grounded_segment);
        if self.state.last_launch_segment == Some(segment.index) {
            return false;
        }

        let gradient = if segment.ramp {
            segment.ramp_gradient.max(segment.gradient)
        } else {
            segment.gradient
        };
        if gradient <= self.config.ramp_gradient_threshold
            || self.state.speed <= self.config.min_jump_speed
        {
            return false;
        }

        self.state.last_launch_segment = Some(segment.index);
        self.lift_to_surface(sampler);
        self.launch(gradient.atan())
    }

    fn hop(&mut self, sampler: &TerrainSampler) -> bool {
        if self.state.speed <= self.config.min_jump_speed {
            return false;
        }
        self.state.last_launch_segment = Some(self.state.grounded_segment);
        self.lift_to_surface(sampler);
        self.launch(self.config.hop_angle_degrees.to_radians())
    }

    /// Elevation follow lags on climbs; a jump must not start below the road.
    fn lift_to_surface(&mut self, sampler: &TerrainSampler) {
        let ground = sampler.interpolated_elevation(self.state.position.x, self.state.position.z);
        self.state.position.y = self.state.position.y.max(ground);
    }

    /// Splits speed into vertical and horizontal parts along `ramp_angle`.
    pub fn launch(&mut self, ramp_angle: f32) -> bool {
        if self.state.is_crashed() || self.state.is_jumping() {
            return false;
        }
        self.end_wheelie();

        let launch_speed = self.state.speed;
        let velocity_y = launch_speed * ramp_angle.sin();
        self.state.speed = launch_speed * ramp_angle.cos();
        self.state.velocity = (heading_forward(self.state.heading) * self.state.speed)
            + (Vec3::Y * velocity_y);
        self.state.mode = MotionMode::Airborne(JumpState {
            velocity_y,
            start_height: self.state.position.y,
            rotation: 0.0,
            spin_velocity: 0.0,
            airtime: 0.0,
        });
        self.events.push(BikeEvent::JumpLaunched {
            launch_speed,
            vertical_velocity: velocity_y,
        });
        true
    }

    pub fn update_jump(&mut self, dt: f32, controls: &RiderControls, sampler: &TerrainSampler) {
        let MotionMode::Airborne(mut jump) = self.state.mode else {
            return;
        };
        let config = &self.config;

        jump.velocity_y -= config.gravity * dt;
        if controls.brake && jump.velocity_y > 0.0 {
            jump.velocity_y = (jump.velocity_y - (config.air_brake_decel * dt)).max(0.0);
        }

        let spin_torque = (controls.steering * config.air_spin_torque)
            - (config.air_spin_damping * jump.spin_velocity);
        jump.spin_velocity += spin_torque * dt;
        jump.rotation += jump.spin_velocity * dt;
        jump.airtime += dt;
        let launch_tick = jump.airtime <= dt;

        let forward = heading_forward(self.state.heading);
        self.state.velocity = (forward * self.state.speed) + (Vec3::Y * jump.velocity_y);
        self.state.position += self.state.velocity * dt;
        self.track_distance();
        self.state.mode = MotionMode::Airborne(jump);

        let ground = sampler.interpolated_elevation(self.state.position.x, self.state.position.z);
        // The launch tick can still sit on the lip of a ramp that matches the launch angle.
        if !launch_tick && self.state.position.y <= ground {
            self.land(ground);
        }
    }

    /// Touches down on `ground_y` and classifies the landing.
    pub fn land(&mut self, ground_y: f32) -> Option<LandingQuality> {
        let MotionMode::Airborne(jump) = self.state.mode else {
            return None;
        };
        let config = &self.config;

        let tilt = shortest_arc_delta(0.0, jump.rotation)
            .abs()
            .max(self.state.lean_angle.abs());
        let impact_speed = jump.velocity_y.abs();
        let quality = LandingQuality {
            hard: impact_speed > config.hard_landing_speed,
            good_angle: tilt <= config.max_safe_landing_angle_degrees.to_radians(),
            impact_speed,
            tilt,
        };
        let hard_landing_factor = config.hard_landing_speed_factor;

        self.state.position.y = ground_y;
        self.state.velocity.y = 0.0;
        self.state.mode = MotionMode::Normal;
        self.events.push(BikeEvent::JumpLanded {
            full_rotations: (jump.rotation.abs() / TAU).round() as u32,
            airtime_seconds: jump.airtime,
            quality,
        });

        if !quality.good_angle {
            self.crash(CrashCause::BadLanding);
        } else if quality.hard {
            self.state.speed = self.clamp_speed(self.state.speed * hard_landing_factor);
        }

        Some(quality)
    }

    /// Enters the crashed state once. Repeat calls leave speed and crash angle untouched.
    pub fn crash(&mut self, cause: CrashCause) {
        if self.state.is_crashed() {
            return;
        }
        self.end_wheelie();

        let fall_velocity_y = self.state.jump_velocity_y();
        let airborne = self.state.is_jumping();
        let crash_angle = self.state.lean_angle;

        self.state.speed = 0.0;
        self.state.velocity = Vec3::Y * fall_velocity_y;
        self.state.mode = MotionMode::Crashed(CrashState {
            crash_angle,
            cause,
            fall_velocity_y,
            fall_target_y: None,
            settled: !airborne,
            elapsed: 0.0,
        });
        self.events.push(BikeEvent::Crashed { cause, crash_angle });
    }

    /// Leaves the road over a drop and falls to the terrain at `ground_y`.
    pub fn fall_off_cliff(&mut self, ground_y: f32) {
        if self.state.is_crashed() {
            return;
        }
        self.crash(CrashCause::Cliff);
        if let MotionMode::Crashed(crash) = &mut self.state.mode {
            crash.fall_target_y = Some(ground_y);
            crash.settled = false;
        }
        self.state.falling_off_cliff = true;
    }

    fn update_crashed(&mut self, dt: f32, sampler: &TerrainSampler) {
        let MotionMode::Crashed(mut crash) = self.state.mode else {
            return;
        };
        crash.elapsed += dt;

        if !crash.settled {
            crash.fall_velocity_y -= self.config.gravity * dt;
            self.state.position.y += crash.fall_velocity_y * dt;
            self.state.velocity = Vec3::Y * crash.fall_velocity_y;

            let ground = crash.fall_target_y.unwrap_or_else(|| {
                sampler.interpolated_elevation(self.state.position.x, self.state.position.z)
            });
            if crash.fall_velocity_y <= 0.0 && self.state.position.y <= ground {
                self.state.position.y = ground;
                self.state.velocity = Vec3::ZERO;
                crash.fall_velocity_y = 0.0;
                crash.settled = true;
                if self.state.falling_off_cliff {
                    self.state.hit_ground = true;
                    self.events.push(BikeEvent::HitGround);
                }
            }
        }

        self.state.mode = MotionMode::Crashed(crash);
    }

    /// Returns to the start pose in normal riding, whatever the current mode.
    pub fn reset(&mut self) {
        self.state = BikeState::at_start(&self.config, self.start_pose);
        self.last_classification = None;
    }

    /// Moves the start pose onto a road segment and resets there.
    pub fn begin_at_segment(&mut self, sampler: &TerrainSampler, index: usize) {
        let segment = sampler.segment(index);
        self.start_pose = StartPose {
            position: segment.position,
            heading: segment.heading,
            segment: segment.index,
        };
        self.reset();
    }
}

fn move_towards(current: f32, target: f32, max_delta: f32) -> f32 {
    if (target - current).abs() <= max_delta {
        target
    } else {
        current + (target - current).signum() * max_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::{sample_bike, sample_track};
    use crate::gameplay::road::test_support::{flat_segment, road_from_elevations, straight_road};
    use crate::gameplay::road::RoadPath;

    const DT: f32 = 1.0 / 60.0;

    fn bike() -> BikeDynamics {
        BikeDynamics::new(sample_bike(), StartPose::default())
    }

    fn policy() -> TrackBoundaryPolicy {
        TrackBoundaryPolicy::from_config(&sample_track())
    }

    fn ride_for(
        bike: &mut BikeDynamics,
        road: &RoadPath,
        controls: RiderControls,
        ticks: usize,
    ) -> Vec<BikeEvent> {
        let sampler = TerrainSampler::new(road);
        let policy = policy();
        let mut events = Vec::new();
        for _ in 0..ticks {
            bike.update(DT, controls, &sampler, &policy);
            events.extend(bike.drain_events());
        }
        events
    }

    #[test]
    fn accelerating_half_a_second_adds_acceleration_times_dt() {
        let mut bike = bike();
        assert_eq!(bike.state().speed, 20.0);

        bike.accelerate(0.5);

        assert!((bike.state().speed - 26.0).abs() < 1.0e-5);
    }

    #[test]
    fn speed_stays_within_bounds_for_any_throttle_sequence() {
        let mut bike = bike();
        let config = bike.config().clone();
        let steps = [0.5, 1.0, 3.0, 0.25, 2.0, 4.0, 0.1];

        for (round, dt) in steps.iter().cycle().take(60).enumerate() {
            if round % 3 == 0 {
                bike.brake(*dt);
            } else {
                bike.accelerate(*dt);
            }
            let speed = bike.state().speed;
            assert!(config.min_speed <= speed && speed <= config.max_speed);
        }

        bike.brake(100.0);
        assert_eq!(bike.state().speed, config.min_speed);
        bike.accelerate(100.0);
        assert_eq!(bike.state().speed, config.max_speed);
    }

    #[test]
    fn wheelie_accumulates_score_and_reports_it_once() {
        let mut bike = bike();
        bike.state.speed = 15.0;

        bike.start_wheelie();
        assert!(bike.state().is_wheelie());

        for _ in 0..10 {
            bike.update_wheelie(0.1, true);
        }
        let accumulated = bike.state().wheelie_score_accumulated();
        assert!(accumulated > 0.0);
        let max_angle = bike.config().max_wheelie_angle_degrees.to_radians();
        assert!(bike.state().wheelie_angle > 0.0 && bike.state().wheelie_angle <= max_angle);

        bike.end_wheelie();
        bike.end_wheelie();

        let events: Vec<BikeEvent> = bike.drain_events().collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            BikeEvent::WheelieScored { points, .. } if points == accumulated.floor() as u32
        ));
        assert_eq!(bike.state().wheelie_score_accumulated(), 0.0);
        assert!(!bike.state().is_wheelie());
    }

    #[test]
    fn starting_a_wheelie_twice_keeps_the_first_start() {
        let mut bike = bike();
        bike.state.clock_seconds = 3.0;
        bike.start_wheelie();
        bike.update_wheelie(0.5, true);
        let start_time = bike.state().wheelie_start_time();
        let accumulated = bike.state().wheelie_score_accumulated();

        bike.state.clock_seconds = 7.0;
        bike.start_wheelie();

        assert_eq!(bike.state().wheelie_start_time(), start_time);
        assert_eq!(bike.state().wheelie_start_time(), 3.0);
        assert_eq!(bike.state().wheelie_score_accumulated(), accumulated);
    }

    #[test]
    fn wheelie_needs_speed_and_a_running_bike() {
        let mut bike = bike();
        bike.state.speed = 8.0;
        bike.start_wheelie();
        assert!(!bike.state().is_wheelie());

        bike.state.speed = 20.0;
        bike.crash(CrashCause::Collision);
        bike.start_wheelie();
        assert!(!bike.state().is_wheelie());
    }

    #[test]
    fn crash_captures_lean_and_ignores_repeat_calls() {
        let mut bike = bike();
        bike.state.lean_angle = 0.5;

        bike.crash(CrashCause::OffTrack);
        assert!(bike.state().is_crashed());
        assert_eq!(bike.state().crash_angle(), 0.5);
        assert_eq!(bike.state().speed, 0.0);

        bike.state.lean_angle = -0.2;
        bike.crash(CrashCause::Collision);
        assert!(bike.state().is_crashed());
        assert_eq!(bike.state().crash_angle(), 0.5);
        assert_eq!(bike.state().speed, 0.0);
        assert_eq!(bike.state().crash_cause(), Some(CrashCause::OffTrack));
        assert_eq!(bike.drain_events().count(), 1);
    }

    #[test]
    fn crash_flushes_an_active_wheelie() {
        let mut bike = bike();
        bike.start_wheelie();
        for _ in 0..20 {
            bike.update_wheelie(0.1, true);
        }

        bike.crash(CrashCause::Collision);

        let events: Vec<BikeEvent> = bike.drain_events().collect();
        assert!(matches!(events[0], BikeEvent::WheelieScored { points, .. } if points > 0));
        assert!(matches!(events[1], BikeEvent::Crashed { cause: CrashCause::Collision, .. }));
    }

    #[test]
    fn reset_restores_every_field_from_any_mode() {
        let road = straight_road(80, 0.0);
        let sampler = TerrainSampler::new(&road);
        let pose = StartPose {
            position: Vec3::new(0.0, 0.0, 30.0),
            heading: 0.0,
            ..default()
        };
        let expected = BikeState::at_start(&sample_bike(), pose);

        let mut wheelie = BikeDynamics::new(sample_bike(), pose);
        wheelie.update(DT, RiderControls { wheelie: true, throttle: true, steering: 0.4, ..default() }, &sampler, &policy());
        assert!(wheelie.state().is_wheelie());
        wheelie.reset();
        assert_eq!(*wheelie.state(), expected);

        let mut airborne = BikeDynamics::new(sample_bike(), pose);
        assert!(airborne.launch(0.4));
        airborne.update(DT, RiderControls { steering: 1.0, ..default() }, &sampler, &policy());
        airborne.update(DT, RiderControls { reset: true, ..default() }, &sampler, &policy());
        assert_eq!(*airborne.state(), expected);

        let mut crashed = BikeDynamics::new(sample_bike(), pose);
        crashed.state.lean_angle = 0.3;
        crashed.fall_off_cliff(-40.0);
        crashed.reset();
        assert_eq!(*crashed.state(), expected);
        assert!(!crashed.state().falling_off_cliff);
        assert_eq!(crashed.state().speed, 20.0);
    }

    #[test]
    fn steering_right_leans_and_turns_right() {
        let road = straight_road(80, 0.0);
        let mut bike = bike();

        ride_for(&mut bike, &road, RiderControls { steering: 1.0, ..default() }, 30);

        let max_lean = bike.config().max_lean_angle_degrees.to_radians();
        assert!(bike.state().lean_angle > 0.0 && bike.state().lean_angle <= max_lean);
        assert!(bike.state().heading > 0.0);
        assert!(bike.state().position.x > 0.0);
        assert!(bike.state().steering_angle > 0.0);
    }

    #[test]
    fn low_traction_caps_the_lean() {
        let road = straight_road(80, 0.0);
        let mut bike = bike();
        bike.state.speed = 50.0;
        bike.set_conditions(SurfaceConditions {
            traction: 0.5,
            drag: 0.0,
        });

        ride_for(&mut bike, &road, RiderControls { steering: 1.0, ..default() }, 120);

        let cap = 0.5 * bike.config().max_lean_angle_degrees.to_radians();
        assert!(bike.state().lean_angle <= cap * 1.05);
    }

    #[test]
    fn elevation_follow_blends_toward_the_road() {
        let road = straight_road(10, 10.0);
        let sampler = TerrainSampler::new(&road);
        let mut bike = bike();

        bike.follow_elevation(&sampler);

        assert!((bike.state().position.y - 1.5).abs() < 1.0e-5);
    }

    #[test]
    fn launch_splits_speed_along_the_ramp_angle() {
        let mut bike = bike();
        let angle = 0.3_f32.atan();

        assert!(bike.launch(angle));

        assert!(bike.state().is_jumping());
        assert!((bike.state().jump_velocity_y() - 20.0 * angle.sin()).abs() < 1.0e-5);
        assert!((bike.state().speed - 20.0 * angle.cos()).abs() < 1.0e-5);
        assert!(!bike.launch(angle));
    }

    #[test]
    fn kicker_launches_once_and_lands_clean() {
        let road = kicker_road(0.3);
        let mut bike = bike();

        let events = ride_for(&mut bike, &road, RiderControls::default(), 240);

        assert_eq!(launch_count(&events), 1);
        let landing = events.iter().find_map(|event| match event {
            BikeEvent::JumpLanded { quality, .. } => Some(*quality),
            _ => None,
        });
        let quality = landing.expect("bike should land");
        assert!(quality.good_angle);
        assert!(!quality.hard);
        assert!(!bike.state().is_jumping());
        assert!(!bike.state().is_crashed());
        assert!(bike.state().position.y.abs() < 0.5);
    }

    fn kicker_road(ramp_gradient: f32) -> RoadPath {
        let segments = (0..60)
            .map(|index| {
                let mut segment = flat_segment(index, Vec3::new(0.0, 0.0, index as f32 * 10.0));
                if index == 2 {
                    segment.ramp = true;
                    segment.ramp_gradient = ramp_gradient;
                }
                segment
            })
            .collect();
        RoadPath::from_segments(segments, 10.0).expect("valid road")
    }

    fn launch_count(events: &[BikeEvent]) -> usize {
        events
            .iter()
            .filter(|event| matches!(event, BikeEvent::JumpLaunched { .. }))
            .count()
    }

    #[test]
    fn kicker_needs_more_than_the_minimum_jump_speed() {
        let road = kicker_road(0.3);
        let mut bike = bike();
        bike.state.speed = bike.config().min_jump_speed;

        let events = ride_for(&mut bike, &road, RiderControls::default(), 240);

        assert_eq!(launch_count(&events), 0);
        assert!(bike.state().position.z > 40.0);
        assert!(!bike.state().is_jumping());
    }

    #[test]
    fn kicker_just_under_the_gradient_threshold_stays_grounded() {
        let road = kicker_road(0.19);
        let mut bike = bike();
        assert_eq!(bike.config().ramp_gradient_threshold, 0.2);

        let events = ride_for(&mut bike, &road, RiderControls::default(), 240);

        assert_eq!(launch_count(&events), 0);
        assert!(bike.state().position.z > 40.0);
    }

    #[test]
    fn jump_control_hops_at_the_configured_angle() {
        let road = straight_road(80, 0.0);
        let mut bike = bike();

        let events = ride_for(&mut bike, &road, RiderControls { jump: true, ..default() }, 1);

        assert!(bike.state().is_jumping());
        let angle = bike.config().hop_angle_degrees.to_radians();
        assert!(events.iter().any(|event| matches!(
            event,
            BikeEvent::JumpLaunched { launch_speed, vertical_velocity }
                if (*launch_speed - 20.0).abs() < 1.0e-4
                    && (*vertical_velocity - 20.0 * angle.sin()).abs() < 1.0e-4
        )));

        let mut slow = self::bike();
        slow.state.speed = 10.0;
        let events = ride_for(&mut slow, &road, RiderControls { jump: true, ..default() }, 1);
        assert_eq!(launch_count(&events), 0);
        assert!(!slow.state().is_jumping());
    }

    #[test]
    fn uphill_jump_lands_as_soon_as_it_meets_the_slope() {
        let elevations: Vec<f32> = (0..80).map(|index| index as f32 * 1.5).collect();
        let road = road_from_elevations(&elevations);
        let sampler = TerrainSampler::new(&road);
        let policy = policy();
        let mut bike = BikeDynamics::new(
            sample_bike(),
            StartPose {
                position: Vec3::new(0.0, 15.0, 100.0),
                heading: 0.0,
                segment: 10,
            },
        );
        bike.state.speed = 30.0;
        assert!(bike.launch(0.21_f32.atan()));

        let mut landings = Vec::new();
        for _ in 0..200 {
            bike.update(DT, RiderControls::default(), &sampler, &policy);
            let position = bike.state().position;
            if bike.state().is_jumping() {
                assert!(position.y > sampler.interpolated_elevation(position.x, position.z));
            }
            landings.extend(bike.drain_events().filter_map(|event| match event {
                BikeEvent::JumpLanded {
                    airtime_seconds,
                    quality,
                    ..
                } => Some((airtime_seconds, quality)),
                _ => None,
            }));
        }

        assert_eq!(landings.len(), 1);
        let (airtime, quality) = landings[0];
        assert!(airtime < 0.45, "airtime {airtime}");
        assert!(quality.good_angle);
        assert!(!quality.hard);
        assert!(!bike.state().is_crashed());
    }

    #[test]
    fn launching_from_below_a_climb_starts_on_the_road() {
        let elevations: Vec<f32> = (0..40).map(|index| index as f32 * 3.0).collect();
        let road = road_from_elevations(&elevations);
        let sampler = TerrainSampler::new(&road);
        let mut bike = BikeDynamics::new(
            sample_bike(),
            StartPose {
                position: Vec3::new(0.0, 25.0, 100.0),
                heading: 0.0,
                segment: 10,
            },
        );

        assert!(bike.hop(&sampler));

        assert!((bike.state().position.y - 30.0).abs() < 1.0e-4);
        assert_eq!(bike.state().jump_start_height(), bike.state().position.y);
    }

    #[test]
    fn hard_landing_scrubs_speed() {
        let road = straight_road(80, 0.0);
        let mut bike = bike();
        bike.state.speed = 40.0;
        bike.launch(0.6);
        let horizontal = bike.state().speed;

        let events = ride_for(&mut bike, &road, RiderControls::default(), 400);

        let quality = events.iter().find_map(|event| match event {
            BikeEvent::JumpLanded { quality, .. } => Some(*quality),
            _ => None,
        });
        let quality = quality.expect("bike should land");
        assert!(quality.hard);
        assert!(quality.good_angle);
        assert!(bike.state().speed < horizontal * 0.61);
        assert!(!bike.state().is_crashed());
    }

    #[test]
    fn spinning_into_the_ground_crashes() {
        let road = straight_road(80, 0.0);
        let mut bike = bike();
        bike.launch(0.3);

        let events = ride_for(&mut bike, &road, RiderControls { steering: 1.0, ..default() }, 240);

        assert!(events.iter().any(|event| matches!(
            event,
            BikeEvent::JumpLanded { quality, .. } if !quality.good_angle
        )));
        assert!(events.iter().any(|event| matches!(
            event,
            BikeEvent::Crashed { cause: CrashCause::BadLanding, .. }
        )));
        assert!(bike.state().is_crashed());
    }

    #[test]
    fn braking_on_the_way_up_cuts_the_jump_short() {
        let road = straight_road(80, 0.0);
        let sampler = TerrainSampler::new(&road);
        let mut bike = bike();
        bike.launch(0.5);

        bike.update(DT, RiderControls { brake: true, ..default() }, &sampler, &policy());
        let braked = bike.state().jump_velocity_y();

        let mut coasting = self::bike();
        coasting.launch(0.5);
        coasting.update(DT, RiderControls::default(), &sampler, &policy());

        assert!(braked < coasting.state().jump_velocity_y());
        assert!(braked >= 0.0);
    }

    #[test]
    fn crashing_mid_air_keeps_falling_to_the_ground() {
        let road = straight_road(80, 0.0);
        let mut bike = bike();
        bike.launch(0.5);
        ride_for(&mut bike, &road, RiderControls::default(), 20);
        let height = bike.state().position.y;
        assert!(height > 1.0);

        bike.crash(CrashCause::Collision);
        assert!(bike.state().is_crashed());
        assert!(!bike.state().is_jumping());
        assert_eq!(bike.state().settled_crash_seconds(), None);

        ride_for(&mut bike, &road, RiderControls::default(), 240);

        assert!(bike.state().position.y.abs() < 1.0e-4);
        assert!(bike.state().settled_crash_seconds().is_some());
        assert!(!bike.state().hit_ground);
    }

    #[test]
    fn riding_over_a_drop_falls_until_it_hits_the_ground() {
        let segments = (0..40)
            .map(|index| {
                let mut segment = flat_segment(index, Vec3::new(0.0, 30.0, index as f32 * 10.0));
                segment.left_ground_y = -20.0;
                segment
            })
            .collect();
        let road = RoadPath::from_segments(segments, 10.0).expect("valid road");
        let mut bike = BikeDynamics::new(
            sample_bike(),
            StartPose {
                position: Vec3::new(-9.0, 30.0, 0.0),
                heading: 0.0,
                ..default()
            },
        );

        let first = ride_for(&mut bike, &road, RiderControls::default(), 1);
        assert!(bike.state().falling_off_cliff);
        assert!(!bike.state().hit_ground);
        assert!(matches!(first[0], BikeEvent::Crashed { cause: CrashCause::Cliff, .. }));

        let rest = ride_for(&mut bike, &road, RiderControls::default(), 300);
        assert!(bike.state().hit_ground);
        assert_eq!(bike.state().position.y, -20.0);
        assert_eq!(
            rest.iter().filter(|event| matches!(event, BikeEvent::HitGround)).count(),
            1
        );
    }

    #[test]
    fn leaving_the_track_crashes_and_grass_slows() {
        let road = straight_road(80, 0.0);

        let mut wide = BikeDynamics::new(
            sample_bike(),
            StartPose {
                position: Vec3::new(-20.0, 0.0, 0.0),
                heading: 0.0,
                ..default()
            },
        );
        ride_for(&mut wide, &road, RiderControls::default(), 1);
        assert_eq!(wide.state().crash_cause(), Some(CrashCause::OffTrack));

        let mut verge = BikeDynamics::new(
            sample_bike(),
            StartPose {
                position: Vec3::new(10.0, 0.0, 0.0),
                heading: 0.0,
                ..default()
            },
        );
        ride_for(&mut verge, &road, RiderControls::default(), 30);
        assert!(!verge.state().is_crashed());
        assert!(verge.state().speed < 20.0);
        assert_eq!(
            verge.last_classification().map(|classification| classification.surface),
            Some(Surface::Grass)
        );
    }

    #[test]
    fn controls_are_clamped_before_use() {
        let wild = RiderControls {
            steering: 7.0,
            ..default()
        };
        assert_eq!(wild.sanitized().steering, 1.0);

        let broken = RiderControls {
            steering: f32::NAN,
            throttle: true,
            ..default()
        };
        let clean = broken.sanitized();
        assert_eq!(clean.steering, 0.0);
        assert!(clean.throttle);
    }

    #[test]
    fn begin_at_segment_moves_the_start_pose() {
        let road = straight_road(20, 5.0);
        let sampler = TerrainSampler::new(&road);
        let mut bike = bike();
        bike.crash(CrashCause::Collision);

        bike.begin_at_segment(&sampler, 7);

        assert!(!bike.state().is_crashed());
        assert_eq!(bike.state().position, Vec3::new(0.0, 5.0, 70.0));
        assert_eq!(bike.state().grounded_segment, 7);
        assert_eq!(bike.start_pose().position.z, 70.0);
        assert!(bike.state().distance_traveled == 0.0);

        bike.state.grounded_segment = 12;
        bike.crash(CrashCause::OffTrack);
        bike.reset();
        assert_eq!(bike.state().grounded_segment, 7);
        assert_eq!(bike.state().position, Vec3::new(0.0, 5.0, 70.0));
    }
}
