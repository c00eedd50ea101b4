use nalgebra::{UnitQuaternion, Vector3};
use rand::distributions::Distribution;
use tracing::{debug, info, warn};

use crate::core::{Env, GymError, Info, InfoValue, RenderFrame, Result, Step};
use crate::sandbox::{angle_about_z, BodyHandle, CartPoleRig, PhysicalSandbox};
use crate::spaces::BoxSpace;
use crate::utils::rng::{rng_from_seed, RngStream};

/// How the pole angle is reported in observations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PoleAngleEncoding {
    /// Signed rotation about the hinge axis.
    #[default]
    Radians,
    /// z component of the pole's local rotation quaternion, i.e. sin(angle / 2).
    QuaternionZ,
}

/// Tunables of the balancing task.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CartPoleConfig {
    /// Seconds per physics tick (0.02).
    pub fixed_step_duration: f32,
    /// Cart speed at full action, in units per second (10.0).
    pub speed: f32,
    /// Reward for every non-terminal step (0.01).
    pub survival_reward: f32,
    /// Reward for a terminal step; replaces the survival reward (-1.0).
    pub terminal_reward: f32,
    /// Episode ends once the pole leans further than this from world up (60°).
    pub max_tilt_degrees: f32,
    /// Episode ends once |cart x| exceeds this (4.0).
    pub track_limit: f32,
    /// Reset tilt is drawn uniformly from [-this, this] (20°).
    pub reset_tilt_degrees: f32,
    /// Pole local position at reset (0, 2, 0).
    pub pole_offset: Vector3<f32>,
    pub angle_encoding: PoleAngleEncoding,
    /// Seed of the reset RNG until `reset(Some(seed))` replaces it.
    pub seed: u64,
}

impl Default for CartPoleConfig {
    fn default() -> Self {
        Self {
            fixed_step_duration: 0.02,
            speed: 10.0,
            survival_reward: 0.01,
            terminal_reward: -1.0,
            max_tilt_degrees: 60.0,
            track_limit: 4.0,
            reset_tilt_degrees: 20.0,
            pole_offset: Vector3::new(0.0, 2.0, 0.0),
            angle_encoding: PoleAngleEncoding::Radians,
            seed: 1_234_567,
        }
    }
}

impl CartPoleConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> Result<()> { Err(GymError::InvalidConfig(msg)) };
        if !(self.fixed_step_duration.is_finite() && self.fixed_step_duration > 0.0) {
            return invalid(format!("fixed_step_duration must be > 0, got {}", self.fixed_step_duration));
        }
        if !self.speed.is_finite() {
            return invalid(format!("speed must be finite, got {}", self.speed));
        }
        if !(self.survival_reward.is_finite() && self.terminal_reward.is_finite()) {
            return invalid("rewards must be finite".into());
        }
        if !(self.max_tilt_degrees > 0.0 && self.max_tilt_degrees <= 180.0) {
            return invalid(format!("max_tilt_degrees must be in (0, 180], got {}", self.max_tilt_degrees));
        }
        if !(self.track_limit.is_finite() && self.track_limit > 0.0) {
            return invalid(format!("track_limit must be > 0, got {}", self.track_limit));
        }
        if !(self.reset_tilt_degrees >= 0.0 && self.reset_tilt_degrees < self.max_tilt_degrees) {
            return invalid(format!(
                "reset_tilt_degrees must be in [0, max_tilt_degrees), got {}",
                self.reset_tilt_degrees
            ));
        }
        Ok(())
    }
}

/// Sandbox handles of the two bodies driven by the environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CartPoleBodies {
    pub cart: BodyHandle,
    pub pole: BodyHandle,
}

/// Observation: [cart_position, pole_angle, pole_angular_velocity]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Observation {
    pub cart_position: f32,
    pub pole_angle: f32,
    pub pole_angular_velocity: f32,
}

impl Observation {
    pub fn to_array(&self) -> [f32; 3] {
        [self.cart_position, self.pole_angle, self.pole_angular_velocity]
    }
}

impl From<Observation> for [f32; 3] {
    fn from(o: Observation) -> Self { o.to_array() }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EpisodeState {
    #[default]
    Running,
    Terminal,
}

/// Which failure ended an episode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Termination {
    PoleTilt,
    TrackLimit,
    PoleTiltAndTrackLimit,
}

impl Termination {
    /// Both conditions are checked every step.
    pub fn evaluate(tilt_degrees: f32, cart_position: f32, config: &CartPoleConfig) -> Option<Self> {
        let tilted = tilt_degrees > config.max_tilt_degrees;
        let off_track = cart_position.abs() > config.track_limit;
        match (tilted, off_track) {
            (true, true) => Some(Termination::PoleTiltAndTrackLimit),
            (true, false) => Some(Termination::PoleTilt),
            (false, true) => Some(Termination::TrackLimit),
            (false, false) => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::PoleTilt => "pole_tilt",
            Termination::TrackLimit => "track_limit",
            Termination::PoleTiltAndTrackLimit => "pole_tilt+track_limit",
        }
    }
}

/// Read-only snapshot of the running episode, refreshed every tick.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Telemetry {
    pub observation: Observation,
    /// Last applied (clamped) action, from a policy step or a manual move.
    pub action: f32,
    pub reward: f32,
    pub state: EpisodeState,
    /// Number of resets performed so far.
    pub episode: u64,
    pub episode_steps: u32,
    pub episode_return: f32,
    pub termination: Option<Termination>,
}

/// Cart-pole balancing over an injected physical sandbox.
/// Observation: [cart_x, pole_angle, pole_angular_velocity]
/// Action space: Box([-1.0], [1.0]) -> scalar cart speed fraction
/// Reward: +0.01 per surviving step, -1.0 (instead) on the terminal step
pub struct CartPoleEnv<S: PhysicalSandbox> {
    sandbox: S,
    bodies: CartPoleBodies,
    config: CartPoleConfig,
    state: EpisodeState,
    rng: RngStream,
    telemetry: Telemetry,
}

impl CartPoleEnv<CartPoleRig> {
    /// Environment over the reference rig, driving its own cart and pole.
    pub fn from_rig(rig: CartPoleRig, config: CartPoleConfig) -> Result<Self> {
        let bodies = CartPoleBodies { cart: rig.cart(), pole: rig.pole() };
        Self::new(rig, bodies, config)
    }
}

impl<S: PhysicalSandbox> CartPoleEnv<S> {
    /// Validate configuration and sandbox bodies, then start the first episode.
    pub fn new(sandbox: S, bodies: CartPoleBodies, config: CartPoleConfig) -> Result<Self> {
        config.validate()?;
        let rng = rng_from_seed(config.seed);
        let mut env = Self {
            sandbox,
            bodies,
            config,
            state: EpisodeState::Running,
            rng,
            telemetry: Telemetry::default(),
        };
        env.initialize()?;
        env.reset(None);
        Ok(env)
    }

    pub fn config(&self) -> &CartPoleConfig { &self.config }
    pub fn bodies(&self) -> CartPoleBodies { self.bodies }
    pub fn state(&self) -> EpisodeState { self.state }
    pub fn telemetry(&self) -> &Telemetry { &self.telemetry }
    pub fn sandbox(&self) -> &S { &self.sandbox }

    /// Mutable access for the engine that owns the clock.
    pub fn sandbox_mut(&mut self) -> &mut S { &mut self.sandbox }

    pub fn into_sandbox(self) -> S { self.sandbox }

    pub fn action_space(&self) -> BoxSpace<f32, 1> { BoxSpace::new([-1.0], [1.0]) }

    /// Angle between the pole's up axis and world up, in degrees.
    pub fn pole_tilt_degrees(&self) -> f32 {
        let up = self.sandbox.rotation(self.bodies.pole) * Vector3::y();
        up.angle(&Vector3::y()).to_degrees()
    }

    /// Termination check against the current sandbox state.
    pub fn termination(&self) -> Option<Termination> {
        let x = self.sandbox.local_position(self.bodies.cart).x;
        Termination::evaluate(self.pole_tilt_degrees(), x, &self.config)
    }

    /// Clamp into the action space. Infinities saturate; only NaN is rejected.
    fn clamp_action(&self, action: f32) -> Result<f32> {
        if action.is_nan() {
            return Err(GymError::InvalidAction("action is NaN".into()));
        }
        let space = self.action_space();
        Ok(action.clamp(space.low()[0], space.high()[0]))
    }

    fn move_cart(&mut self, action: f32, dt: f32) {
        let cart = self.bodies.cart;
        let right = self.sandbox.transform_direction(cart, Vector3::x());
        let target = self.sandbox.position(cart) + right * (action * dt * self.config.speed);
        self.sandbox.move_position(cart, target);
    }

    /// One policy step with an explicit tick duration.
    pub fn step_with_duration(&mut self, action: f32, dt: f32) -> Result<Step<Observation>> {
        if self.state == EpisodeState::Terminal {
            warn!(episode = self.telemetry.episode, "step called on a terminal episode");
            return Err(GymError::NotReady("episode is terminal; call reset() first".into()));
        }
        if !(dt.is_finite() && dt > 0.0) {
            return Err(GymError::InvalidConfig(format!("tick duration must be > 0, got {dt}")));
        }
        let a = self.clamp_action(action)?;
        self.move_cart(a, dt);

        let tilt = self.pole_tilt_degrees();
        let x = self.sandbox.local_position(self.bodies.cart).x;
        let termination = Termination::evaluate(tilt, x, &self.config);

        let mut reward = self.config.survival_reward;
        let mut info = Info::new();
        info.insert("pole_tilt_degrees", InfoValue::from(tilt));
        info.insert("applied_action", InfoValue::from(a));
        if let Some(cause) = termination {
            reward = self.config.terminal_reward;
            self.state = EpisodeState::Terminal;
            info.insert("termination", InfoValue::from(cause.as_str()));
            debug!(
                episode = self.telemetry.episode,
                steps = self.telemetry.episode_steps + 1,
                cause = cause.as_str(),
                tilt,
                cart_x = x,
                "episode terminated"
            );
        }

        let observation = self.observe();
        let t = &mut self.telemetry;
        t.observation = observation;
        t.action = a;
        t.reward = reward;
        t.state = self.state;
        t.episode_steps += 1;
        t.episode_return += reward;
        t.termination = termination;

        Ok(Step::new(observation, reward, termination.is_some(), false, info))
    }

    /// Move the cart from a human input axis. No reward, no termination check.
    pub fn manual_move(&mut self, axis: f32) -> Result<f32> {
        let a = self.clamp_action(axis)?;
        self.move_cart(a, self.config.fixed_step_duration);
        self.telemetry.observation = self.observe();
        self.telemetry.action = a;
        Ok(a)
    }

    pub fn render_text(&self) -> String {
        const WIDTH: usize = 41;
        let x = self.telemetry.observation.cart_position;
        let limit = self.config.track_limit;
        let t = ((x + limit) / (2.0 * limit)).clamp(0.0, 1.0);
        let col = (t * (WIDTH - 1) as f32).round() as usize;
        let mut track = vec!['-'; WIDTH];
        track[col] = 'C';
        let track: String = track.into_iter().collect();
        format!(
            "|{}|  x={:+.3}\npole tilt {:+.1} deg  state={:?}  step={}",
            track,
            x,
            self.pole_tilt_degrees(),
            self.state,
            self.telemetry.episode_steps
        )
    }
}

impl<S: PhysicalSandbox> Env for CartPoleEnv<S> {
    type Obs = Observation;
    type Act = f32;

    fn initialize(&mut self) -> Result<()> {
        let CartPoleBodies { cart, pole } = self.bodies;
        if !self.sandbox.contains(cart) {
            return Err(GymError::MissingBody(format!("cart {cart:?} is not attached to the sandbox")));
        }
        if !self.sandbox.contains(pole) {
            return Err(GymError::MissingBody(format!("pole {pole:?} is not attached to the sandbox")));
        }
        if cart == pole {
            return Err(GymError::MissingBody(format!("cart and pole share handle {cart:?}")));
        }
        info!(?cart, ?pole, "cart-pole environment initialized");
        Ok(())
    }

    fn observe(&self) -> Observation {
        let rotation = self.sandbox.local_rotation(self.bodies.pole);
        let pole_angle = match self.config.angle_encoding {
            PoleAngleEncoding::Radians => angle_about_z(&rotation),
            PoleAngleEncoding::QuaternionZ => rotation.quaternion().k,
        };
        let axis = self.sandbox.transform_direction(self.bodies.cart, Vector3::z());
        Observation {
            cart_position: self.sandbox.local_position(self.bodies.cart).x,
            pole_angle,
            pole_angular_velocity: self.sandbox.angular_velocity(self.bodies.pole).dot(&axis),
        }
    }

    fn reset(&mut self, seed: Option<u64>) -> (Self::Obs, Info) {
        if let Some(s) = seed { self.rng = rng_from_seed(s); }
        let CartPoleBodies { cart, pole } = self.bodies;

        self.sandbox.set_local_position(cart, Vector3::zeros());
        self.sandbox.set_velocity(cart, Vector3::zeros());
        self.sandbox.set_angular_velocity(cart, Vector3::zeros());

        let bound = self.config.reset_tilt_degrees;
        let uni = rand::distributions::Uniform::new_inclusive(-bound, bound);
        let tilt = uni.sample(&mut self.rng);
        self.sandbox.set_local_position(pole, self.config.pole_offset);
        self.sandbox.set_local_rotation(pole, UnitQuaternion::from_axis_angle(&Vector3::z_axis(), tilt.to_radians()));
        self.sandbox.set_velocity(pole, Vector3::zeros());
        self.sandbox.set_angular_velocity(pole, Vector3::zeros());

        self.state = EpisodeState::Running;
        let observation = self.observe();
        self.telemetry = Telemetry {
            observation,
            episode: self.telemetry.episode + 1,
            ..Telemetry::default()
        };
        debug!(episode = self.telemetry.episode, tilt, "episode reset");

        let mut info = Info::new();
        info.insert("reset_tilt_degrees", InfoValue::from(tilt));
        (observation, info)
    }

    fn step(&mut self, action: Self::Act) -> Result<Step<Self::Obs>> {
        self.step_with_duration(action, self.config.fixed_step_duration)
    }

    fn render(&self) -> Option<RenderFrame> {
        Some(RenderFrame::Text(self.render_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{RigConfig, Simulate};
    use crate::spaces::Space;

    fn env() -> CartPoleEnv<CartPoleRig> {
        CartPoleEnv::from_rig(CartPoleRig::default(), CartPoleConfig::default()).unwrap()
    }

    fn set_tilt(env: &mut CartPoleEnv<CartPoleRig>, degrees: f32) {
        let pole = env.bodies().pole;
        env.sandbox_mut()
            .set_local_rotation(pole, UnitQuaternion::from_axis_angle(&Vector3::z_axis(), degrees.to_radians()));
    }

    #[test]
    fn reset_zeroes_cart_and_bounds_tilt() {
        let mut e = env();
        for seed in 0..50 {
            let (obs, info) = e.reset(Some(seed));
            assert_eq!(obs.cart_position, 0.0);
            assert_eq!(obs.pole_angular_velocity, 0.0);
            assert!(obs.pole_angle.abs() <= 20f32.to_radians() + 1e-6);
            assert!(e.pole_tilt_degrees() <= 20.0 + 1e-3);
            let reset_tilt = info.get("reset_tilt_degrees").and_then(InfoValue::as_f64).unwrap();
            assert!((reset_tilt.to_radians() as f32 - obs.pole_angle).abs() < 1e-4);
            let (cart, pole) = (e.bodies().cart, e.bodies().pole);
            assert_eq!(e.sandbox().velocity(cart), Vector3::zeros());
            assert_eq!(e.sandbox().velocity(pole), Vector3::zeros());
            assert_eq!(e.sandbox().angular_velocity(pole), Vector3::zeros());
            assert_eq!(e.sandbox().local_position(pole), Vector3::new(0.0, 2.0, 0.0));
            assert_eq!(e.state(), EpisodeState::Running);
        }
    }

    #[test]
    fn step_moves_cart_along_right_axis() {
        let mut e = env();
        set_tilt(&mut e, 0.0);
        let s = e.step(0.5).unwrap();
        // 0.5 * 0.02 * 10
        assert!((s.observation.cart_position - 0.1).abs() < 1e-6);
        assert_eq!(s.reward, 0.01);
        assert!(!s.terminated);
    }

    #[test]
    fn out_of_range_action_is_clamped() {
        let mut e = env();
        set_tilt(&mut e, 0.0);
        let s = e.step(25.0).unwrap();
        assert!((s.observation.cart_position - 0.2).abs() < 1e-6);
        assert_eq!(e.telemetry().action, 1.0);
        let s = e.step(-25.0).unwrap();
        assert!(s.observation.cart_position.abs() < 1e-6);
        assert_eq!(e.telemetry().action, -1.0);
    }

    #[test]
    fn nan_action_is_rejected() {
        let mut e = env();
        assert!(matches!(e.step(f32::NAN), Err(GymError::InvalidAction(_))));
        assert!(matches!(e.manual_move(f32::NAN), Err(GymError::InvalidAction(_))));
        assert_eq!(e.telemetry().episode_steps, 0);
    }

    #[test]
    fn infinite_actions_saturate() {
        let mut e = env();
        let s = e.step(f32::INFINITY).unwrap();
        assert_eq!(e.telemetry().action, 1.0);
        assert!((s.observation.cart_position - 0.2).abs() < 1e-5);
        assert_eq!(e.manual_move(f32::NEG_INFINITY).unwrap(), -1.0);
        assert!(e.observe().cart_position.abs() < 1e-5);
    }

    #[test]
    fn tilt_beyond_sixty_degrees_terminates_with_penalty() {
        let mut e = env();
        set_tilt(&mut e, 61.0);
        let s = e.step(0.0).unwrap();
        assert!(s.terminated);
        assert_eq!(s.reward, -1.0);
        assert_eq!(s.info.get("termination").and_then(InfoValue::as_str), Some("pole_tilt"));
        assert_eq!(e.state(), EpisodeState::Terminal);
    }

    #[test]
    fn tilt_just_under_sixty_degrees_survives() {
        let mut e = env();
        set_tilt(&mut e, 59.9);
        let s = e.step(0.0).unwrap();
        assert!(!s.terminated);
        assert_eq!(s.reward, 0.01);
    }

    #[test]
    fn leaving_the_track_terminates() {
        let mut e = env();
        set_tilt(&mut e, 0.0);
        let cart = e.bodies().cart;
        e.sandbox_mut().set_local_position(cart, Vector3::new(3.95, 0.0, 0.0));
        let s = e.step(1.0).unwrap();
        assert!(s.terminated);
        assert_eq!(s.reward, -1.0);
        assert_eq!(e.termination(), Some(Termination::TrackLimit));
    }

    #[test]
    fn both_failures_reported_together() {
        let cfg = CartPoleConfig::default();
        assert_eq!(Termination::evaluate(70.0, -4.5, &cfg), Some(Termination::PoleTiltAndTrackLimit));
        assert_eq!(Termination::evaluate(60.0, 4.0, &cfg), None);
    }

    #[test]
    fn stepping_a_terminal_episode_requires_reset() {
        let mut e = env();
        set_tilt(&mut e, 80.0);
        assert!(e.step(0.0).unwrap().terminated);
        assert!(matches!(e.step(0.0), Err(GymError::NotReady(_))));
        e.reset(None);
        assert!(e.step(0.0).is_ok());
    }

    #[test]
    fn manual_move_skips_reward_and_termination() {
        let mut e = env();
        set_tilt(&mut e, 85.0);
        let applied = e.manual_move(3.0).unwrap();
        assert_eq!(applied, 1.0);
        assert_eq!(e.state(), EpisodeState::Running);
        assert_eq!(e.telemetry().episode_steps, 0);
        assert_eq!(e.telemetry().reward, 0.0);
        assert!((e.telemetry().observation.cart_position - 0.2).abs() < 1e-6);
    }

    #[test]
    fn missing_bodies_fail_at_construction() {
        let mut rig = CartPoleRig::default();
        rig.detach(rig.pole());
        assert!(matches!(
            CartPoleEnv::from_rig(rig, CartPoleConfig::default()),
            Err(GymError::MissingBody(_))
        ));

        let rig = CartPoleRig::default();
        let bodies = CartPoleBodies { cart: rig.cart(), pole: BodyHandle::from_raw(9) };
        assert!(matches!(
            CartPoleEnv::new(rig, bodies, CartPoleConfig::default()),
            Err(GymError::MissingBody(_))
        ));
    }

    #[test]
    fn invalid_config_fails_at_construction() {
        let cfg = CartPoleConfig { reset_tilt_degrees: 75.0, ..CartPoleConfig::default() };
        assert!(matches!(
            CartPoleEnv::from_rig(CartPoleRig::default(), cfg),
            Err(GymError::InvalidConfig(_))
        ));
    }

    #[test]
    fn quaternion_encoding_reports_half_angle_sine() {
        let cfg = CartPoleConfig { angle_encoding: PoleAngleEncoding::QuaternionZ, ..CartPoleConfig::default() };
        let mut e = CartPoleEnv::from_rig(CartPoleRig::default(), cfg).unwrap();
        set_tilt(&mut e, 30.0);
        let obs = e.observe();
        assert!((obs.pole_angle - 15f32.to_radians().sin()).abs() < 1e-5);
    }

    #[test]
    fn angular_velocity_is_read_about_the_hinge() {
        let mut e = env();
        set_tilt(&mut e, 10.0);
        e.sandbox_mut().advance(0.02);
        let obs = e.observe();
        assert!(obs.pole_angular_velocity > 0.0);
        assert!(obs.pole_angle > 10f32.to_radians());
    }

    #[test]
    fn rotated_track_uses_local_coordinates() {
        let rig = CartPoleRig::new(RigConfig {
            track: crate::sandbox::TrackFrame {
                origin: Vector3::new(-2.0, 1.0, 7.0),
                rotation: UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 0.7),
            },
            ..RigConfig::default()
        })
        .unwrap();
        let mut e = CartPoleEnv::from_rig(rig, CartPoleConfig::default()).unwrap();
        set_tilt(&mut e, 0.0);
        let s = e.step(1.0).unwrap();
        assert!((s.observation.cart_position - 0.2).abs() < 1e-5);
    }

    #[test]
    fn action_space_is_unit_interval() {
        let e = env();
        let space = e.action_space();
        assert_eq!(space.low(), &[-1.0]);
        assert_eq!(space.high(), &[1.0]);
        assert!(space.contains(&[1.0]));
        assert!(!space.contains(&[1.01]));
    }

    #[test]
    fn render_shows_cart_on_track() {
        let e = env();
        match e.render() {
            Some(RenderFrame::Text(s)) => {
                assert!(s.contains('C'));
                assert!(s.contains("state=Running"));
            }
            None => panic!("expected a text frame"),
        }
    }
}
