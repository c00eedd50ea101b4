//! Decision providers: anything that maps an observation to a cart action.
//!
//! The environment never knows which provider is active. A scripted
//! controller, a human input axis and an out-of-process learned policy all
//! plug in through [`Decision`].

use crate::core::{GymError, Result};
use crate::spaces::{BoxSpace, Space};
use crate::utils::rng::{rng_from_seed, RngStream};

/// Policy interface driven once per tick.
pub trait Decision {
    /// Choose an action for the current observation. `reward` and `done`
    /// describe the previous step.
    fn decide(&mut self, observation: &[f32], reward: f32, done: bool) -> Result<f32>;

    /// Memory carried to the next tick. Stateless providers return an empty buffer.
    fn make_memory(&mut self, _observation: &[f32], _reward: f32, _done: bool, _memory: &[f32]) -> Vec<f32> {
        Vec::new()
    }
}

impl<D: Decision + ?Sized> Decision for Box<D> {
    fn decide(&mut self, observation: &[f32], reward: f32, done: bool) -> Result<f32> {
        (**self).decide(observation, reward, done)
    }

    fn make_memory(&mut self, observation: &[f32], reward: f32, done: bool, memory: &[f32]) -> Vec<f32> {
        (**self).make_memory(observation, reward, done, memory)
    }
}

/// Bang-bang controller on the cart position: stay put inside the deadzone,
/// otherwise drive back toward the origin at full speed.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScriptedDecision;

impl ScriptedDecision {
    /// Half-width of the open interval in which no action is taken.
    pub const DEADZONE: f32 = 0.5;

    pub fn action_for(position: f32) -> f32 {
        if position.abs() < Self::DEADZONE {
            0.0
        } else if position > 0.0 {
            -1.0
        } else {
            1.0
        }
    }
}

impl Decision for ScriptedDecision {
    fn decide(&mut self, observation: &[f32], _reward: f32, _done: bool) -> Result<f32> {
        let position = *observation
            .first()
            .ok_or_else(|| GymError::InvalidObservation("expected at least one element, got none".into()))?;
        if !position.is_finite() {
            return Err(GymError::InvalidObservation(format!("cart position is not finite: {position}")));
        }
        Ok(Self::action_for(position))
    }
}

/// Uniform random actions over [-1, 1]; a baseline for comparing controllers.
pub struct RandomDecision {
    space: BoxSpace<f32, 1>,
    rng: RngStream,
}

impl RandomDecision {
    pub fn new(seed: u64) -> Self {
        Self { space: BoxSpace::new([-1.0], [1.0]), rng: rng_from_seed(seed) }
    }
}

impl Decision for RandomDecision {
    fn decide(&mut self, _observation: &[f32], _reward: f32, _done: bool) -> Result<f32> {
        let [a] = self.space.sample(&mut self.rng);
        Ok(a)
    }
}

/// A continuous input axis, e.g. a keyboard or joystick horizontal axis.
pub trait AxisInput {
    fn axis(&mut self) -> f32;
}

impl<F: FnMut() -> f32> AxisInput for F {
    fn axis(&mut self) -> f32 { self() }
}

/// Human control: the action is whatever the input axis reads.
pub struct ManualDecision<I: AxisInput> {
    input: I,
}

impl<I: AxisInput> ManualDecision<I> {
    pub fn new(input: I) -> Self { Self { input } }

    pub fn input_mut(&mut self) -> &mut I { &mut self.input }
}

impl<I: AxisInput> Decision for ManualDecision<I> {
    fn decide(&mut self, _observation: &[f32], _reward: f32, _done: bool) -> Result<f32> {
        Ok(self.input.axis())
    }
}

/// Adapter for closures, e.g. a learned policy evaluated elsewhere.
pub struct FnDecision<F>
where
    F: FnMut(&[f32], f32, bool) -> Result<f32>,
{
    f: F,
}

impl<F> FnDecision<F>
where
    F: FnMut(&[f32], f32, bool) -> Result<f32>,
{
    pub fn new(f: F) -> Self { Self { f } }
}

impl<F> Decision for FnDecision<F>
where
    F: FnMut(&[f32], f32, bool) -> Result<f32>,
{
    fn decide(&mut self, observation: &[f32], reward: f32, done: bool) -> Result<f32> {
        (self.f)(observation, reward, done)
    }
}
