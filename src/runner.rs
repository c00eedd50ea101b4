//! Fixed-tick control loop gluing a decision provider, the environment and
//! the sandbox clock together.
//!
//! Each tick: observe, decide, step (or manual move), then advance physics
//! by `fixed_step_duration`. A terminal episode is reset at the start of the
//! next tick when `reset_on_done` is set.

use tracing::debug;

use crate::core::{Env, Result, Step};
use crate::decision::{AxisInput, Decision};
use crate::envs::{CartPoleEnv, EpisodeState, Observation, Termination};
use crate::sandbox::{PhysicalSandbox, Simulate};

/// What happened during one tick.
#[derive(Clone, Debug, PartialEq)]
pub enum TickOutcome {
    Stepped(Step<Observation>),
    /// Manual override was active; no reward was computed.
    Manual { action: f32 },
}

/// Result of one episode driven by [`ControlLoop::run_episode`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EpisodeSummary {
    pub episode: u64,
    pub length: u32,
    pub episode_return: f32,
    pub termination: Option<Termination>,
    /// The tick budget ran out before a terminal step.
    pub truncated: bool,
}

pub struct ControlLoop<S, D>
where
    S: PhysicalSandbox + Simulate,
    D: Decision,
{
    env: CartPoleEnv<S>,
    decision: D,
    manual: Option<Box<dyn AxisInput>>,
    reset_on_done: bool,
    last_reward: f32,
    last_done: bool,
    memory: Vec<f32>,
}

impl<S, D> ControlLoop<S, D>
where
    S: PhysicalSandbox + Simulate,
    D: Decision,
{
    pub fn new(env: CartPoleEnv<S>, decision: D) -> Self {
        Self {
            env,
            decision,
            manual: None,
            reset_on_done: true,
            last_reward: 0.0,
            last_done: false,
            memory: Vec::new(),
        }
    }

    pub fn with_reset_on_done(mut self, reset_on_done: bool) -> Self {
        self.reset_on_done = reset_on_done;
        self
    }

    /// Enable (Some) or disable (None) manual override.
    pub fn set_manual(&mut self, input: Option<Box<dyn AxisInput>>) {
        self.manual = input;
    }

    pub fn is_manual(&self) -> bool { self.manual.is_some() }

    pub fn env(&self) -> &CartPoleEnv<S> { &self.env }
    pub fn env_mut(&mut self) -> &mut CartPoleEnv<S> { &mut self.env }
    pub fn decision_mut(&mut self) -> &mut D { &mut self.decision }
    pub fn memory(&self) -> &[f32] { &self.memory }

    pub fn into_parts(self) -> (CartPoleEnv<S>, D) { (self.env, self.decision) }

    /// Reset the env and forget the previous episode's reward, done flag and memory.
    fn start_episode(&mut self) {
        self.env.reset(None);
        self.last_reward = 0.0;
        self.last_done = false;
        self.memory.clear();
    }

    pub fn tick(&mut self) -> Result<TickOutcome> {
        if self.reset_on_done && self.env.state() == EpisodeState::Terminal {
            self.start_episode();
        }
        let dt = self.env.config().fixed_step_duration;

        let outcome = match self.manual.as_mut() {
            Some(input) => {
                let action = self.env.manual_move(input.axis())?;
                TickOutcome::Manual { action }
            }
            None => {
                let observation = self.env.observe().to_array();
                let action = self.decision.decide(&observation, self.last_reward, self.last_done)?;
                self.memory = self
                    .decision
                    .make_memory(&observation, self.last_reward, self.last_done, &self.memory);
                let step = self.env.step_with_duration(action, dt)?;
                self.last_reward = step.reward;
                self.last_done = step.terminated;
                TickOutcome::Stepped(step)
            }
        };

        self.env.sandbox_mut().advance(dt);
        Ok(outcome)
    }

    /// Run until a terminal step or until `max_ticks` policy steps elapse.
    pub fn run_episode(&mut self, max_ticks: u32) -> Result<EpisodeSummary> {
        if self.env.state() == EpisodeState::Terminal {
            self.start_episode();
        }
        let mut truncated = true;
        for _ in 0..max_ticks {
            if let TickOutcome::Stepped(step) = self.tick()? {
                if step.terminated {
                    truncated = false;
                    break;
                }
            }
        }

        let t = self.env.telemetry();
        let summary = EpisodeSummary {
            episode: t.episode,
            length: t.episode_steps,
            episode_return: t.episode_return,
            termination: t.termination,
            truncated,
        };
        debug!(
            episode = summary.episode,
            length = summary.length,
            episode_return = summary.episode_return,
            truncated,
            "episode finished"
        );
        if truncated {
            self.start_episode();
        }
        Ok(summary)
    }
}
