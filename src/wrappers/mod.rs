// Wrappers composing around any Env:
// - TimeLimit: maximum episode steps, reported as truncation
// - RecordEpisodeStatistics: episode return and length injected into Info

use crate::core::{Env, Info, InfoValue, RenderFrame, Result, Step};

/// Marks truncation once an episode reaches `max_steps` without terminating.
pub struct TimeLimit<E: Env> {
    inner: E,
    max_steps: u32,
    steps: u32,
}

impl<E: Env> TimeLimit<E> {
    pub fn new(inner: E, max_steps: u32) -> Self {
        Self { inner, max_steps, steps: 0 }
    }

    pub fn inner(&self) -> &E { &self.inner }
    pub fn inner_mut(&mut self) -> &mut E { &mut self.inner }
    pub fn into_inner(self) -> E { self.inner }
}

impl<E: Env> Env for TimeLimit<E> {
    type Obs = E::Obs;
    type Act = E::Act;

    fn initialize(&mut self) -> Result<()> { self.inner.initialize() }

    fn observe(&self) -> Self::Obs { self.inner.observe() }

    fn reset(&mut self, seed: Option<u64>) -> (Self::Obs, Info) {
        self.steps = 0;
        self.inner.reset(seed)
    }

    fn step(&mut self, action: Self::Act) -> Result<Step<Self::Obs>> {
        let mut s = self.inner.step(action)?;
        self.steps += 1;
        if !s.terminated && !s.truncated && self.steps >= self.max_steps {
            s.truncated = true;
        }
        Ok(s)
    }

    fn render(&self) -> Option<RenderFrame> { self.inner.render() }
    fn close(&mut self) { self.inner.close() }
}

/// Tracks cumulative return and episode length.
/// On episode end (terminated or truncated) it adds to the step's Info:
/// - "episode_return": f64
/// - "episode_length": i64
pub struct RecordEpisodeStatistics<E: Env> {
    inner: E,
    ep_return: f64,
    ep_length: i64,
}

impl<E: Env> RecordEpisodeStatistics<E> {
    pub fn new(inner: E) -> Self { Self { inner, ep_return: 0.0, ep_length: 0 } }

    pub fn inner(&self) -> &E { &self.inner }
    pub fn inner_mut(&mut self) -> &mut E { &mut self.inner }
}

impl<E: Env> Env for RecordEpisodeStatistics<E> {
    type Obs = E::Obs;
    type Act = E::Act;

    fn initialize(&mut self) -> Result<()> { self.inner.initialize() }

    fn observe(&self) -> Self::Obs { self.inner.observe() }

    fn reset(&mut self, seed: Option<u64>) -> (Self::Obs, Info) {
        self.ep_return = 0.0;
        self.ep_length = 0;
        self.inner.reset(seed)
    }

    fn step(&mut self, action: Self::Act) -> Result<Step<Self::Obs>> {
        let mut s = self.inner.step(action)?;
        self.ep_return += s.reward as f64;
        self.ep_length += 1;
        if s.done() {
            s.info.insert("episode_return", InfoValue::from(self.ep_return));
            s.info.insert("episode_length", InfoValue::from(self.ep_length));
            self.ep_return = 0.0;
            self.ep_length = 0;
        }
        Ok(s)
    }

    fn render(&self) -> Option<RenderFrame> { self.inner.render() }
    fn close(&mut self) { self.inner.close() }
}
