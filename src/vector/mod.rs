// Vectorized environments: N independent copies stepped in lockstep.
// Each copy owns its own sandbox; nothing mutable is shared between them.

use crate::core::{Env, GymError, Info, RenderFrame, Result, Step};
use crate::utils::rng::SeedSequence;

/// Runs N copies of an environment in the current thread.
///
/// - Construct with `SyncVectorEnv::new(n, |i| make_env(i))`
/// - Step with a batch of actions: `step_all(actions)`
/// - Reset all envs (optionally from a root seed): `reset_all(Some(0))`
pub struct SyncVectorEnv<E: Env> {
    envs: Vec<E>,
}

impl<E: Env> SyncVectorEnv<E> {
    /// Create N copies using a fallible factory that receives the copy index.
    pub fn new<F>(n: usize, mut factory: F) -> Result<Self>
    where
        F: FnMut(usize) -> Result<E>,
    {
        let envs = (0..n).map(&mut factory).collect::<Result<Vec<_>>>()?;
        Ok(Self { envs })
    }

    pub fn len(&self) -> usize { self.envs.len() }
    pub fn is_empty(&self) -> bool { self.envs.is_empty() }

    /// Reset all environments. With a root seed, each env gets its own
    /// sub-seed derived through [`SeedSequence`].
    pub fn reset_all(&mut self, root_seed: Option<u64>) -> Vec<(E::Obs, Info)> {
        let seeds: Vec<Option<u64>> = match root_seed {
            Some(s) => SeedSequence::new(s).split_n(self.envs.len()).into_iter().map(Some).collect(),
            None => vec![None; self.envs.len()],
        };
        self.envs
            .iter_mut()
            .zip(seeds)
            .map(|(e, seed)| e.reset(seed))
            .collect()
    }

    /// Step all environments with a batch of actions, one per environment.
    pub fn step_all(&mut self, actions: Vec<E::Act>) -> Result<Vec<Step<E::Obs>>> {
        if actions.len() != self.envs.len() {
            return Err(GymError::InvalidAction(format!(
                "expected {} actions, got {}",
                self.envs.len(),
                actions.len()
            )));
        }
        self.envs
            .iter_mut()
            .zip(actions)
            .map(|(e, a)| e.step(a))
            .collect()
    }

    pub fn observe_all(&self) -> Vec<E::Obs> {
        self.envs.iter().map(|e| e.observe()).collect()
    }

    pub fn render_all(&self) -> Vec<Option<RenderFrame>> {
        self.envs.iter().map(|e| e.render()).collect()
    }

    pub fn close_all(&mut self) {
        for e in &mut self.envs { e.close(); }
    }

    pub fn envs(&self) -> &[E] { &self.envs }
    pub fn envs_mut(&mut self) -> &mut [E] { &mut self.envs }
}
