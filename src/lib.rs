pub mod core;
pub mod spaces;
pub mod utils;
pub mod sandbox;
pub mod envs;
pub mod decision;
pub mod runner;
pub mod wrappers;
pub mod vector;

pub use crate::core::{Env, GymError, Info, InfoValue, RenderFrame, Result, Step};
pub use crate::spaces::{BoxSpace, Space};
pub use crate::sandbox::{BodyHandle, CartPoleRig, PhysicalSandbox, RigConfig, Simulate, TrackFrame};
pub use crate::envs::{
    CartPoleBodies, CartPoleConfig, CartPoleEnv, EpisodeState, Observation, PoleAngleEncoding, Telemetry, Termination,
};
pub use crate::decision::{AxisInput, Decision, FnDecision, ManualDecision, RandomDecision, ScriptedDecision};
pub use crate::runner::{ControlLoop, EpisodeSummary, TickOutcome};
pub use crate::wrappers::{RecordEpisodeStatistics, TimeLimit};
pub use crate::vector::SyncVectorEnv;
