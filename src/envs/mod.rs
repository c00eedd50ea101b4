pub mod cart_pole;

pub use cart_pole::{
    CartPoleBodies, CartPoleConfig, CartPoleEnv, EpisodeState, Observation, PoleAngleEncoding, Telemetry, Termination,
};
