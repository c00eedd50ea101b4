//! Runs the scripted bang-bang controller and a random baseline on the
//! reference rig and logs per-episode summaries.
//!
//! Run: `cargo run --example scripted_balance`
//! Log verbosity is set by `LEVEL`.

use rust_cartpole::{
    CartPoleConfig, CartPoleEnv, CartPoleRig, ControlLoop, Decision, Env, EpisodeSummary, RandomDecision, RenderFrame,
    Result, ScriptedDecision, Simulate, PhysicalSandbox,
};
use tracing::{info, Level};

const LEVEL: Level = Level::INFO;
const EPISODES: usize = 5;
const MAX_TICKS: u32 = 1_000;

fn run<D: Decision>(name: &str, decision: D) -> Result<Vec<EpisodeSummary>> {
    let env = CartPoleEnv::from_rig(CartPoleRig::default(), CartPoleConfig::default())?;
    let mut control = ControlLoop::new(env, decision);
    let mut summaries = Vec::with_capacity(EPISODES);
    for _ in 0..EPISODES {
        let summary = control.run_episode(MAX_TICKS)?;
        info!(
            controller = name,
            episode = summary.episode,
            length = summary.length,
            episode_return = summary.episode_return,
            termination = summary.termination.map(|t| t.as_str()).unwrap_or("none"),
            "episode"
        );
        summaries.push(summary);
    }
    if let Some(RenderFrame::Text(frame)) = control.env().render() {
        println!("{frame}");
    }
    Ok(summaries)
}

fn mean_length(summaries: &[EpisodeSummary]) -> f32 {
    summaries.iter().map(|s| s.length as f32).sum::<f32>() / summaries.len().max(1) as f32
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(LEVEL).init();

    let scripted = run("scripted", ScriptedDecision)?;
    let random = run("random", RandomDecision::new(7))?;
    info!(
        scripted = mean_length(&scripted),
        random = mean_length(&random),
        "mean episode length"
    );

    // Manual mode: push right for half a second without any reward accounting.
    let mut env = CartPoleEnv::from_rig(CartPoleRig::default(), CartPoleConfig::default())?;
    let dt = env.config().fixed_step_duration;
    for _ in 0..25 {
        env.manual_move(1.0)?;
        env.sandbox_mut().advance(dt);
    }
    let cart = env.bodies().cart;
    info!(
        cart_x = env.sandbox().local_position(cart).x,
        steps = env.telemetry().episode_steps,
        "manual drive finished"
    );
    Ok(())
}
