use nalgebra::{UnitQuaternion, Vector3};
use rust_cartpole::{
    CartPoleBodies, CartPoleConfig, CartPoleEnv, CartPoleRig, ControlLoop, Env, EpisodeState, GymError, InfoValue,
    PhysicalSandbox, ScriptedDecision, Simulate, Termination, TickOutcome,
};

fn rig_env(config: CartPoleConfig) -> CartPoleEnv<CartPoleRig> {
    CartPoleEnv::from_rig(CartPoleRig::default(), config).unwrap()
}

#[test]
fn unattended_pole_falls_under_gravity() {
    // Small initial tilt, no corrective action.
    let config = CartPoleConfig { reset_tilt_degrees: 5.0, ..CartPoleConfig::default() };
    let mut env = rig_env(config);
    env.reset(Some(42));
    assert!(env.pole_tilt_degrees() <= 5.0 + 1e-3);

    let dt = env.config().fixed_step_duration;
    let mut done_at = None;
    for tick in 0..1000 {
        let s = env.step(0.0).unwrap();
        if s.terminated {
            assert_eq!(s.reward, -1.0);
            assert_eq!(s.info.get("termination").and_then(InfoValue::as_str), Some("pole_tilt"));
            done_at = Some(tick);
            break;
        }
        assert_eq!(s.reward, 0.01);
        env.sandbox_mut().advance(dt);
    }
    assert!(done_at.is_some(), "pole never fell");
    assert_eq!(env.termination(), Some(Termination::PoleTilt));
}

#[test]
fn consecutive_resets_differ_only_in_tilt() {
    fn assert_at_rest(env: &CartPoleEnv<CartPoleRig>) {
        let CartPoleBodies { cart, pole } = env.bodies();
        for body in [cart, pole] {
            assert_eq!(env.sandbox().velocity(body), Vector3::zeros());
            assert_eq!(env.sandbox().angular_velocity(body), Vector3::zeros());
        }
    }

    let mut env = rig_env(CartPoleConfig::default());
    env.step(1.0).unwrap();
    env.sandbox_mut().advance(0.02);
    let (a, _) = env.reset(None);
    assert_at_rest(&env);
    env.step(-1.0).unwrap();
    env.sandbox_mut().advance(0.02);
    let (b, _) = env.reset(None);
    assert_at_rest(&env);
    assert_eq!(a.cart_position, 0.0);
    assert_eq!(b.cart_position, 0.0);
    assert_eq!(a.pole_angular_velocity, 0.0);
    assert_eq!(b.pole_angular_velocity, 0.0);
    assert_ne!(a.pole_angle, b.pole_angle);
    assert_eq!(env.telemetry().episode_steps, 0);
}

#[test]
fn reset_after_a_terminal_step_is_fresh() {
    let mut env = rig_env(CartPoleConfig::default());
    let cart = env.bodies().cart;
    for _ in 0..100 {
        let s = env.step(1.0).unwrap();
        env.sandbox_mut().advance(0.02);
        if s.terminated { break; }
    }
    assert_eq!(env.state(), EpisodeState::Terminal);

    let (obs, _) = env.reset(None);
    assert_eq!(env.state(), EpisodeState::Running);
    assert_eq!(obs.cart_position, 0.0);
    assert_eq!(env.sandbox().velocity(cart), Vector3::zeros());
    assert_eq!(env.sandbox().local_position(env.bodies().pole), Vector3::new(0.0, 2.0, 0.0));
    assert_eq!(env.telemetry().termination, None);
}

#[test]
fn same_seed_gives_same_start() {
    let mut env = rig_env(CartPoleConfig::default());
    let (a, _) = env.reset(Some(9));
    env.step(0.7).unwrap();
    let (b, _) = env.reset(Some(9));
    assert_eq!(a, b);
}

#[test]
fn unattached_cart_is_a_configuration_error() {
    let mut rig = CartPoleRig::default();
    let cart = rig.cart();
    rig.detach(cart);
    let bodies = CartPoleBodies { cart, pole: rig.pole() };
    let err = CartPoleEnv::new(rig, bodies, CartPoleConfig::default()).err().unwrap();
    assert!(matches!(err, GymError::MissingBody(_)));
    assert!(err.to_string().contains("cart"));
}

#[test]
fn telemetry_tracks_every_tick() {
    let mut env = rig_env(CartPoleConfig { reset_tilt_degrees: 0.0, ..CartPoleConfig::default() });
    env.step(0.25).unwrap();
    env.step(-2.0).unwrap();
    let t = env.telemetry();
    assert_eq!(t.action, -1.0);
    assert_eq!(t.episode_steps, 2);
    assert!((t.episode_return - 0.02).abs() < 1e-6);
    assert_eq!(t.observation, env.observe());
}

#[test]
fn scripted_controller_keeps_cart_off_the_track_edge() {
    // Kinematic sandbox with the pole clamped upright isolates the cart controller.
    let mut env = rig_env(CartPoleConfig { reset_tilt_degrees: 0.0, ..CartPoleConfig::default() });
    let (cart, pole) = (env.bodies().cart, env.bodies().pole);
    env.sandbox_mut().set_local_position(cart, Vector3::new(3.0, 0.0, 0.0));
    env.sandbox_mut().set_local_position(pole, Vector3::new(3.0, 2.0, 0.0));
    let mut cl = ControlLoop::new(env, ScriptedDecision);
    for _ in 0..50 {
        if let TickOutcome::Stepped(s) = cl.tick().unwrap() {
            assert!(s.observation.cart_position.abs() <= 3.0 + 1e-5);
        }
        let pole = cl.env().bodies().pole;
        let sandbox = cl.env_mut().sandbox_mut();
        sandbox.set_local_rotation(pole, UnitQuaternion::identity());
        sandbox.set_angular_velocity(pole, Vector3::zeros());
    }
    let x = cl.env().observe().cart_position;
    assert!(x.abs() < 0.5, "cart should settle in the deadzone, got {x}");
}
