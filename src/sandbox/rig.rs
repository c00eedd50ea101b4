use nalgebra::{UnitQuaternion, Vector3};

use crate::core::{GymError, Result};
use crate::sandbox::{angle_about_z, BodyHandle, PhysicalSandbox, Simulate};

/// Placement of the track in the world. Both bodies are children of it.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackFrame {
    pub origin: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
}

impl Default for TrackFrame {
    fn default() -> Self {
        Self { origin: Vector3::zeros(), rotation: UnitQuaternion::identity() }
    }
}

impl TrackFrame {
    pub fn to_world(&self, local: Vector3<f32>) -> Vector3<f32> {
        self.origin + self.rotation * local
    }

    pub fn to_local(&self, world: Vector3<f32>) -> Vector3<f32> {
        self.rotation.inverse() * (world - self.origin)
    }
}

/// Physical constants of the reference rig.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RigConfig {
    /// Magnitude of gravity along world -y (9.81).
    pub gravity: f32,
    /// Full length of the pole, modelled as a uniform rod hinged at one end.
    pub pole_length: f32,
    /// Initial hinge position relative to the cart, in the track frame.
    pub pole_mount: Vector3<f32>,
    /// The pole rests on the track once it swings this far from upright.
    pub max_deflection_degrees: f32,
    pub track: TrackFrame,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            gravity: 9.81,
            pole_length: 2.0,
            pole_mount: Vector3::new(0.0, 2.0, 0.0),
            max_deflection_degrees: 90.0,
            track: TrackFrame::default(),
        }
    }
}

impl RigConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.gravity.is_finite() && self.gravity >= 0.0) {
            return Err(GymError::InvalidConfig(format!("gravity must be finite and >= 0, got {}", self.gravity)));
        }
        if !(self.pole_length.is_finite() && self.pole_length > 0.0) {
            return Err(GymError::InvalidConfig(format!("pole_length must be > 0, got {}", self.pole_length)));
        }
        if !(self.max_deflection_degrees > 0.0 && self.max_deflection_degrees <= 180.0) {
            return Err(GymError::InvalidConfig(format!(
                "max_deflection_degrees must be in (0, 180], got {}",
                self.max_deflection_degrees
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
struct Body {
    local_position: Vector3<f32>,
    local_rotation: UnitQuaternion<f32>,
    velocity: Vector3<f32>,
    angular_velocity: Vector3<f32>,
    // World-space kinematic displacement since the last tick.
    pending_displacement: Vector3<f32>,
    attached: bool,
}

impl Body {
    fn at(local_position: Vector3<f32>) -> Self {
        Self {
            local_position,
            local_rotation: UnitQuaternion::identity(),
            velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            pending_displacement: Vector3::zeros(),
            attached: true,
        }
    }
}

/// In-process sandbox: a kinematic cart on a track and a pole hinged on top
/// of it, falling under gravity and reacting to the cart's acceleration.
///
/// The hinge axis is the track frame's z axis. Cart motion comes only from
/// position commands; its velocity is derived from the displacement between
/// ticks.
#[derive(Clone, Debug)]
pub struct CartPoleRig {
    config: RigConfig,
    bodies: Vec<Body>,
    cart: BodyHandle,
    pole: BodyHandle,
    hinge_offset: Vector3<f32>,
}

impl Default for CartPoleRig {
    fn default() -> Self { Self::build(RigConfig::default()) }
}

impl CartPoleRig {
    pub fn new(config: RigConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: RigConfig) -> Self {
        let bodies = vec![Body::at(Vector3::zeros()), Body::at(config.pole_mount)];
        let hinge_offset = config.pole_mount;
        Self {
            config,
            bodies,
            cart: BodyHandle::from_raw(0),
            pole: BodyHandle::from_raw(1),
            hinge_offset,
        }
    }

    pub fn cart(&self) -> BodyHandle { self.cart }
    pub fn pole(&self) -> BodyHandle { self.pole }
    pub fn config(&self) -> &RigConfig { &self.config }

    /// Remove a body from the scene. Its handle stops being valid.
    pub fn detach(&mut self, body: BodyHandle) {
        if let Some(b) = self.bodies.get_mut(body.index()) {
            b.attached = false;
        }
    }

    fn hinge_axis(&self) -> Vector3<f32> {
        self.config.track.rotation * Vector3::z()
    }

    fn body(&self, body: BodyHandle) -> &Body {
        &self.bodies[body.index()]
    }

    fn body_mut(&mut self, body: BodyHandle) -> &mut Body {
        &mut self.bodies[body.index()]
    }
}

impl PhysicalSandbox for CartPoleRig {
    fn contains(&self, body: BodyHandle) -> bool {
        self.bodies.get(body.index()).is_some_and(|b| b.attached)
    }

    fn position(&self, body: BodyHandle) -> Vector3<f32> {
        self.config.track.to_world(self.body(body).local_position)
    }

    fn local_position(&self, body: BodyHandle) -> Vector3<f32> {
        self.body(body).local_position
    }

    fn rotation(&self, body: BodyHandle) -> UnitQuaternion<f32> {
        self.config.track.rotation * self.body(body).local_rotation
    }

    fn local_rotation(&self, body: BodyHandle) -> UnitQuaternion<f32> {
        self.body(body).local_rotation
    }

    fn velocity(&self, body: BodyHandle) -> Vector3<f32> {
        self.body(body).velocity
    }

    fn angular_velocity(&self, body: BodyHandle) -> Vector3<f32> {
        self.body(body).angular_velocity
    }

    fn move_position(&mut self, body: BodyHandle, position: Vector3<f32>) {
        let current = self.position(body);
        let local = self.config.track.to_local(position);
        let b = self.body_mut(body);
        b.pending_displacement += position - current;
        b.local_position = local;
        if body == self.pole {
            self.hinge_offset = local - self.bodies[self.cart.index()].local_position;
        }
    }

    fn set_local_position(&mut self, body: BodyHandle, position: Vector3<f32>) {
        let b = self.body_mut(body);
        b.local_position = position;
        b.pending_displacement = Vector3::zeros();
        if body == self.pole {
            self.hinge_offset = position - self.bodies[self.cart.index()].local_position;
        }
    }

    fn set_local_rotation(&mut self, body: BodyHandle, rotation: UnitQuaternion<f32>) {
        self.body_mut(body).local_rotation = rotation;
    }

    fn set_velocity(&mut self, body: BodyHandle, velocity: Vector3<f32>) {
        let b = self.body_mut(body);
        b.velocity = velocity;
        b.pending_displacement = Vector3::zeros();
    }

    fn set_angular_velocity(&mut self, body: BodyHandle, angular_velocity: Vector3<f32>) {
        self.body_mut(body).angular_velocity = angular_velocity;
    }
}

impl Simulate for CartPoleRig {
    fn advance(&mut self, dt: f32) {
        if !(dt > 0.0) { return; }
        let frame = self.config.track;
        let axis = self.hinge_axis();

        // Cart: velocity from the commanded displacement, acceleration from the velocity change.
        let cart = &mut self.bodies[self.cart.index()];
        let velocity = cart.pending_displacement / dt;
        let acceleration = (velocity - cart.velocity) / dt;
        cart.velocity = velocity;
        cart.pending_displacement = Vector3::zeros();
        let cart_local = cart.local_position;
        let pivot_acceleration = (frame.rotation.inverse() * acceleration).x;

        // Pole: uniform rod about its end, I = m L^2 / 3.
        // theta_dd = 3 / (2 L) * (g sin(theta) + a_pivot cos(theta))
        let length = self.config.pole_length;
        let gravity = self.config.gravity;
        let limit = self.config.max_deflection_degrees.to_radians();
        let hinge_offset = self.hinge_offset;
        let pole = &mut self.bodies[self.pole.index()];
        let theta = angle_about_z(&pole.local_rotation);
        let omega = pole.angular_velocity.dot(&axis);
        let alpha = 1.5 / length * (gravity * theta.sin() + pivot_acceleration * theta.cos());

        let mut omega = omega + alpha * dt;
        let mut theta = theta + omega * dt;
        if theta.abs() >= limit {
            theta = limit.copysign(theta);
            omega = 0.0;
        }

        pole.local_rotation = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), theta);
        pole.angular_velocity = axis * omega;
        pole.local_position = cart_local + hinge_offset;
        pole.velocity = velocity;
        pole.pending_displacement = Vector3::zeros();
    }
}
