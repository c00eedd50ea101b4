//! Capability interface to the physics engine that owns the cart and pole.
//!
//! The environment never integrates physics itself. It reads body state and
//! issues kinematic commands through [`PhysicalSandbox`]; the engine advances
//! its own clock through [`Simulate`].

pub mod rig;

use nalgebra::{UnitQuaternion, Vector3};

pub use rig::{CartPoleRig, RigConfig, TrackFrame};

/// Opaque identifier of a rigid body inside a sandbox.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BodyHandle(usize);

impl BodyHandle {
    pub const fn from_raw(index: usize) -> Self { Self(index) }

    pub const fn index(self) -> usize { self.0 }
}

/// Signed rotation about the z axis, in radians.
pub fn angle_about_z(rotation: &UnitQuaternion<f32>) -> f32 {
    let (_, _, yaw) = rotation.euler_angles();
    yaw
}

/// Read/command access to rigid bodies.
///
/// Local quantities are expressed in the track frame (the parent of both
/// bodies); everything else is in world space. Getters and setters may panic
/// on handles for which [`PhysicalSandbox::contains`] is false, so callers
/// validate handles once up front.
pub trait PhysicalSandbox {
    /// Whether the body exists and is attached to the scene.
    fn contains(&self, body: BodyHandle) -> bool;

    fn position(&self, body: BodyHandle) -> Vector3<f32>;
    fn local_position(&self, body: BodyHandle) -> Vector3<f32>;
    fn rotation(&self, body: BodyHandle) -> UnitQuaternion<f32>;
    fn local_rotation(&self, body: BodyHandle) -> UnitQuaternion<f32>;
    fn velocity(&self, body: BodyHandle) -> Vector3<f32>;
    fn angular_velocity(&self, body: BodyHandle) -> Vector3<f32>;

    /// Map a direction from the body's local axes into world space.
    fn transform_direction(&self, body: BodyHandle, direction: Vector3<f32>) -> Vector3<f32> {
        self.rotation(body) * direction
    }

    /// Kinematic move to a world position, applied immediately.
    fn move_position(&mut self, body: BodyHandle, position: Vector3<f32>);

    /// Teleport; carries no velocity.
    fn set_local_position(&mut self, body: BodyHandle, position: Vector3<f32>);
    fn set_local_rotation(&mut self, body: BodyHandle, rotation: UnitQuaternion<f32>);
    fn set_velocity(&mut self, body: BodyHandle, velocity: Vector3<f32>);
    fn set_angular_velocity(&mut self, body: BodyHandle, angular_velocity: Vector3<f32>);
}

/// A sandbox that can be advanced by one fixed tick.
pub trait Simulate {
    fn advance(&mut self, dt: f32);
}
