use std::fmt::{Debug, Formatter};
use std::ops::{Add, Mul, Sub};

use crate::timing::Timestamp;

pub mod wildfire_mobility;

pub use wildfire_mobility::WildfireMobilityModel;


#[derive(Copy, Clone, PartialEq, Default)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 { x: 0.0, y: 0.0, z: 0.0 };

    pub const fn new(x: f64, y: f64, z: f64) -> Vector3 {
        Vector3 { x, y, z }
    }

    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn distance_to(&self, other: Vector3) -> f64 {
        (other - *self).length()
    }
}

impl Debug for Vector3 {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

impl Add for Vector3 {
    type Output = Vector3;

    fn add(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vector3 {
    type Output = Vector3;

    fn sub(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vector3 {
    type Output = Vector3;

    fn mul(self, rhs: f64) -> Vector3 {
        Vector3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}


/// Capability of anything that has a (possibly moving) position on the timeline. This is what an
///  external position sampling subsystem (adjacency / collision detection etc.) queries.
pub trait Positioned {
    fn position(&self, now: Timestamp) -> Vector3;

    /// velocity in units per millisecond
    fn velocity(&self) -> Vector3;

    fn set_position(&mut self, now: Timestamp, position: Vector3);
}

/// Called with the new anchor position and the current velocity whenever a mobility model's
///  course is changed from the outside
#[cfg_attr(test, mockall::automock)]
pub trait CourseChangeListener: Send + Sync + 'static {
    fn on_course_change(&self, position: Vector3, velocity: Vector3);
}

/// The part of a mobility model a client needs for heading towards an alert's epicenter
#[cfg_attr(test, mockall::automock)]
pub trait MobilityTarget: Send + Sync + 'static {
    fn set_destination_velocity(&self, now: Timestamp, destination: Vector3, speed: f64);
}
