use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, trace};

use crate::mobility::{CourseChangeListener, MobilityTarget, Positioned, Vector3};
use crate::timing::Timestamp;

/// Delay between learning of a destination and starting to move towards it
pub const ACTIVATION_DELAY: Duration = Duration::from_secs(5);

/// Linear extrapolation from a captured start time and position.
///
/// NB: The model is 2D - the heading is computed in the x/y plane, and z stays at the anchor's z.
///      Movement is not clamped at the destination: a node keeps going past it.
pub struct WildfireMobilityModel {
    start_time: Timestamp,
    start_position: Vector3,
    /// units per millisecond
    velocity: Vector3,
    destination: Vector3,
    theta: f64,
    listeners: Vec<Arc<dyn CourseChangeListener>>,
}

impl Default for WildfireMobilityModel {
    fn default() -> Self {
        Self::new(Vector3::ZERO)
    }
}

impl WildfireMobilityModel {
    pub fn new(position: Vector3) -> WildfireMobilityModel {
        WildfireMobilityModel {
            start_time: Timestamp::ZERO,
            start_position: position,
            velocity: Vector3::ZERO,
            destination: position,
            theta: 0.0,
            listeners: Vec::new(),
        }
    }

    pub fn add_course_change_listener(&mut self, listener: Arc<dyn CourseChangeListener>) {
        self.listeners.push(listener);
    }

    pub fn destination(&self) -> Vector3 {
        self.destination
    }

    /// heading in radians, measured counterclockwise from the x axis
    pub fn heading(&self) -> f64 {
        self.theta
    }

    pub fn start_time(&self) -> Timestamp {
        self.start_time
    }

    /// Heads from the captured start position towards `destination` at `speed` units per second,
    ///  starting [ACTIVATION_DELAY] after `now`. Until then the position stays where it is.
    pub fn set_destination_velocity(&mut self, now: Timestamp, destination: Vector3, speed: f64) {
        self.destination = destination;

        let delta = destination - self.start_position;
        self.theta = delta.y.atan2(delta.x);

        let per_milli = speed / 1000.0;
        self.velocity = Vector3::new(self.theta.cos() * per_milli, self.theta.sin() * per_milli, 0.0);
        self.start_time = now + ACTIVATION_DELAY;

        debug!(?destination, theta = self.theta, velocity = ?self.velocity, start_time = ?self.start_time, "destination set");
    }

    fn notify_course_change(&self) {
        for l in &self.listeners {
            l.on_course_change(self.start_position, self.velocity);
        }
    }
}

impl Positioned for WildfireMobilityModel {
    fn position(&self, now: Timestamp) -> Vector3 {
        let elapsed_millis = now.millis_since(self.start_time);
        if elapsed_millis < 0.0 {
            return self.start_position;
        }
        self.start_position + self.velocity * elapsed_millis
    }

    fn velocity(&self) -> Vector3 {
        self.velocity
    }

    /// Re-anchors the model at `position`, keeping the current velocity. Any pending activation
    ///  delay is dropped: extrapolation continues from `now`.
    fn set_position(&mut self, now: Timestamp, position: Vector3) {
        trace!(?position, ?now, "position set");
        self.start_time = now;
        self.start_position = position;
        self.notify_course_change();
    }
}

impl MobilityTarget for Mutex<WildfireMobilityModel> {
    fn set_destination_velocity(&self, now: Timestamp, destination: Vector3, speed: f64) {
        self.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .set_destination_velocity(now, destination, speed);
    }
}
