pub mod wildfire_message;
pub mod validation;

pub use wildfire_message::{MessageType, WildfireMessage};
