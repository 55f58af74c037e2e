pub mod agent;
pub mod message;
pub mod mobility;
pub mod observer;
pub mod runtime;
pub mod sim;
pub mod test_util;
pub mod timing;
pub mod util;
