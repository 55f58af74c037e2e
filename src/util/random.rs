use rand::RngCore;
#[cfg(test)] use std::sync::Mutex;


#[cfg(test)]
/// automock expectations for static methods are global - hold this lock to avoid races
pub static MOCK_RANDOM_MUTEX: Mutex<()> = Mutex::new(());

/// Source of randomness for agents, pluggable so tests can pin message ids
#[cfg_attr(test, mockall::automock)]
pub trait Random: Send + 'static {
    fn next_u32() -> u32;
}
pub struct RngRandom {}
impl Random for RngRandom {
    fn next_u32() -> u32 {
        rand::thread_rng().next_u32()
    }
}
