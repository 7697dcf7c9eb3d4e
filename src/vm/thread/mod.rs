pub mod frame;
pub mod monitor;
pub mod scheduler;
pub mod thread;
pub mod timer;

#[cfg(test)]
mod tests;
