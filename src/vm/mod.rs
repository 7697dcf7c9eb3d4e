pub mod vm;
pub mod thread;
pub mod class;
pub mod object;
pub mod value;
pub mod instructions;
pub mod class_loader;
pub mod interpreter;
pub mod native;
pub mod natives;
pub mod config;
pub mod error;
pub mod host;

#[cfg(test)]
pub mod testing;
