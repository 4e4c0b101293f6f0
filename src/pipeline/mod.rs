// Pipeline: delivery slot, driver loop, and session lifecycle.

pub mod cancel;
pub mod config;
pub mod driver;
pub mod probe;
pub mod session;
pub mod slot;
