// Camera domain: backend contract, raw frame views, and test backends.

pub mod backend;
pub mod delegate;
pub mod dummy;
pub mod error;
pub mod mock;
pub mod types;
