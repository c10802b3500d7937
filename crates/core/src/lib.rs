#![forbid(unsafe_code)]

pub mod attendance;
pub mod error;
pub mod model;
pub mod planner;
pub mod scheduler;
pub mod settings;
pub mod time;

pub use error::Error;
pub use time::Clock;
