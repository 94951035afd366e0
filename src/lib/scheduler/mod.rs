pub mod scheduler;

pub use scheduler::{RoundRobin, Scheduler};
