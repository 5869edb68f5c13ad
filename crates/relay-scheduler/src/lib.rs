pub mod scheduler;

pub use scheduler::{DeadlineScheduler, ScheduledFire, TimeoutHandler};
