pub mod assignment;
pub mod billing;
pub mod calendar;
pub mod conflicts;
pub mod coordinator;
pub mod locks;
pub mod metrics;
pub mod notify;
pub mod slots;
pub mod sweeper;
