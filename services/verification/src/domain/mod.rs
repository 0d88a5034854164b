pub mod clock;
pub mod metrics;
pub mod repository;
pub mod types;
