pub mod configurations;
pub mod core;
pub mod courses;
pub mod rebuild;
pub mod schedule;
pub mod setup;
pub mod special_days;
