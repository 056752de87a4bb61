pub mod config;
pub mod db;
pub mod ipc;
pub mod rebuild;
pub mod schedule;
pub mod settings;
