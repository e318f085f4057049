pub mod alerts;
pub mod attendance;
pub mod auth;
pub mod core;
pub mod dashboard;
pub mod directory;
pub mod reports;
pub mod setup;
pub mod students;
