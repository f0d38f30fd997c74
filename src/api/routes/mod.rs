pub mod alerts;
pub mod auth;
pub mod dashboard;
pub mod health;
pub mod notifiers;
pub mod probe;
pub mod targets;
