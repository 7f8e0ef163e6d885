pub mod alerts;
pub mod health;
pub mod monitor;
pub mod readings;
