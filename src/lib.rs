pub mod app;
pub mod components;
pub mod config;
pub mod error;
pub mod handlers;
pub mod shutdown;
pub mod startup;
