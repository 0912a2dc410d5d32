pub mod aggregate;
pub mod api;
pub mod bootstrap;
pub mod config;
pub mod ollama;
pub mod planner;
pub mod services;
pub mod tools;
