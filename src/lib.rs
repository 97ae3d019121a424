pub mod anchor;
pub mod chain;
pub mod config;
pub mod error;
pub mod integrity;
pub mod reconcile;
pub mod server;
pub mod service;
pub mod state;
pub mod status;
