// awsx - library root for testing

pub mod auth;
pub mod commands;
pub mod config;
pub mod credentials_file;
pub mod error;
pub mod profiles;
pub mod prompt;
pub mod sso;
pub mod usage;
