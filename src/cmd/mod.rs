pub mod config;
pub mod login;
