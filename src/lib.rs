pub mod api;
pub mod artifact_build;
pub mod auth;
pub mod cli;
pub mod cmd;
pub mod config;
pub mod credentials;
pub mod delegate;
pub mod dist;
pub mod error;
pub mod install;
pub mod logging;
pub mod manifest;
pub mod models;
pub mod namespace;
pub mod publish;
pub mod pyproject;
pub mod registry;
pub mod uninstall;
pub mod util;
