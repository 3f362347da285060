pub mod adapters;
pub mod api;
pub mod auth;
pub mod commands;
pub mod config;
pub mod domain;
pub mod ports;
