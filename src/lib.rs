pub mod app;
pub mod audit;
pub mod auth;
pub mod bootstrap;
pub mod codec;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod org;
pub mod permission;
pub mod role;
pub mod upload;

#[cfg(test)]
pub mod testing;
