pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod memory;
pub mod provider;
pub mod search;
pub mod session;
pub mod session_loop;
pub mod team;
pub mod telemetry;

#[cfg(test)]
mod tests;
