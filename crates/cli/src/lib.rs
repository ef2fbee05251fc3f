//! Process bootstrap for the devtools gateway: CLI, configuration, logging, and
//! the HTTP/WebSocket listener in front of the adapter tree.

pub mod cli;
pub mod config;
pub mod logging;
pub mod server;
