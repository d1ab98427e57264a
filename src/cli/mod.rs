pub mod app;
pub mod commands;

pub use app::{App, Config, ConnectionSettings};
pub use commands::{Cli, Commands, KeyCommand};
