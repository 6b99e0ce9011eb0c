pub mod commands;

pub use commands::{build_cli, handle_offline_commands, handle_subcommands};
