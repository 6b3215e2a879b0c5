mod command_parser;
mod command_registry;

pub use command_parser::{parse_command, ConsoleCommand};
pub use command_registry::CONSOLE_HELP_COMMANDS;
