use super::command_registry::{CommandKind, CommandSpec, NO_ARG_COMMANDS, PATH_COMMANDS};

/// One line of console input, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Noop,
    Select { path: String },
    Submit,
    Wait,
    Download { dir: Option<String> },
    Status,
    Help,
    Quit,
    Unknown { command: String, arg: String },
}

fn find_kind(command: &str, specs: &[CommandSpec]) -> Option<CommandKind> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.kind)
}

fn parse_path_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn parse_single_path_arg(arg: &str) -> String {
    let parts = parse_path_args(arg);
    match parts.len() {
        0 => String::new(),
        1 => parts[0].clone(),
        _ => parts.join(" "),
    }
}

/// Slash commands drive the session; any other non-empty line is taken as a
/// path to select.
pub fn parse_command(text: &str) -> ConsoleCommand {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return ConsoleCommand::Noop;
    }

    let Some(slash_tail) = raw_trimmed.strip_prefix('/') else {
        return ConsoleCommand::Select {
            path: parse_single_path_arg(raw_trimmed),
        };
    };

    let command_len = slash_tail
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
        .count();
    if command_len == 0 {
        // Absolute path typed without a command.
        return ConsoleCommand::Select {
            path: parse_single_path_arg(raw_trimmed),
        };
    }

    let command = slash_tail[..command_len].to_ascii_lowercase();
    let remainder = &slash_tail[command_len..];
    if !remainder.is_empty() && !remainder.starts_with(char::is_whitespace) {
        return ConsoleCommand::Select {
            path: parse_single_path_arg(raw_trimmed),
        };
    }
    let arg = remainder.trim();

    if let Some(kind) = find_kind(&command, PATH_COMMANDS) {
        let path = parse_single_path_arg(arg);
        return match kind {
            CommandKind::Download => ConsoleCommand::Download {
                dir: Some(path).filter(|value| !value.is_empty()),
            },
            _ => ConsoleCommand::Select { path },
        };
    }

    if let Some(kind) = find_kind(&command, NO_ARG_COMMANDS) {
        return match kind {
            CommandKind::Submit => ConsoleCommand::Submit,
            CommandKind::Wait => ConsoleCommand::Wait,
            CommandKind::Status => ConsoleCommand::Status,
            CommandKind::Help => ConsoleCommand::Help,
            _ => ConsoleCommand::Quit,
        };
    }

    ConsoleCommand::Unknown {
        command,
        arg: arg.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_command, ConsoleCommand};

    #[test]
    fn parse_select_quoted_path() {
        assert_eq!(
            parse_command("/select \"/tmp/my photo.png\""),
            ConsoleCommand::Select {
                path: "/tmp/my photo.png".to_string()
            }
        );
        assert_eq!(
            parse_command("/use a.png"),
            ConsoleCommand::Select {
                path: "a.png".to_string()
            }
        );
    }

    #[test]
    fn bare_lines_select_files() {
        assert_eq!(
            parse_command("  me.jpg  "),
            ConsoleCommand::Select {
                path: "me.jpg".to_string()
            }
        );
        assert_eq!(
            parse_command("/home/me/photo.png"),
            ConsoleCommand::Select {
                path: "/home/me/photo.png".to_string()
            }
        );
    }

    #[test]
    fn parse_no_arg_commands() {
        assert_eq!(parse_command("/create"), ConsoleCommand::Submit);
        assert_eq!(parse_command("/SUBMIT"), ConsoleCommand::Submit);
        assert_eq!(parse_command("/wait"), ConsoleCommand::Wait);
        assert_eq!(parse_command("/status"), ConsoleCommand::Status);
        assert_eq!(parse_command("/help"), ConsoleCommand::Help);
        assert_eq!(parse_command("/exit"), ConsoleCommand::Quit);
        assert_eq!(parse_command("   "), ConsoleCommand::Noop);
    }

    #[test]
    fn parse_download_with_and_without_dir() {
        assert_eq!(
            parse_command("/download"),
            ConsoleCommand::Download { dir: None }
        );
        assert_eq!(
            parse_command("/download '/tmp/saved avatars'"),
            ConsoleCommand::Download {
                dir: Some("/tmp/saved avatars".to_string())
            }
        );
    }

    #[test]
    fn parse_unknown_command() {
        assert_eq!(
            parse_command("/magic foo bar"),
            ConsoleCommand::Unknown {
                command: "magic".to_string(),
                arg: "foo bar".to_string()
            }
        );
    }
}
