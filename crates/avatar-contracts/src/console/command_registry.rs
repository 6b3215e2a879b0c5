#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CommandKind {
    Select,
    Submit,
    Wait,
    Download,
    Status,
    Help,
    Quit,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub kind: CommandKind,
}

pub(crate) const PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "select",
        kind: CommandKind::Select,
    },
    CommandSpec {
        command: "use",
        kind: CommandKind::Select,
    },
    CommandSpec {
        command: "download",
        kind: CommandKind::Download,
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "create",
        kind: CommandKind::Submit,
    },
    CommandSpec {
        command: "submit",
        kind: CommandKind::Submit,
    },
    CommandSpec {
        command: "wait",
        kind: CommandKind::Wait,
    },
    CommandSpec {
        command: "status",
        kind: CommandKind::Status,
    },
    CommandSpec {
        command: "help",
        kind: CommandKind::Help,
    },
    CommandSpec {
        command: "quit",
        kind: CommandKind::Quit,
    },
    CommandSpec {
        command: "exit",
        kind: CommandKind::Quit,
    },
];

pub const CONSOLE_HELP_COMMANDS: &[&str] = &[
    "/select <path>",
    "/create",
    "/wait",
    "/download [dir]",
    "/status",
    "/help",
    "/quit",
];
