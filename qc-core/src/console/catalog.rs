//! Console command table.
//!
//! The parser and the `help` command read the same entries so keywords and
//! usage lines stay in sync.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandTag {
    Start,
    Confirm,
    Reset,
    Status,
    Results,
    Log,
    Save,
    Help,
    Exit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub tag: CommandTag,
    pub usage: &'static str,
    pub summary: &'static str,
}

impl CommandSpec {
    /// Returns `true` when `keyword` names this command (case insensitive).
    #[must_use]
    pub fn matches(&self, keyword: &str) -> bool {
        self.name.eq_ignore_ascii_case(keyword)
            || self
                .aliases
                .iter()
                .any(|alias| alias.eq_ignore_ascii_case(keyword))
    }
}

const COMMANDS: [CommandSpec; 9] = [
    CommandSpec {
        name: "start",
        aliases: &[],
        tag: CommandTag::Start,
        usage: "start",
        summary: "connect to the device and run every configured test",
    },
    CommandSpec {
        name: "confirm",
        aliases: &["continue"],
        tag: CommandTag::Confirm,
        usage: "confirm",
        summary: "acknowledge a device prompt and resume testing",
    },
    CommandSpec {
        name: "reset",
        aliases: &["next"],
        tag: CommandTag::Reset,
        usage: "reset",
        summary: "abandon the current session and prepare for the next device",
    },
    CommandSpec {
        name: "status",
        aliases: &[],
        tag: CommandTag::Status,
        usage: "status",
        summary: "show session phase, progress and any pending prompt",
    },
    CommandSpec {
        name: "results",
        aliases: &[],
        tag: CommandTag::Results,
        usage: "results",
        summary: "list recorded test results",
    },
    CommandSpec {
        name: "log",
        aliases: &[],
        tag: CommandTag::Log,
        usage: "log [count]",
        summary: "print the newest session log entries (default 20)",
    },
    CommandSpec {
        name: "save",
        aliases: &[],
        tag: CommandTag::Save,
        usage: "save",
        summary: "retry persisting the last completed run",
    },
    CommandSpec {
        name: "help",
        aliases: &["?"],
        tag: CommandTag::Help,
        usage: "help [topic]",
        summary: "show help for a command",
    },
    CommandSpec {
        name: "exit",
        aliases: &["quit"],
        tag: CommandTag::Exit,
        usage: "exit",
        summary: "leave the console",
    },
];

/// Returns the full command table.
#[must_use]
pub const fn commands() -> &'static [CommandSpec] {
    &COMMANDS
}

/// Finds a command by name or alias (case insensitive).
#[must_use]
pub fn find(keyword: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|command| command.matches(keyword))
}

/// Renders help for `topic`, or the whole table when no topic is given.
#[must_use]
pub fn help_lines(topic: Option<&str>) -> Vec<String> {
    match topic {
        Some(topic) => match find(topic) {
            Some(spec) => vec![format!("{:<14} - {}", spec.usage, spec.summary)],
            None => vec![format!("no help for '{topic}'; try 'help'")],
        },
        None => COMMANDS
            .iter()
            .map(|spec| format!("{:<14} - {}", spec.usage, spec.summary))
            .collect(),
    }
}
