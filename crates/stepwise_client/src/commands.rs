#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    New,
    Sessions,
    Load(String),
    Rename(String),
    Delete(String),
    Confirm(Option<String>),
    CancelAction,
    Quit,
    /// Known command given without its required argument.
    MissingArgument(&'static str),
    Unknown(String),
}

pub const HELP_TEXT: &str = "Commands: /help, /new, /sessions, /load <id>, /rename <id>, \
/delete <id>, /confirm [name], /cancel-action, /quit";

pub fn parse_slash_command(input: &str) -> Option<SlashCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let (command, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (trimmed, ""),
    };
    let argument = (!rest.is_empty()).then(|| rest.to_string());

    let parsed = match command {
        "/help" => SlashCommand::Help,
        "/new" => SlashCommand::New,
        "/sessions" => SlashCommand::Sessions,
        "/load" => argument.map_or(SlashCommand::MissingArgument("/load <id>"), SlashCommand::Load),
        "/rename" => argument.map_or(
            SlashCommand::MissingArgument("/rename <id>"),
            SlashCommand::Rename,
        ),
        "/delete" => argument.map_or(
            SlashCommand::MissingArgument("/delete <id>"),
            SlashCommand::Delete,
        ),
        "/confirm" => SlashCommand::Confirm(argument),
        "/cancel-action" => SlashCommand::CancelAction,
        "/quit" => SlashCommand::Quit,
        _ => SlashCommand::Unknown(command.to_string()),
    };

    Some(parsed)
}
