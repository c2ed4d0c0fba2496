//! FTP command parser.

/// Command verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    User,
    Pass,
    Pwd,
    Quit,
    /// Anything the server does not implement.
    Unknown,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::User => "USER",
            Verb::Pass => "PASS",
            Verb::Pwd => "PWD",
            Verb::Quit => "QUIT",
            Verb::Unknown => "UNKNOWN",
        }
    }
}

/// Parsed command: a verb and its optional argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub verb: Verb,
    /// Raw remainder after the verb prefix, leading whitespace removed.
    /// `USERNAME bob` is `USER` with argument `NAME bob`.
    pub arg: Option<String>,
}

impl Command {
    fn new(verb: Verb, arg: Option<&str>) -> Self {
        Self {
            verb,
            arg: arg.map(str::to_string),
        }
    }
}

/// Parse one decoded frame into a command.
///
/// Surrounding whitespace (including the CRLF terminator) is stripped.
/// `USER` and `PASS` match by case-sensitive prefix, `PWD` and `QUIT` only
/// exactly. Parsing never fails: unmatched text is `Verb::Unknown`.
pub fn parse(text: &str) -> Command {
    let line = text.trim();

    if let Some(rest) = line.strip_prefix("USER") {
        Command::new(Verb::User, argument(rest))
    } else if let Some(rest) = line.strip_prefix("PASS") {
        Command::new(Verb::Pass, argument(rest))
    } else if line == "PWD" {
        Command::new(Verb::Pwd, None)
    } else if line == "QUIT" {
        Command::new(Verb::Quit, None)
    } else {
        Command::new(Verb::Unknown, None)
    }
}

/// Argument text following a prefix-matched verb, if any.
///
/// This is the raw remainder after the prefix, not a whitespace-delimited
/// token, so nothing is required between the verb and its argument.
fn argument(rest: &str) -> Option<&str> {
    let arg = rest.trim_start();
    if arg.is_empty() {
        None
    } else {
        Some(arg)
    }
}
