//! FTP command dispatcher.
//!
//! Maps a parsed command to its status line. Every response is a fixed
//! three-digit code plus message; only `PWD` reads anything outside the
//! command itself (the process working directory).

use super::parser::{Command, Verb};
use crate::error::HandlerError;
use std::borrow::Cow;
use std::io;
use std::path::PathBuf;

/// Login progress of a peer. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum AuthState {
    #[default]
    Unauthenticated,
    UsernameReceived,
    Authenticated,
}

impl AuthState {
    /// State after `verb` is received. Never regresses.
    pub fn advance(self, verb: Verb) -> AuthState {
        let next = match verb {
            Verb::User => AuthState::UsernameReceived,
            Verb::Pass => AuthState::Authenticated,
            _ => self,
        };
        self.max(next)
    }
}

/// What the event loop does with the connection after replying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    KeepOpen,
    Close,
}

/// One status line plus the connection action that follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub message: Cow<'static, str>,
    pub action: Action,
}

impl Reply {
    const fn fixed(code: u16, message: &'static str) -> Self {
        Self {
            code,
            message: Cow::Borrowed(message),
            action: Action::KeepOpen,
        }
    }

    /// Sent unprompted when a peer is accepted.
    pub const fn welcome() -> Self {
        Self::fixed(220, "Welcome to the FTP server")
    }

    pub const fn need_password() -> Self {
        Self::fixed(331, "Username OK, need password")
    }

    pub const fn logged_in() -> Self {
        Self::fixed(230, "User logged in")
    }

    pub fn working_directory(path: String) -> Self {
        Self {
            code: 257,
            message: Cow::Owned(format!("\"{path}\"")),
            action: Action::KeepOpen,
        }
    }

    pub const fn goodbye() -> Self {
        Self {
            code: 221,
            message: Cow::Borrowed("Goodbye"),
            action: Action::Close,
        }
    }

    pub const fn not_implemented() -> Self {
        Self::fixed(502, "Command not implemented")
    }

    /// Sent for undecodable frames and handler failures.
    pub const fn internal_error() -> Self {
        Self::fixed(500, "Internal server error")
    }

    /// The status line as it goes on the wire, before compression.
    pub fn line(&self) -> String {
        format!("{} {}\r\n", self.code, self.message)
    }
}

/// Source of the directory reported by `PWD`.
pub type CwdSource = fn() -> io::Result<PathBuf>;

/// Stateless command dispatcher shared by all peers.
#[derive(Debug, Clone, Copy)]
pub struct Dispatcher {
    cwd: CwdSource,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Dispatcher reporting the process working directory.
    pub fn new() -> Self {
        Self {
            cwd: std::env::current_dir,
        }
    }

    /// Dispatcher reporting whatever `cwd` returns.
    #[cfg(test)]
    pub fn with_cwd(cwd: CwdSource) -> Self {
        Self { cwd }
    }

    /// Produce the reply for `command` and advance the peer's login state.
    ///
    /// Commands are served whatever the login state; the arguments of
    /// `USER` and `PASS` are not inspected.
    pub fn dispatch(&self, auth: &mut AuthState, command: &Command) -> Result<Reply, HandlerError> {
        let reply = match command.verb {
            Verb::User => Reply::need_password(),
            Verb::Pass => Reply::logged_in(),
            Verb::Pwd => Reply::working_directory(self.working_directory()?),
            Verb::Quit => Reply::goodbye(),
            Verb::Unknown => Reply::not_implemented(),
        };
        *auth = auth.advance(command.verb);
        Ok(reply)
    }

    fn working_directory(&self) -> Result<String, HandlerError> {
        let path = (self.cwd)().map_err(HandlerError::WorkingDirectory)?;
        match path.to_str() {
            Some(s) if s.is_ascii() => Ok(s.to_string()),
            _ => Err(HandlerError::NonAsciiPath),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::ftp::parser::parse;

    fn mock_dir() -> io::Result<PathBuf> {
        Ok(PathBuf::from("/mock/directory"))
    }

    fn dispatch_line(text: &str) -> String {
        let mut auth = AuthState::default();
        Dispatcher::with_cwd(mock_dir)
            .dispatch(&mut auth, &parse(text))
            .unwrap()
            .line()
    }

    #[test]
    fn test_user() {
        assert_eq!(dispatch_line("USER valid_username\r\n"), "331 Username OK, need password\r\n");
        assert_eq!(dispatch_line("USER x"), "331 Username OK, need password\r\n");
    }

    #[test]
    fn test_pass() {
        assert_eq!(dispatch_line("PASS valid_password\r\n"), "230 User logged in\r\n");
    }

    #[test]
    fn test_pwd() {
        assert_eq!(dispatch_line("PWD\r\n"), "257 \"/mock/directory\"\r\n");
    }

    #[test]
    fn test_pwd_is_idempotent() {
        let dispatcher = Dispatcher::with_cwd(mock_dir);
        let mut auth = AuthState::Authenticated;
        let cmd = parse("PWD");
        let first = dispatcher.dispatch(&mut auth, &cmd).unwrap();
        let second = dispatcher.dispatch(&mut auth, &cmd).unwrap();
        assert_eq!(first, second);
        assert_eq!(auth, AuthState::Authenticated);
    }

    #[test]
    fn test_pwd_reports_process_directory() {
        let expected = std::env::current_dir().unwrap();
        let mut auth = AuthState::default();
        let result = Dispatcher::new().dispatch(&mut auth, &parse("PWD"));
        match expected.to_str().filter(|s| s.is_ascii()) {
            Some(dir) => assert_eq!(result.unwrap().line(), format!("257 \"{dir}\"\r\n")),
            None => assert!(matches!(result, Err(HandlerError::NonAsciiPath))),
        }
    }

    #[test]
    fn test_quit_closes() {
        let mut auth = AuthState::default();
        let reply = Dispatcher::new().dispatch(&mut auth, &parse("QUIT\r\n")).unwrap();
        assert_eq!(reply.line(), "221 Goodbye\r\n");
        assert_eq!(reply.action, Action::Close);
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(dispatch_line("UNKNOWN_COMMAND\r\n"), "502 Command not implemented\r\n");
        assert_eq!(dispatch_line("FOOBAR"), "502 Command not implemented\r\n");
    }

    #[test]
    fn test_only_quit_closes() {
        let mut auth = AuthState::default();
        let dispatcher = Dispatcher::with_cwd(mock_dir);
        for text in ["USER a", "PASS b", "PWD", "NOOP"] {
            let reply = dispatcher.dispatch(&mut auth, &parse(text)).unwrap();
            assert_eq!(reply.action, Action::KeepOpen, "{text}");
        }
    }

    #[test]
    fn test_cwd_failure_is_handler_error() {
        fn failing() -> io::Result<PathBuf> {
            Err(io::Error::new(io::ErrorKind::NotFound, "gone"))
        }
        let mut auth = AuthState::default();
        let result = Dispatcher::with_cwd(failing).dispatch(&mut auth, &parse("PWD"));
        assert!(matches!(result, Err(HandlerError::WorkingDirectory(_))));
        assert_eq!(auth, AuthState::Unauthenticated);
    }

    #[test]
    fn test_non_ascii_cwd_is_handler_error() {
        fn accented() -> io::Result<PathBuf> {
            Ok(PathBuf::from("/home/jos\u{e9}"))
        }
        let mut auth = AuthState::default();
        let result = Dispatcher::with_cwd(accented).dispatch(&mut auth, &parse("PWD"));
        assert!(matches!(result, Err(HandlerError::NonAsciiPath)));
    }

    #[test]
    fn test_auth_state_moves_forward_only() {
        let dispatcher = Dispatcher::with_cwd(mock_dir);
        let mut auth = AuthState::default();

        dispatcher.dispatch(&mut auth, &parse("PWD")).unwrap();
        assert_eq!(auth, AuthState::Unauthenticated);

        dispatcher.dispatch(&mut auth, &parse("USER alice")).unwrap();
        assert_eq!(auth, AuthState::UsernameReceived);

        dispatcher.dispatch(&mut auth, &parse("PASS secret")).unwrap();
        assert_eq!(auth, AuthState::Authenticated);

        // A second USER does not log the peer out
        dispatcher.dispatch(&mut auth, &parse("USER bob")).unwrap();
        assert_eq!(auth, AuthState::Authenticated);
    }

    #[test]
    fn test_pass_without_user_is_served() {
        let mut auth = AuthState::default();
        let reply = Dispatcher::new().dispatch(&mut auth, &parse("PASS early")).unwrap();
        assert_eq!(reply, Reply::logged_in());
        assert_eq!(auth, AuthState::Authenticated);
    }
}
