//! Line-oriented command console.
//!
//! `Command::parse` turns one input line into a command; `execute` runs it
//! against a `DmServer` and produces the text shown to the operator.

use crate::error::ServerError;
use crate::server::{DmServer, StartOutcome, StopOutcome};

/// Command listing shown by `help` and after unknown input.
pub const HELP_TEXT: &str = "\
HexDM server commands:
  help        display this help
  start       start the DM control loop
  stop        stop the DM control loop
  status      control loop state (idle, running, fault)
  report      detailed status as JSON
  get_nch     number of virtual channels
  set_nch n   reallocate with n virtual channels
  reset k     zero channel k (k < 0: all channels)
  quit        stop, release the mirror and exit";

/// One parsed console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the command listing
    Help,
    /// Start the control loop
    Start,
    /// Stop the control loop
    Stop,
    /// Print the loop state
    Status,
    /// Print the JSON status report
    Report,
    /// Print the channel count
    GetNch,
    /// Reallocate with the given channel count
    SetNch(i64),
    /// Zero a channel (negative: all)
    Reset(i64),
    /// Shut down
    Quit,
    /// Anything else, with the reason it was not understood
    Invalid {
        /// Raw input line
        line: String,
        /// What was wrong
        reason: String,
    },
}

impl Command {
    /// Parse one line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let keyword = words.next()?;
        let argument = words.next();

        let invalid = |reason: &str| Command::Invalid {
            line: line.trim().to_string(),
            reason: reason.to_string(),
        };
        let integer = |build: fn(i64) -> Command| match argument.map(str::parse::<i64>) {
            Some(Ok(value)) => build(value),
            Some(Err(_)) => invalid("argument must be an integer"),
            None => invalid("missing argument"),
        };

        let command = match keyword {
            "help" => Command::Help,
            "start" => Command::Start,
            "stop" => Command::Stop,
            "status" => Command::Status,
            "report" => Command::Report,
            "get_nch" => Command::GetNch,
            "set_nch" => integer(Command::SetNch),
            "reset" => integer(Command::Reset),
            "quit" | "exit" => Command::Quit,
            _ => invalid("unknown command"),
        };
        Some(command)
    }
}

/// Text produced by one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Message for the operator
    pub text: String,
    /// True when the console should exit
    pub quit: bool,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quit: false,
        }
    }
}

/// Run `command` against `server`.
pub fn execute(server: &mut DmServer, command: Command) -> Reply {
    match command {
        Command::Help => Reply::text(HELP_TEXT),
        Command::Start => match server.start() {
            Ok(StartOutcome::Started) => Reply::text("DM control loop started"),
            Ok(StartOutcome::AlreadyRunning) => Reply::text("DM control loop already running"),
            Err(ServerError::NotAllocated) => Reply::text("set the desired number of channels"),
            Err(e) => Reply::text(format!("error: {e}")),
        },
        Command::Stop => match server.stop() {
            StopOutcome::Stopped => Reply::text("DM control loop stopped"),
            StopOutcome::AlreadyIdle => Reply::text("DM control loop not running"),
        },
        Command::Status => Reply::text(server.status()),
        Command::Report => Reply::text(server.status_report().to_json()),
        Command::GetNch => Reply::text(format!("number of channels = {}", server.get_nch())),
        Command::SetNch(n) => match server.set_nch(n) {
            Ok(()) => Reply::text(format!("number of channels = {}", server.get_nch())),
            Err(e) => Reply::text(format!("error: {e}")),
        },
        Command::Reset(k) => match server.reset(k) {
            Ok(()) if k < 0 => Reply::text("all channels reset"),
            Ok(()) => Reply::text(format!("channel {k} reset")),
            Err(e) => Reply::text(format!("error: {e}")),
        },
        Command::Quit => {
            let text = match server.quit() {
                Ok(()) => "HexDM shell closed".to_string(),
                Err(e) => format!("HexDM shell closed with error: {e}"),
            };
            Reply { text, quit: true }
        }
        Command::Invalid { line, reason } => {
            Reply::text(format!("{reason}: {line}\n{HELP_TEXT}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexdm_common::dm::config::HexDmConfig;
    use hexdm_hal::DriverRegistry;
    use tempfile::TempDir;

    #[test]
    fn test_parse_keywords() {
        assert_eq!(Command::parse("start"), Some(Command::Start));
        assert_eq!(Command::parse("  stop  "), Some(Command::Stop));
        assert_eq!(Command::parse("get_nch"), Some(Command::GetNch));
        assert_eq!(Command::parse("set_nch 6"), Some(Command::SetNch(6)));
        assert_eq!(Command::parse("reset -1"), Some(Command::Reset(-1)));
        assert_eq!(Command::parse("quit"), Some(Command::Quit));
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse("   "), None);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(matches!(
            Command::parse("set_nch"),
            Some(Command::Invalid { reason, .. }) if reason == "missing argument"
        ));
        assert!(matches!(
            Command::parse("reset two"),
            Some(Command::Invalid { reason, .. }) if reason.contains("integer")
        ));
        assert!(matches!(
            Command::parse("launch"),
            Some(Command::Invalid { line, .. }) if line == "launch"
        ));
    }

    #[test]
    fn test_execute_session() {
        let dir = TempDir::new().unwrap();
        let mut config = HexDmConfig::default();
        config.channels.shm_dir = dir.path().to_path_buf();
        config.combiner.wake_interval_ms = 5;
        let mut server = DmServer::new(config, &DriverRegistry::with_builtin()).unwrap();

        let mut run = |line: &str| execute(&mut server, Command::parse(line).unwrap());

        assert_eq!(run("get_nch").text, "number of channels = 4");
        assert_eq!(run("start").text, "DM control loop started");
        assert_eq!(run("status").text, "running");
        assert_eq!(run("set_nch 2").text, "number of channels = 2");
        assert_eq!(run("status").text, "running");
        assert_eq!(run("reset 1").text, "channel 1 reset");
        assert!(run("reset 2").text.starts_with("error: Invalid channel 2"));
        assert!(run("bogus").text.contains("HexDM server commands"));

        let quit = run("quit");
        assert!(quit.quit);
        assert_eq!(quit.text, "HexDM shell closed");
    }
}
