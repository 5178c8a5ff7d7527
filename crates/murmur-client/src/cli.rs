//! Line commands understood by the `murmur` binary.

use murmur_core::{ChatEvent, ConnectionState};
use murmur_protocol::{UserId, DEFAULT_ROOM};
use thiserror::Error;

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    Login {
        token: String,
        user_id: UserId,
        username: String,
    },
    Logout,
    Connect,
    Disconnect,
    Direct { peer: UserId, content: String },
    Focus(UserId),
    Unfocus,
    Online,
    Join(String),
    Probe(String),
    Say(String),
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown command: /{0}")]
    Unknown(String),
    #[error("Usage: {0}")]
    Usage(&'static str),
}

impl CliCommand {
    /// Parse one line. Blank lines yield `None`.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown commands or missing arguments.
    pub fn parse(line: &str) -> Result<Option<Self>, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Some(CliCommand::Say(line.to_string())));
        };

        let (name, args) = match rest.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (rest, ""),
        };

        let command = match name {
            "login" => {
                let mut parts = args.splitn(3, char::is_whitespace);
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(token), Some(id), Some(name))
                        if !token.is_empty() && !id.is_empty() && !name.trim().is_empty() =>
                    {
                        CliCommand::Login {
                            token: token.to_string(),
                            user_id: UserId::from(id),
                            username: name.trim().to_string(),
                        }
                    }
                    _ => return Err(ParseError::Usage("/login <token> <user-id> <username>")),
                }
            }
            "logout" => CliCommand::Logout,
            "connect" => CliCommand::Connect,
            "disconnect" => CliCommand::Disconnect,
            "dm" => match args.split_once(char::is_whitespace) {
                Some((peer, content)) if !content.trim().is_empty() => CliCommand::Direct {
                    peer: UserId::from(peer),
                    content: content.trim().to_string(),
                },
                _ => return Err(ParseError::Usage("/dm <user-id> <text>")),
            },
            "focus" if !args.is_empty() => CliCommand::Focus(UserId::from(args)),
            "focus" => return Err(ParseError::Usage("/focus <user-id>")),
            "unfocus" => CliCommand::Unfocus,
            "online" => CliCommand::Online,
            "join" if !args.is_empty() => CliCommand::Join(args.to_string()),
            "join" => return Err(ParseError::Usage("/join <room>")),
            "probe" => CliCommand::Probe(args.to_string()),
            "help" => CliCommand::Help,
            "quit" | "exit" => CliCommand::Quit,
            other => return Err(ParseError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}

pub const HELP: &str = "\
/login <token> <user-id> <username>   store credentials
/logout                               forget credentials
/connect | /disconnect
/dm <user-id> <text>                  private message
/focus <user-id> | /unfocus
/online                               list online users
/join <room>
/probe <text>                         round-trip test frame
/quit
anything else                         public message";

/// Human-readable line for an event.
#[must_use]
pub fn render_event(event: &ChatEvent) -> String {
    match event {
        ChatEvent::Connectivity(ConnectionState::Connected) => "* connected".to_string(),
        ChatEvent::Connectivity(state) => format!("* {state}"),
        ChatEvent::TransportError(message) => format!("! transport error: {message}"),
        ChatEvent::ConnectivityFailed { attempts } => {
            format!("! gave up after {attempts} reconnect attempts, use /connect")
        }
        ChatEvent::PublicMessage(message) => {
            let room = message.room_id.as_deref().unwrap_or(DEFAULT_ROOM);
            format!("[{room}] {}: {}", message.sender_name, message.content)
        }
        ChatEvent::PrivateMessage {
            peer,
            message,
            unread_count,
        } => {
            let badge = if *unread_count > 0 {
                format!(" ({unread_count} unread)")
            } else {
                String::new()
            };
            format!("[dm {peer}] {}: {}{badge}", message.sender_name, message.content)
        }
        ChatEvent::UserOnline(user) => format!("+ {} ({}) online", user.username, user.user_id),
        ChatEvent::UserOffline(user) => format!("- {} ({}) offline", user.username, user.user_id),
        ChatEvent::PresenceSnapshot(users) => format!("* {} users online", users.len()),
        ChatEvent::ServerError(message) => format!("! server: {message}"),
        ChatEvent::SessionChanged { logged_in: true } => "* logged in".to_string(),
        ChatEvent::SessionChanged { logged_in: false } => "* logged out".to_string(),
        ChatEvent::SessionExpired => "! session expired, please /login again".to_string(),
    }
}
