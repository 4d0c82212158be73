//! Outbound IRC commands.
//!
//! Every command the client issues is one [`Command`] value, rendered to a
//! single protocol line through its `Display` impl. Lines carry no
//! terminator; the line codec appends CRLF when the pacer writes them.

use std::fmt::{self, Write};

/// Direction of a `MODE` change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeSign {
    /// `+flag`
    Plus,
    /// `-flag`
    Minus,
}

impl ModeSign {
    fn as_char(self) -> char {
        match self {
            ModeSign::Plus => '+',
            ModeSign::Minus => '-',
        }
    }
}

/// IRC command issued by the client.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Command {
    /// `NICK nickname`
    NICK(String),
    /// `USER name name name :name`
    USER(String),
    /// `JOIN channel`
    JOIN(String),
    /// `PART channel`
    PART(String),
    /// `AWAY :message`, or `AWAY ` to mark the client back.
    AWAY(Option<String>),
    /// `KICK channel client :message`
    KICK(String, String, String),
    /// `MODE channel ±flag target`
    MODE(String, ModeSign, String, String),
    /// `INVITE nickname channel`
    INVITE(String, String),
    /// `PRIVMSG target :text`
    PRIVMSG(String, String),
    /// `NOTICE target :text`
    NOTICE(String, String),
    /// `TOPIC channel :topic`
    TOPIC(String, String),
    /// `PONG token`
    PONG(String),
    /// `QUIT :message`
    QUIT(String),
}

impl Command {
    /// `PRIVMSG NickServ :IDENTIFY <password>`
    pub fn identify(password: &str) -> Self {
        Command::PRIVMSG("NickServ".to_string(), format!("IDENTIFY {}", password))
    }

    /// `MODE <channel> +b *!*@<host>` for the host part of `client`.
    ///
    /// Returns `None` when `client` has no `@host` part.
    pub fn ban(channel: &str, client: &str) -> Option<Self> {
        ban_mask(client).map(|mask| {
            Command::MODE(channel.to_string(), ModeSign::Plus, "b".to_string(), mask)
        })
    }
}

/// Derive a host ban mask (`*!*@host`) from a `user@host` client-id.
pub fn ban_mask(client: &str) -> Option<String> {
    let (_, host) = client.split_once('@')?;
    if host.is_empty() {
        return None;
    }
    Some(format!("*!*@{}", host))
}

/// Write a command whose last argument is always colon-prefixed.
fn write_cmd_freeform(f: &mut fmt::Formatter<'_>, cmd: &str, args: &[&str]) -> fmt::Result {
    match args.split_last() {
        Some((suffix, middle)) => {
            f.write_str(cmd)?;
            for arg in middle {
                f.write_char(' ')?;
                f.write_str(arg)?;
            }
            f.write_str(" :")?;
            f.write_str(suffix)
        }
        None => f.write_str(cmd),
    }
}

/// Write a command with space-separated arguments and no trailing part.
fn write_cmd(f: &mut fmt::Formatter<'_>, cmd: &str, args: &[&str]) -> fmt::Result {
    f.write_str(cmd)?;
    for arg in args {
        f.write_char(' ')?;
        f.write_str(arg)?;
    }
    Ok(())
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::NICK(nick) => write_cmd(f, "NICK", &[nick]),
            Command::USER(name) => write_cmd_freeform(f, "USER", &[name, name, name, name]),
            Command::JOIN(chan) => write_cmd(f, "JOIN", &[chan]),
            Command::PART(chan) => write_cmd(f, "PART", &[chan]),
            Command::AWAY(Some(msg)) => write_cmd_freeform(f, "AWAY", &[msg]),
            Command::AWAY(None) => f.write_str("AWAY "),
            Command::KICK(chan, client, msg) => write_cmd_freeform(f, "KICK", &[chan, client, msg]),
            Command::MODE(chan, sign, flag, target) => {
                write!(f, "MODE {} {}{} {}", chan, sign.as_char(), flag, target)
            }
            Command::INVITE(nick, chan) => write_cmd(f, "INVITE", &[nick, chan]),
            Command::PRIVMSG(target, text) => write_cmd_freeform(f, "PRIVMSG", &[target, text]),
            Command::NOTICE(target, text) => write_cmd_freeform(f, "NOTICE", &[target, text]),
            Command::TOPIC(chan, topic) => write_cmd_freeform(f, "TOPIC", &[chan, topic]),
            Command::PONG(token) => write_cmd(f, "PONG", &[token]),
            Command::QUIT(msg) => write_cmd_freeform(f, "QUIT", &[msg]),
        }
    }
}
