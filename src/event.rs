//! Structured events parsed from inbound protocol lines.

/// One recognised inbound line.
///
/// Produced once per line by [`LineParser`](crate::parser::LineParser) and
/// consumed by the channel tracker and the dispatcher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParsedEvent {
    /// `PING :<token>`; answered with `PONG <token>`, never dispatched.
    Ping(String),
    /// `:<nick>!<client> PRIVMSG <target> :<text>`
    PrivateMessage {
        nick: String,
        client: String,
        target: String,
        text: String,
    },
    /// `:<nick>!<client> JOIN :<channel>`
    Join {
        nick: String,
        client: String,
        channel: String,
    },
    /// `:<nick>!<client> PART <channel>`
    Part {
        nick: String,
        client: String,
        channel: String,
    },
    /// `:<nick>!<client> QUIT :<reason>`
    Quit(String),
    /// `353` names list addressed to the bot, tokens still carrying sigils.
    NamesReply { channel: String, names: Vec<String> },
    /// `:<source> MODE <channel> +<flag> <nick>`
    ModeSet {
        channel: String,
        nick: String,
        flag: char,
    },
    /// `:<source> MODE <channel> -<flag> <nick>`
    ModeUnset {
        channel: String,
        nick: String,
        flag: char,
    },
    /// `332` topic reply addressed to the bot, or a `TOPIC` change.
    Topic { channel: String, topic: String },
}

impl ParsedEvent {
    /// Short name of the event kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ParsedEvent::Ping(_) => "ping",
            ParsedEvent::PrivateMessage { .. } => "privmsg",
            ParsedEvent::Join { .. } => "join",
            ParsedEvent::Part { .. } => "part",
            ParsedEvent::Quit(_) => "quit",
            ParsedEvent::NamesReply { .. } => "names",
            ParsedEvent::ModeSet { .. } => "mode-set",
            ParsedEvent::ModeUnset { .. } => "mode-unset",
            ParsedEvent::Topic { .. } => "topic",
        }
    }
}
