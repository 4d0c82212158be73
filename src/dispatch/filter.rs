//! Handler filters.
//!
//! Every filter is a regular expression searched (not fully matched)
//! against one event attribute, compiled once at registration.

use regex::{Regex, RegexBuilder};

use crate::error::{ClientError, Result};

/// Per-pattern compile flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MatchFlags {
    /// `(?i)`: ignore case.
    pub case_insensitive: bool,
    /// `(?m)`: `^`/`$` match at line boundaries.
    pub multi_line: bool,
    /// `(?s)`: `.` also matches `\n`.
    pub dot_matches_new_line: bool,
}

impl MatchFlags {
    /// Case-insensitive matching only.
    pub const IGNORE_CASE: MatchFlags = MatchFlags {
        case_insensitive: true,
        multi_line: false,
        dot_matches_new_line: false,
    };
}

/// A compiled filter pattern.
#[derive(Clone, Debug)]
pub struct Pattern {
    regex: Regex,
}

impl Pattern {
    /// Pattern that accepts anything (`.*`).
    pub fn any() -> Self {
        Self::new(".*").expect("match-all pattern is valid")
    }

    /// Compile with default flags.
    pub fn new(pattern: &str) -> Result<Self> {
        Self::with_flags(pattern, MatchFlags::default())
    }

    /// Compile with explicit flags.
    pub fn with_flags(pattern: &str, flags: MatchFlags) -> Result<Self> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(flags.case_insensitive)
            .multi_line(flags.multi_line)
            .dot_matches_new_line(flags.dot_matches_new_line)
            .build()
            .map_err(|source| ClientError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;
        Ok(Self { regex })
    }

    /// The pattern source.
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Whether the pattern occurs anywhere in `haystack`.
    pub fn is_match(&self, haystack: &str) -> bool {
        self.regex.is_match(haystack)
    }

    /// Search `haystack`, keeping the capture groups.
    pub fn search(&self, haystack: &str) -> Option<MessageMatch> {
        let caps = self.regex.captures(haystack)?;
        let groups = caps
            .iter()
            .map(|m| m.map(|m| m.as_str().to_string()))
            .collect();
        let names = self
            .regex
            .capture_names()
            .enumerate()
            .filter_map(|(i, name)| name.map(|n| (n.to_string(), i)))
            .collect();
        Some(MessageMatch { groups, names })
    }
}

impl Default for Pattern {
    fn default() -> Self {
        Self::any()
    }
}

/// Owned result of the message-text filter, handed to message handlers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageMatch {
    groups: Vec<Option<String>>,
    names: Vec<(String, usize)>,
}

impl MessageMatch {
    /// The whole matched text (group 0).
    pub fn as_str(&self) -> &str {
        self.get(0).unwrap_or_default()
    }

    /// Capture group by index, if it participated.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.groups.get(index)?.as_deref()
    }

    /// Capture group by name, if it participated.
    pub fn name(&self, name: &str) -> Option<&str> {
        let &(_, index) = self.names.iter().find(|(n, _)| n == name)?;
        self.get(index)
    }

    /// Number of groups including group 0.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Always false for a real match; group 0 is present.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Filters for message handlers, checked channel, nick, client, then text.
#[derive(Clone, Debug, Default)]
pub struct MessageFilter {
    /// Searched in the message text; its captures reach the handler.
    pub message: Pattern,
    /// Matched against the channel, or the target nick of a private message.
    pub channel: Pattern,
    /// Matched against the sender nick.
    pub nick: Pattern,
    /// Matched against the sender client-id.
    pub client: Pattern,
}

impl MessageFilter {
    /// Accept every message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require the message text to match.
    pub fn message(self, pattern: &str) -> Result<Self> {
        self.message_with(pattern, MatchFlags::default())
    }

    /// [`message`](Self::message) with explicit match flags.
    pub fn message_with(mut self, pattern: &str, flags: MatchFlags) -> Result<Self> {
        self.message = Pattern::with_flags(pattern, flags)?;
        Ok(self)
    }

    /// Require the channel (or target nick, for private messages) to match.
    pub fn channel(self, pattern: &str) -> Result<Self> {
        self.channel_with(pattern, MatchFlags::default())
    }

    /// Channel pattern with explicit match flags.
    pub fn channel_with(mut self, pattern: &str, flags: MatchFlags) -> Result<Self> {
        self.channel = Pattern::with_flags(pattern, flags)?;
        Ok(self)
    }

    /// Require the sender nick to match.
    pub fn nick(self, pattern: &str) -> Result<Self> {
        self.nick_with(pattern, MatchFlags::default())
    }

    /// Sender nick pattern with explicit match flags.
    pub fn nick_with(mut self, pattern: &str, flags: MatchFlags) -> Result<Self> {
        self.nick = Pattern::with_flags(pattern, flags)?;
        Ok(self)
    }

    /// Require the sender client-id (`user@host`) to match.
    pub fn client(self, pattern: &str) -> Result<Self> {
        self.client_with(pattern, MatchFlags::default())
    }

    /// Client-id pattern with explicit match flags.
    pub fn client_with(mut self, pattern: &str, flags: MatchFlags) -> Result<Self> {
        self.client = Pattern::with_flags(pattern, flags)?;
        Ok(self)
    }

    /// Run the filters in order, short-circuiting on the first miss.
    pub fn check(
        &self,
        channel: &str,
        nick: &str,
        client: &str,
        text: &str,
    ) -> Option<MessageMatch> {
        if !self.channel.is_match(channel) {
            return None;
        }
        if !self.nick.is_match(nick) {
            return None;
        }
        if !self.client.is_match(client) {
            return None;
        }
        self.message.search(text)
    }
}

/// Filters for join and part handlers, checked channel, nick, then client.
#[derive(Clone, Debug, Default)]
pub struct MembershipFilter {
    /// Matched against the channel name.
    pub channel: Pattern,
    /// Matched against the joining or parting nick.
    pub nick: Pattern,
    /// Matched against their client-id.
    pub client: Pattern,
}

impl MembershipFilter {
    /// Accept every join or part.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require the channel to match.
    pub fn channel(self, pattern: &str) -> Result<Self> {
        self.channel_with(pattern, MatchFlags::default())
    }

    /// Channel pattern with explicit match flags.
    pub fn channel_with(mut self, pattern: &str, flags: MatchFlags) -> Result<Self> {
        self.channel = Pattern::with_flags(pattern, flags)?;
        Ok(self)
    }

    /// Require the joining or parting nick to match.
    pub fn nick(self, pattern: &str) -> Result<Self> {
        self.nick_with(pattern, MatchFlags::default())
    }

    /// Sender nick pattern with explicit match flags.
    pub fn nick_with(mut self, pattern: &str, flags: MatchFlags) -> Result<Self> {
        self.nick = Pattern::with_flags(pattern, flags)?;
        Ok(self)
    }

    /// Require the client-id to match.
    pub fn client(self, pattern: &str) -> Result<Self> {
        self.client_with(pattern, MatchFlags::default())
    }

    /// Client-id pattern with explicit match flags.
    pub fn client_with(mut self, pattern: &str, flags: MatchFlags) -> Result<Self> {
        self.client = Pattern::with_flags(pattern, flags)?;
        Ok(self)
    }

    /// Run the filters in order, short-circuiting on the first miss.
    pub fn check(&self, channel: &str, nick: &str, client: &str) -> bool {
        self.channel.is_match(channel) && self.nick.is_match(nick) && self.client.is_match(client)
    }
}
