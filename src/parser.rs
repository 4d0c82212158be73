//! Line parser: classify a raw protocol line into a [`ParsedEvent`].
//!
//! The grammar is an ordered table of compiled patterns, each paired with a
//! constructor. Rules are tried in priority order and the first rule whose
//! pattern matches *and* whose constructor accepts the captures wins.
//! Constructors see the bot's current nickname so replies addressed to
//! someone else (a `353` for another client, say) fall through.
//!
//! Lines no rule recognises produce `None`; most numerics are deliberately
//! left unhandled.

use regex::{Captures, Regex};

use crate::casemap::irc_eq;
use crate::event::ParsedEvent;

type Build = fn(&Captures<'_>, &str) -> Option<ParsedEvent>;

#[derive(Clone)]
struct Rule {
    name: &'static str,
    pattern: Regex,
    build: Build,
}

/// Grammar rules in priority order.
const GRAMMAR: &[(&str, &str, Build)] = &[
    ("privmsg", r"^:([^!\s]+)!(\S+) PRIVMSG (\S+) :(.*)$", build_privmsg),
    ("join", r"^:([^!\s]+)!(\S+) JOIN :?(\S+)", build_join),
    ("part", r"^:([^!\s]+)!(\S+) PART (\S+)", build_part),
    ("ping", r"^PING :?(.*)$", build_ping),
    ("quit", r"^:([^!\s]+)!\S* QUIT(?:\s|$)", build_quit),
    ("names", r"^:\S+ 353 (\S+) (?:[=*@] )?(\S+) :(.*)$", build_names),
    ("mode-set", r"^:\S+ MODE (\S+) \+([A-Za-z]) (\S+)\s*$", build_mode_set),
    ("mode-unset", r"^:\S+ MODE (\S+) -([A-Za-z]) (\S+)\s*$", build_mode_unset),
    ("topic-reply", r"^:\S+ 332 (\S+) (\S+) :(.*)$", build_topic_reply),
    ("topic-change", r"^:[^!\s]+!\S+ TOPIC (\S+) :(.*)$", build_topic_change),
];

fn cap(caps: &Captures<'_>, i: usize) -> String {
    caps.get(i).map_or_else(String::new, |m| m.as_str().to_string())
}

fn build_privmsg(caps: &Captures<'_>, _own_nick: &str) -> Option<ParsedEvent> {
    Some(ParsedEvent::PrivateMessage {
        nick: cap(caps, 1),
        client: cap(caps, 2),
        target: cap(caps, 3),
        text: cap(caps, 4),
    })
}

fn build_join(caps: &Captures<'_>, _own_nick: &str) -> Option<ParsedEvent> {
    Some(ParsedEvent::Join {
        nick: cap(caps, 1),
        client: cap(caps, 2),
        channel: cap(caps, 3),
    })
}

fn build_part(caps: &Captures<'_>, _own_nick: &str) -> Option<ParsedEvent> {
    Some(ParsedEvent::Part {
        nick: cap(caps, 1),
        client: cap(caps, 2),
        channel: cap(caps, 3),
    })
}

fn build_ping(caps: &Captures<'_>, _own_nick: &str) -> Option<ParsedEvent> {
    Some(ParsedEvent::Ping(cap(caps, 1)))
}

fn build_quit(caps: &Captures<'_>, _own_nick: &str) -> Option<ParsedEvent> {
    Some(ParsedEvent::Quit(cap(caps, 1)))
}

fn build_names(caps: &Captures<'_>, own_nick: &str) -> Option<ParsedEvent> {
    if !irc_eq(&caps[1], own_nick) {
        return None;
    }
    Some(ParsedEvent::NamesReply {
        channel: cap(caps, 2),
        names: caps[3].split(' ').filter(|t| !t.is_empty()).map(String::from).collect(),
    })
}

fn build_mode_set(caps: &Captures<'_>, _own_nick: &str) -> Option<ParsedEvent> {
    Some(ParsedEvent::ModeSet {
        channel: cap(caps, 1),
        flag: caps[2].chars().next()?,
        nick: cap(caps, 3),
    })
}

fn build_mode_unset(caps: &Captures<'_>, _own_nick: &str) -> Option<ParsedEvent> {
    Some(ParsedEvent::ModeUnset {
        channel: cap(caps, 1),
        flag: caps[2].chars().next()?,
        nick: cap(caps, 3),
    })
}

fn build_topic_reply(caps: &Captures<'_>, own_nick: &str) -> Option<ParsedEvent> {
    if !irc_eq(&caps[1], own_nick) {
        return None;
    }
    Some(ParsedEvent::Topic {
        channel: cap(caps, 2),
        topic: cap(caps, 3),
    })
}

fn build_topic_change(caps: &Captures<'_>, _own_nick: &str) -> Option<ParsedEvent> {
    Some(ParsedEvent::Topic {
        channel: cap(caps, 1),
        topic: cap(caps, 2),
    })
}

/// Compiled, ordered line grammar.
#[derive(Clone)]
pub struct LineParser {
    rules: Vec<Rule>,
}

impl std::fmt::Debug for LineParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|r| r.name))
            .finish()
    }
}

impl LineParser {
    /// Compile the grammar.
    pub fn new() -> Self {
        let rules = GRAMMAR
            .iter()
            .map(|&(name, pattern, build)| Rule {
                name,
                pattern: Regex::new(pattern).expect("line grammar pattern is valid"),
                build,
            })
            .collect();
        Self { rules }
    }

    /// Classify one line (without terminator).
    ///
    /// `own_nick` is the bot's current nickname.
    pub fn parse(&self, line: &str, own_nick: &str) -> Option<ParsedEvent> {
        self.rules.iter().find_map(|rule| {
            let caps = rule.pattern.captures(line)?;
            (rule.build)(&caps, own_nick)
        })
    }
}

impl Default for LineParser {
    fn default() -> Self {
        Self::new()
    }
}
