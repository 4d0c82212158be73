//! Reducer from parsed events to channel state.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::casemap::{channel_key, irc_eq};
use crate::event::ParsedEvent;

use super::{ChannelState, Tier};

/// Channel map plus the bot's own modes per channel.
#[derive(Clone, Debug, Default)]
pub struct ChannelTracker {
    channels: HashMap<String, ChannelState>,
    bot_modes: HashMap<String, HashSet<char>>,
}

impl ChannelTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the state. `own_nick` is the bot's nickname.
    ///
    /// Pings and private messages leave the state untouched.
    pub fn apply(&mut self, event: &ParsedEvent, own_nick: &str) {
        match event {
            ParsedEvent::Join { nick, channel, .. } => {
                if irc_eq(nick, own_nick) {
                    self.insert_joined(channel);
                } else if let Some(chan) = self.channel_mut(channel) {
                    chan.members.insert(nick.clone());
                }
            }
            ParsedEvent::Part { nick, channel, .. } => {
                if irc_eq(nick, own_nick) {
                    self.remove_channel(channel);
                } else if let Some(chan) = self.channel_mut(channel) {
                    chan.remove_member(nick);
                }
            }
            ParsedEvent::Quit(nick) => {
                if irc_eq(nick, own_nick) {
                    self.clear();
                } else {
                    for chan in self.channels.values_mut() {
                        chan.remove_member(nick);
                    }
                }
            }
            ParsedEvent::NamesReply { channel, names } => {
                self.channels
                    .entry(channel_key(channel))
                    .or_insert_with(|| ChannelState::new(channel.as_str()))
                    .replace_from_names(names);
            }
            ParsedEvent::ModeSet { channel, nick, flag } => {
                self.apply_mode(channel, nick, *flag, true, own_nick);
            }
            ParsedEvent::ModeUnset { channel, nick, flag } => {
                self.apply_mode(channel, nick, *flag, false, own_nick);
            }
            ParsedEvent::Topic { channel, topic } => {
                if let Some(chan) = self.channel_mut(channel) {
                    chan.topic = Some(topic.clone());
                }
            }
            ParsedEvent::Ping(_) | ParsedEvent::PrivateMessage { .. } => {}
        }
    }

    fn apply_mode(&mut self, channel: &str, nick: &str, flag: char, granted: bool, own_nick: &str) {
        if let Some(tier) = Tier::from_mode_flag(flag) {
            if let Some(chan) = self.channel_mut(channel) {
                chan.set_tier(tier, nick, granted);
            }
        }

        if irc_eq(nick, own_nick) {
            let modes = self.bot_modes.entry(channel_key(channel)).or_default();
            if granted {
                modes.insert(flag);
            } else {
                modes.remove(&flag);
            }
        }
    }

    fn channel_mut(&mut self, channel: &str) -> Option<&mut ChannelState> {
        let chan = self.channels.get_mut(&channel_key(channel));
        if chan.is_none() {
            debug!(channel, "event for untracked channel");
        }
        chan
    }

    /// Create or reset the entry for a channel the bot is joining.
    pub fn insert_joined(&mut self, channel: &str) {
        let key = channel_key(channel);
        self.bot_modes.remove(&key);
        self.channels.insert(key, ChannelState::new(channel));
    }

    /// Forget a channel the bot left.
    pub fn remove_channel(&mut self, channel: &str) {
        let key = channel_key(channel);
        self.bot_modes.remove(&key);
        self.channels.remove(&key);
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.channels.clear();
        self.bot_modes.clear();
    }

    /// State of a channel, if tracked.
    pub fn channel(&self, channel: &str) -> Option<&ChannelState> {
        self.channels.get(&channel_key(channel))
    }

    fn lookup(&self, channel: &str, what: &'static str) -> Option<&ChannelState> {
        let chan = self.channel(channel);
        if chan.is_none() {
            debug!(channel, what, "requested for unjoined/unknown channel");
        }
        chan
    }

    /// Whether the channel is tracked.
    pub fn is_joined(&self, channel: &str) -> bool {
        self.channels.contains_key(&channel_key(channel))
    }

    /// Names of every tracked channel, as first seen.
    pub fn channels(&self) -> Vec<String> {
        self.channels.values().map(|c| c.name.clone()).collect()
    }

    /// Members of a channel; empty for an unknown channel.
    pub fn members(&self, channel: &str) -> HashSet<String> {
        self.lookup(channel, "members")
            .map(|c| c.members.clone())
            .unwrap_or_default()
    }

    /// Members holding `tier`; empty for an unknown channel.
    pub fn tier(&self, channel: &str, tier: Tier) -> HashSet<String> {
        self.lookup(channel, "tier")
            .map(|c| c.tier(tier).clone())
            .unwrap_or_default()
    }

    /// Members holding any tier; empty for an unknown channel.
    pub fn privileged(&self, channel: &str) -> HashSet<String> {
        self.lookup(channel, "privileged")
            .map(ChannelState::privileged)
            .unwrap_or_default()
    }

    /// Last topic seen for a channel.
    pub fn topic(&self, channel: &str) -> Option<String> {
        self.lookup(channel, "topic").and_then(|c| c.topic.clone())
    }

    /// Mode flags set on the bot in a channel.
    pub fn bot_modes(&self, channel: &str) -> HashSet<char> {
        match self.bot_modes.get(&channel_key(channel)) {
            Some(modes) => modes.clone(),
            None => {
                debug!(channel, "no bot modes recorded for channel");
                HashSet::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ME: &str = "snaibot";

    fn join(nick: &str, channel: &str) -> ParsedEvent {
        ParsedEvent::Join {
            nick: nick.into(),
            client: format!("{}@host", nick),
            channel: channel.into(),
        }
    }

    fn part(nick: &str, channel: &str) -> ParsedEvent {
        ParsedEvent::Part {
            nick: nick.into(),
            client: format!("{}@host", nick),
            channel: channel.into(),
        }
    }

    fn mode(channel: &str, nick: &str, flag: char, set: bool) -> ParsedEvent {
        if set {
            ParsedEvent::ModeSet {
                channel: channel.into(),
                nick: nick.into(),
                flag,
            }
        } else {
            ParsedEvent::ModeUnset {
                channel: channel.into(),
                nick: nick.into(),
                flag,
            }
        }
    }

    #[test]
    fn test_self_join_creates_entry_case_insensitively() {
        let mut tracker = ChannelTracker::new();
        tracker.apply(&join(ME, "#Chan"), ME);

        assert!(tracker.is_joined("#chan"));
        assert!(tracker.is_joined("#CHAN"));
        assert!(tracker.members("#chan").is_empty());
    }

    #[test]
    fn test_join_twice_resets_entry() {
        let mut tracker = ChannelTracker::new();
        tracker.insert_joined("#chan");
        tracker.apply(&join("alice", "#chan"), ME);
        assert_eq!(tracker.members("#chan").len(), 1);

        tracker.insert_joined("#chan");
        assert!(tracker.is_joined("#chan"));
        assert!(tracker.members("#chan").is_empty());
    }

    #[test]
    fn test_op_then_part_removes_everywhere() {
        let mut tracker = ChannelTracker::new();
        tracker.apply(&join(ME, "#chan"), ME);
        tracker.apply(&join("bob", "#chan"), ME);
        tracker.apply(&mode("#chan", "bob", 'o', true), ME);
        assert!(tracker.tier("#chan", Tier::Op).contains("bob"));

        tracker.apply(&part("bob", "#chan"), ME);
        assert!(!tracker.members("#chan").contains("bob"));
        assert!(!tracker.tier("#chan", Tier::Op).contains("bob"));
    }

    #[test]
    fn test_quit_of_other_removes_from_all_channels() {
        let mut tracker = ChannelTracker::new();
        for chan in ["#a", "#b"] {
            tracker.apply(
                &ParsedEvent::NamesReply {
                    channel: chan.into(),
                    names: vec!["+carol".into(), ME.into()],
                },
                ME,
            );
        }

        tracker.apply(&ParsedEvent::Quit("carol".into()), ME);
        assert!(!tracker.members("#a").contains("carol"));
        assert!(!tracker.members("#b").contains("carol"));
        assert!(tracker.tier("#b", Tier::Voice).is_empty());
        assert!(tracker.members("#b").contains(ME));
    }

    #[test]
    fn test_self_part_and_quit_drop_entries() {
        let mut tracker = ChannelTracker::new();
        tracker.apply(&join(ME, "#a"), ME);
        tracker.apply(&join(ME, "#b"), ME);

        tracker.apply(&part(ME, "#A"), ME);
        assert!(!tracker.is_joined("#a"));
        assert!(tracker.is_joined("#b"));

        tracker.apply(&ParsedEvent::Quit(ME.into()), ME);
        assert!(tracker.channels().is_empty());
    }

    #[test]
    fn test_bot_modes_follow_own_nick() {
        let mut tracker = ChannelTracker::new();
        tracker.apply(&join(ME, "#chan"), ME);
        tracker.apply(&mode("#chan", ME, 'o', true), ME);
        tracker.apply(&mode("#chan", ME, 'v', true), ME);
        tracker.apply(&mode("#chan", "alice", 'h', true), ME);

        assert_eq!(tracker.bot_modes("#CHAN"), HashSet::from(['o', 'v']));
        assert!(tracker.tier("#chan", Tier::Op).contains(ME));

        tracker.apply(&mode("#chan", ME, 'o', false), ME);
        assert_eq!(tracker.bot_modes("#chan"), HashSet::from(['v']));
        assert!(!tracker.tier("#chan", Tier::Op).contains(ME));
    }

    #[test]
    fn test_owner_flag_maps_to_owner_tier() {
        let mut tracker = ChannelTracker::new();
        tracker.apply(&join(ME, "#chan"), ME);
        tracker.apply(&mode("#chan", "dave", 'q', true), ME);
        assert!(tracker.tier("#chan", Tier::Owner).contains("dave"));

        tracker.apply(&mode("#chan", "dave", 'q', false), ME);
        assert!(tracker.tier("#chan", Tier::Owner).is_empty());
    }

    #[test]
    fn test_unknown_channel_queries_are_empty() {
        let tracker = ChannelTracker::new();
        assert!(tracker.members("#nowhere").is_empty());
        assert!(tracker.tier("#nowhere", Tier::Voice).is_empty());
        assert!(tracker.bot_modes("#nowhere").is_empty());
        assert!(tracker.privileged("#nowhere").is_empty());
        assert_eq!(tracker.topic("#nowhere"), None);
    }

    #[test]
    fn test_topic_is_recorded() {
        let mut tracker = ChannelTracker::new();
        tracker.apply(&join(ME, "#chan"), ME);
        tracker.apply(
            &ParsedEvent::Topic {
                channel: "#chan".into(),
                topic: "release day".into(),
            },
            ME,
        );
        assert_eq!(tracker.topic("#Chan").as_deref(), Some("release day"));
    }
}
