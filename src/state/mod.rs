//! Per-channel membership and privilege state.
//!
//! The receiver worker is the only writer: it folds every [`ParsedEvent`]
//! into a [`ChannelTracker`]. Everyone else reads through the client
//! facade and gets owned copies, so readers never hold a lock across their
//! own work.
//!
//! Channel names are keyed by their canonical upper-case form (see
//! [`channel_key`](crate::casemap::channel_key)).
//!
//! [`ParsedEvent`]: crate::event::ParsedEvent

mod tracker;

pub use tracker::ChannelTracker;

use std::collections::HashSet;

/// Channel privilege tier.
///
/// Tiers are tracked independently; a nick may sit in several at once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Tier {
    /// `~` / mode `q`
    Owner,
    /// `&` / mode `a`
    AdminOp,
    /// `@` / mode `o`
    Op,
    /// `%` / mode `h`
    HalfOp,
    /// `+` / mode `v`
    Voice,
}

impl Tier {
    /// Every tier, highest first.
    pub const ALL: [Tier; 5] = [Tier::Owner, Tier::AdminOp, Tier::Op, Tier::HalfOp, Tier::Voice];

    /// Tier for a names-reply prefix sigil.
    pub fn from_sigil(sigil: char) -> Option<Self> {
        match sigil {
            '~' => Some(Tier::Owner),
            '&' => Some(Tier::AdminOp),
            '@' => Some(Tier::Op),
            '%' => Some(Tier::HalfOp),
            '+' => Some(Tier::Voice),
            _ => None,
        }
    }

    /// Tier granted by a channel mode flag.
    pub fn from_mode_flag(flag: char) -> Option<Self> {
        match flag {
            'q' => Some(Tier::Owner),
            'a' => Some(Tier::AdminOp),
            'o' => Some(Tier::Op),
            'h' => Some(Tier::HalfOp),
            'v' => Some(Tier::Voice),
            _ => None,
        }
    }

    /// Names-reply sigil for this tier.
    pub fn sigil(self) -> char {
        match self {
            Tier::Owner => '~',
            Tier::AdminOp => '&',
            Tier::Op => '@',
            Tier::HalfOp => '%',
            Tier::Voice => '+',
        }
    }
}

/// State of one joined channel.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelState {
    /// Channel name as first seen.
    pub name: String,
    /// Every known member, privileged or not.
    pub members: HashSet<String>,
    /// Members holding `~` (`+q`).
    pub owners: HashSet<String>,
    /// Members holding `&` (`+a`).
    pub admin_ops: HashSet<String>,
    /// Members holding `@` (`+o`).
    pub ops: HashSet<String>,
    /// Members holding `%` (`+h`).
    pub half_ops: HashSet<String>,
    /// Members holding `+` (`+v`).
    pub voices: HashSet<String>,
    /// Last topic seen, if any.
    pub topic: Option<String>,
}

impl ChannelState {
    /// Empty state for a freshly joined channel.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Members of one tier.
    pub fn tier(&self, tier: Tier) -> &HashSet<String> {
        match tier {
            Tier::Owner => &self.owners,
            Tier::AdminOp => &self.admin_ops,
            Tier::Op => &self.ops,
            Tier::HalfOp => &self.half_ops,
            Tier::Voice => &self.voices,
        }
    }

    fn tier_mut(&mut self, tier: Tier) -> &mut HashSet<String> {
        match tier {
            Tier::Owner => &mut self.owners,
            Tier::AdminOp => &mut self.admin_ops,
            Tier::Op => &mut self.ops,
            Tier::HalfOp => &mut self.half_ops,
            Tier::Voice => &mut self.voices,
        }
    }

    /// Union of all five tiers.
    pub fn privileged(&self) -> HashSet<String> {
        Tier::ALL
            .iter()
            .flat_map(|&t| self.tier(t).iter().cloned())
            .collect()
    }

    /// Replace membership and every tier from a names-reply token list.
    ///
    /// Each token's leading sigil selects the tier and is stripped to
    /// recover the bare nick; a token without a sigil is a plain member.
    pub fn replace_from_names<I>(&mut self, tokens: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.members.clear();
        for tier in Tier::ALL {
            self.tier_mut(tier).clear();
        }

        for token in tokens {
            let token = token.as_ref();
            let mut chars = token.chars();
            match chars.next().and_then(Tier::from_sigil) {
                Some(tier) => {
                    let nick = chars.as_str();
                    if nick.is_empty() {
                        continue;
                    }
                    self.tier_mut(tier).insert(nick.to_string());
                    self.members.insert(nick.to_string());
                }
                None if !token.is_empty() => {
                    self.members.insert(token.to_string());
                }
                None => {}
            }
        }
    }

    /// Grant or revoke a tier.
    pub fn set_tier(&mut self, tier: Tier, nick: &str, granted: bool) {
        if granted {
            self.tier_mut(tier).insert(nick.to_string());
        } else {
            self.tier_mut(tier).remove(nick);
        }
    }

    /// Drop a nick from membership and every tier.
    pub fn remove_member(&mut self, nick: &str) {
        self.members.remove(nick);
        for tier in Tier::ALL {
            self.tier_mut(tier).remove(nick);
        }
    }
}
