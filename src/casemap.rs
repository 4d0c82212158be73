//! Nick and channel name comparison under the `rfc1459` case mapping.
//!
//! Besides ASCII letters, the mapping folds `{}|^` onto `[]\~`, so
//! `Snai{bot}` and `SNAI[BOT]` name the same user.
//!
//! Channel names are canonicalized to the upper-case form so that
//! `#Rust`, `#rust` and `#RUST` share one state entry.

#[inline]
fn fold_upper(c: char) -> char {
    match c {
        '{' => '[',
        '}' => ']',
        '|' => '\\',
        '^' => '~',
        'a'..='z' => c.to_ascii_uppercase(),
        _ => c,
    }
}

/// Convert a string to IRC uppercase using RFC 1459 case mapping.
///
/// In addition to ASCII uppercase conversion, this maps:
/// - `{` → `[`
/// - `}` → `]`
/// - `|` → `\`
/// - `^` → `~`
pub fn irc_to_upper(s: &str) -> String {
    s.chars().map(fold_upper).collect()
}

/// Canonical lookup key for a channel name.
#[inline]
pub fn channel_key(channel: &str) -> String {
    irc_to_upper(channel)
}

/// Case-insensitive equality for nicks and channel names.
pub fn irc_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.chars()
        .zip(b.chars())
        .all(|(ca, cb)| fold_upper(ca) == fold_upper(cb))
}
