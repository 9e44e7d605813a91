//! Emoji validity for category tokens.
//!
//! A token is valid when it is a single Unicode emoji grapheme, or a custom-emoji
//! reference (`<:name:id>` / `<a:name:id>`) whose id is registered on the guild.
//! The same function is used when a category is added and when a panel is rendered.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::ids::EmojiId;

const UNICODE_EMOJI_PATTERN: &str = concat!(
    r"^(?:",
    // keycaps: 1️⃣ #️⃣
    r"[0-9#*]\x{FE0F}?\x{20E3}",
    // flags: pairs of regional indicators
    r"|[\x{1F1E6}-\x{1F1FF}]{2}",
    // pictographs with optional presentation selector, skin tone and ZWJ sequences
    r"|\p{Extended_Pictographic}[\x{FE0F}\x{1F3FB}-\x{1F3FF}]*",
    r"(?:\x{200D}\p{Extended_Pictographic}[\x{FE0F}\x{1F3FB}-\x{1F3FF}]*)*",
    r")$"
);

const CUSTOM_EMOJI_PATTERN: &str = r"^<(a?):([A-Za-z0-9_]{2,32}):([0-9]{1,20})>$";

fn unicode_emoji_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(UNICODE_EMOJI_PATTERN).expect("unicode emoji pattern compiles"))
}

fn custom_emoji_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(CUSTOM_EMOJI_PATTERN).expect("custom emoji pattern compiles"))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomEmoji {
    pub name: String,
    pub id: EmojiId,
    pub animated: bool,
}

/// Snapshot of the custom emojis registered on one guild.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmojiRegistry {
    ids: BTreeSet<EmojiId>,
}

impl EmojiRegistry {
    pub fn new<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = EmojiId>,
    {
        Self { ids: ids.into_iter().collect() }
    }

    pub fn contains(&self, id: &EmojiId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

pub fn parse_custom_emoji(token: &str) -> Option<CustomEmoji> {
    let captures = custom_emoji_re().captures(token.trim())?;
    Some(CustomEmoji {
        animated: !captures[1].is_empty(),
        name: captures[2].to_owned(),
        id: EmojiId(captures[3].to_owned()),
    })
}

pub fn is_unicode_emoji(token: &str) -> bool {
    unicode_emoji_re().is_match(token)
}

pub fn is_valid_emoji(token: &str, registry: &EmojiRegistry) -> bool {
    if is_unicode_emoji(token) {
        return true;
    }
    parse_custom_emoji(token).map(|emoji| registry.contains(&emoji.id)).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::{is_unicode_emoji, is_valid_emoji, parse_custom_emoji, EmojiRegistry};
    use crate::domain::ids::EmojiId;

    #[test]
    fn single_unicode_graphemes_are_valid() {
        for token in ["🔧", "❓", "🐛", "👍🏽", "1️⃣", "🇷🇴", "👩‍💻", "❤️"] {
            assert!(is_unicode_emoji(token), "{token} should be a single emoji");
        }
    }

    #[test]
    fn text_and_multiple_emojis_are_rejected() {
        for token in ["a", "ok", "🔧🔧", "🔧x", "", ":wrench:"] {
            assert!(!is_unicode_emoji(token), "{token} should be rejected");
        }
    }

    #[test]
    fn custom_emoji_requires_registration_on_the_guild() {
        let registry = EmojiRegistry::new([EmojiId::new("112233")]);

        assert!(is_valid_emoji("<:ticket:112233>", &registry));
        assert!(is_valid_emoji("<a:party:112233>", &registry));
        assert!(!is_valid_emoji("<:ticket:999999>", &registry));
        assert!(!is_valid_emoji("<:ticket:112233>", &EmojiRegistry::default()));
    }

    #[test]
    fn custom_emoji_parts_are_extracted() {
        let emoji = parse_custom_emoji("<a:party_parrot:4455>").expect("custom emoji");
        assert!(emoji.animated);
        assert_eq!(emoji.name, "party_parrot");
        assert_eq!(emoji.id, EmojiId::new("4455"));
        assert!(parse_custom_emoji("<:x:12>").is_none());
    }
}
