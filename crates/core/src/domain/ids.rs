use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! snowflake_id {
    ($($name:ident),+ $(,)?) => {
        $(
            #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
            pub struct $name(pub String);

            impl $name {
                pub fn new(value: impl Into<String>) -> Self {
                    Self(value.into())
                }

                pub fn as_str(&self) -> &str {
                    &self.0
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }
        )+
    };
}

snowflake_id!(GuildId, UserId, ChannelId, RoleId, MessageId, EmojiId);

/// Platform ids are decimal snowflakes.
pub fn is_snowflake(value: &str) -> bool {
    !value.is_empty() && value.len() <= 20 && value.bytes().all(|byte| byte.is_ascii_digit())
}

/// Extracts the id from `<#123>`, `<@&123>`, `<@123>`, `<@!123>` mentions or a bare id.
pub fn parse_mention(token: &str) -> Option<String> {
    let trimmed = token.trim();
    let inner = trimmed
        .strip_prefix('<')
        .and_then(|rest| rest.strip_suffix('>'))
        .map(|inner| inner.trim_start_matches(|ch: char| matches!(ch, '#' | '@' | '&' | '!')))
        .unwrap_or(trimmed);

    is_snowflake(inner).then(|| inner.to_owned())
}
