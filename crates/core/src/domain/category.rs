use serde::{Deserialize, Serialize};

use crate::domain::validation::ValidationError;
use crate::emoji::{is_valid_emoji, EmojiRegistry};

/// A ticket type offered on the panel. `value` is the routing token used in
/// component ids and ticket channel names.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub label: String,
    pub value: String,
    pub description: String,
    pub emoji: String,
}

impl Category {
    pub fn new(
        label: impl Into<String>,
        value: impl Into<String>,
        description: impl Into<String>,
        emoji: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            description: description.into(),
            emoji: emoji.into(),
        }
    }

    pub fn has_valid_emoji(&self, registry: &EmojiRegistry) -> bool {
        is_valid_emoji(&self.emoji, registry)
    }
}

/// Parses `label value description... emoji`: the first two words are label and
/// value, the last word is the emoji and everything in between is the description.
pub fn parse_category_line(line: &str) -> Result<Category, ValidationError> {
    let tokens = line.split_whitespace().collect::<Vec<_>>();
    if tokens.len() < 4 {
        return Err(ValidationError::MalformedCategory { token_count: tokens.len() });
    }

    let last = tokens.len() - 1;
    Ok(Category {
        label: tokens[0].to_owned(),
        value: tokens[1].to_owned(),
        description: tokens[2..last].join(" "),
        emoji: tokens[last].to_owned(),
    })
}

/// Parses a category line and checks its emoji against the guild registry.
pub fn parse_category_with_emoji(
    line: &str,
    registry: &EmojiRegistry,
) -> Result<Category, ValidationError> {
    let category = parse_category_line(line)?;
    if !category.has_valid_emoji(registry) {
        return Err(ValidationError::InvalidEmoji(category.emoji));
    }
    Ok(category)
}

#[cfg(test)]
mod tests {
    use super::{parse_category_line, parse_category_with_emoji, Category};
    use crate::domain::validation::ValidationError;
    use crate::emoji::EmojiRegistry;

    #[test]
    fn description_spans_the_middle_tokens() {
        let category =
            parse_category_line("Tech Support tech General tech help 🔧").expect("category");

        assert_eq!(category, Category::new("Tech", "Support", "tech General tech help", "🔧"));
    }

    #[test]
    fn fewer_than_four_tokens_is_malformed() {
        assert_eq!(
            parse_category_line("Billing billing 💳"),
            Err(ValidationError::MalformedCategory { token_count: 3 })
        );
    }

    #[test]
    fn extra_whitespace_is_collapsed() {
        let category = parse_category_line("  Bug   bug   Report  a bug   🐛 ").expect("category");
        assert_eq!(category.description, "Report a bug");
        assert_eq!(category.emoji, "🐛");
    }

    #[test]
    fn emoji_is_checked_against_registry() {
        let registry = EmojiRegistry::default();
        let result = parse_category_with_emoji("Vip vip Priority lane <:vip:404>", &registry);
        assert_eq!(result, Err(ValidationError::InvalidEmoji("<:vip:404>".to_owned())));
    }
}
