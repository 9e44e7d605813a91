use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;
use url::Url;

use crate::domain::guild_config::PanelType;

pub const PANEL_TITLE_MAX_CHARS: usize = 256;
pub const PANEL_DESCRIPTION_MAX_CHARS: usize = 2048;
pub const WELCOME_MESSAGE_MAX_CHARS: usize = 2048;
pub const EMBED_FOOTER_MAX_CHARS: usize = 2048;
pub const MINIMUM_TICKET_LIMIT: u32 = 5;

/// Literal operators type to leave an optional field empty.
pub const NONE_TOKEN: &str = "none";

const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif"];

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("the panel title cannot be empty")]
    EmptyTitle,
    #[error("`{0}` is not a hex color like #FF0000")]
    InvalidColor(String),
    #[error("`{0}` is not an image URL ending in jpg, jpeg, png or gif")]
    InvalidImageUrl(String),
    #[error("unknown panel type `{0}` (expected buttons, menu or reactions)")]
    UnknownPanelType(String),
    #[error("a category needs `<label> <value> <description> <emoji>`, got {token_count} word(s)")]
    MalformedCategory { token_count: usize },
    #[error("`{0}` is not a Unicode emoji or a custom emoji from this server")]
    InvalidEmoji(String),
    #[error("a category with value `{0}` already exists")]
    DuplicateCategory(String),
    #[error("category `{0}` does not exist")]
    UnknownCategory(String),
    #[error("add at least one category before finishing")]
    NoCategories,
    #[error("`{0}` is not one of the offered roles")]
    UnknownRole(String),
    #[error("no option was selected")]
    EmptySelection,
    #[error("`{0}` is not a text channel on this server")]
    UnknownChannel(String),
    #[error("`{0}` is not a valid user or role id")]
    InvalidId(String),
    #[error("the ticket limit must be at least {minimum}, got {limit}")]
    TicketLimitTooLow { limit: u32, minimum: u32 },
}

fn hex_color_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("hex color pattern compiles"))
}

/// Truncates on character boundaries, never splitting a code point.
pub fn truncate_chars(input: &str, max_chars: usize) -> String {
    match input.char_indices().nth(max_chars) {
        Some((byte_index, _)) => input[..byte_index].to_owned(),
        None => input.to_owned(),
    }
}

pub fn is_none_token(input: &str) -> bool {
    input.trim().eq_ignore_ascii_case(NONE_TOKEN)
}

pub fn parse_panel_type(input: &str) -> Result<PanelType, ValidationError> {
    input.parse()
}

pub fn parse_panel_title(input: &str) -> Result<String, ValidationError> {
    let title = truncate_chars(input.trim(), PANEL_TITLE_MAX_CHARS);
    if title.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    Ok(title)
}

pub fn parse_panel_description(input: &str) -> String {
    truncate_chars(input.trim(), PANEL_DESCRIPTION_MAX_CHARS)
}

pub fn parse_hex_color(input: &str) -> Result<String, ValidationError> {
    let candidate = input.trim();
    if hex_color_re().is_match(candidate) {
        Ok(candidate.to_owned())
    } else {
        Err(ValidationError::InvalidColor(candidate.to_owned()))
    }
}

/// `none` clears the image; anything else must be an http(s) URL to a jpg/jpeg/png/gif.
pub fn parse_image_url(input: &str) -> Result<Option<String>, ValidationError> {
    let candidate = input.trim();
    if is_none_token(candidate) {
        return Ok(None);
    }

    let invalid = || ValidationError::InvalidImageUrl(candidate.to_owned());
    let url = Url::parse(candidate).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid());
    }

    let path = url.path().to_ascii_lowercase();
    if IMAGE_EXTENSIONS.iter().any(|extension| path.ends_with(extension)) {
        Ok(Some(candidate.to_owned()))
    } else {
        Err(invalid())
    }
}

/// `none` clears the field; anything else is kept, truncated to `max_chars`.
pub fn parse_optional_text(input: &str, max_chars: usize) -> Option<String> {
    let candidate = input.trim();
    if is_none_token(candidate) || candidate.is_empty() {
        None
    } else {
        Some(truncate_chars(candidate, max_chars))
    }
}

pub fn parse_ticket_limit(limit: u32) -> Result<u32, ValidationError> {
    if limit < MINIMUM_TICKET_LIMIT {
        return Err(ValidationError::TicketLimitTooLow { limit, minimum: MINIMUM_TICKET_LIMIT });
    }
    Ok(limit)
}
