use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::category::Category;
use crate::domain::ids::{ChannelId, GuildId, MessageId, RoleId};
use crate::domain::validation::{parse_ticket_limit, ValidationError};

pub const DEFAULT_PREFIX: &str = "$";
pub const DEFAULT_EMBED_COLOR: &str = "#5865F2";
pub const DEFAULT_TICKET_LIMIT: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelType {
    Buttons,
    Menu,
    Reactions,
}

impl PanelType {
    pub const ALL: [PanelType; 3] = [PanelType::Buttons, PanelType::Menu, PanelType::Reactions];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buttons => "buttons",
            Self::Menu => "menu",
            Self::Reactions => "reactions",
        }
    }
}

impl fmt::Display for PanelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PanelType {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "buttons" => Ok(Self::Buttons),
            "menu" => Ok(Self::Menu),
            "reactions" => Ok(Self::Reactions),
            other => Err(ValidationError::UnknownPanelType(other.to_owned())),
        }
    }
}

/// Where the rendered panel lives, so later panel interactions can be routed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelLocation {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

/// Per-guild ticketing configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildConfig {
    pub guild_id: GuildId,
    pub prefix: String,
    pub panel_type: PanelType,
    pub panel_title: String,
    pub panel_description: String,
    pub embed_color: String,
    pub embed_footer: Option<String>,
    pub panel_image: Option<String>,
    pub welcome_image: Option<String>,
    /// `{type}` is replaced with the category value.
    pub welcome_title: String,
    /// `{user}` is replaced with a mention of the ticket creator.
    pub welcome_message: Option<String>,
    pub close_message: String,
    pub ticket_categories: Vec<Category>,
    pub ping_roles: BTreeSet<RoleId>,
    pub access_roles: BTreeSet<RoleId>,
    pub parent_category_id: Option<ChannelId>,
    pub ticket_limit: u32,
    pub transcript_channel_id: Option<ChannelId>,
    pub notify_support: bool,
    pub panel: Option<PanelLocation>,
}

impl GuildConfig {
    pub fn new(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            prefix: DEFAULT_PREFIX.to_owned(),
            panel_type: PanelType::Menu,
            panel_title: "🎫 Ticket System".to_owned(),
            panel_description: "Pick a ticket type from the menu below.".to_owned(),
            embed_color: DEFAULT_EMBED_COLOR.to_owned(),
            embed_footer: Some("Powered by Tickety".to_owned()),
            panel_image: None,
            welcome_image: None,
            welcome_title: "Ticket {type}".to_owned(),
            welcome_message: Some("Welcome, {user}! Tell us how we can help.".to_owned()),
            close_message: "This ticket has been closed. The channel will be deleted in 5 seconds."
                .to_owned(),
            ticket_categories: vec![
                Category::new("General Support", "general", "For general questions.", "❓"),
                Category::new("Bug Report", "bug", "For reporting a bug.", "🐛"),
                Category::new("Technical Question", "technical", "For technical problems.", "🔧"),
            ],
            ping_roles: BTreeSet::new(),
            access_roles: BTreeSet::new(),
            parent_category_id: None,
            ticket_limit: DEFAULT_TICKET_LIMIT,
            transcript_channel_id: None,
            notify_support: true,
            panel: None,
        }
    }

    pub fn category(&self, value: &str) -> Option<&Category> {
        self.ticket_categories.iter().find(|category| category.value == value)
    }

    /// Reaction panels route by emoji; the first category using it wins.
    pub fn category_by_emoji(&self, emoji: &str) -> Option<&Category> {
        self.ticket_categories.iter().find(|category| category.emoji == emoji)
    }

    pub fn add_category(&mut self, category: Category) -> Result<(), ValidationError> {
        if self.category(&category.value).is_some() {
            return Err(ValidationError::DuplicateCategory(category.value));
        }
        self.ticket_categories.push(category);
        Ok(())
    }

    pub fn remove_category(&mut self, value: &str) -> Result<Category, ValidationError> {
        let index = self
            .ticket_categories
            .iter()
            .position(|category| category.value == value)
            .ok_or_else(|| ValidationError::UnknownCategory(value.to_owned()))?;
        Ok(self.ticket_categories.remove(index))
    }

    /// Returns false when the role was already present.
    pub fn add_ping_role(&mut self, role: RoleId) -> bool {
        self.ping_roles.insert(role)
    }

    pub fn add_access_role(&mut self, role: RoleId) -> bool {
        self.access_roles.insert(role)
    }

    pub fn set_ticket_limit(&mut self, limit: u32) -> Result<(), ValidationError> {
        self.ticket_limit = parse_ticket_limit(limit)?;
        Ok(())
    }

    pub fn is_panel_message(&self, message_id: &MessageId) -> bool {
        self.panel.as_ref().map(|panel| &panel.message_id == message_id).unwrap_or(false)
    }

    pub fn render_welcome_title(&self, ticket_type: &str) -> String {
        self.welcome_title.replace("{type}", ticket_type)
    }

    pub fn render_welcome_message(&self, creator_mention: &str) -> Option<String> {
        self.welcome_message.as_ref().map(|message| message.replace("{user}", creator_mention))
    }
}
