use serde::Serialize;

use tickety_core::domain::guild_config::GuildConfig;
use tickety_core::domain::ids::ChannelId;
use tickety_core::errors::{ApplicationError, InterfaceError};
use tickety_core::wizard::{
    PanelComponents, PanelPlan, Prompt, PromptInput, SkipReason, SkippedCategory,
};

pub const COLOR_INFO: u32 = 0x5865F2;
pub const COLOR_SUCCESS: u32 = 0x57F287;
pub const COLOR_ERROR: u32 = 0xED4245;
pub const COLOR_WARNING: u32 = 0xFEE75C;

/// Message bodies longer than this are cut before sending.
pub const MESSAGE_CONTENT_MAX_CHARS: usize = 2000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    Secondary,
    Danger,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Button {
    pub custom_id: String,
    pub label: String,
    pub style: ButtonStyle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
}

impl Button {
    pub fn new(custom_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            custom_id: custom_id.into(),
            label: label.into(),
            style: ButtonStyle::Primary,
            emoji: None,
        }
    }

    pub fn style(mut self, style: ButtonStyle) -> Self {
        self.style = style;
        self
    }

    pub fn emoji(mut self, emoji: impl Into<String>) -> Self {
        self.emoji = Some(emoji.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SelectMenu {
    pub custom_id: String,
    pub placeholder: String,
    pub min_values: usize,
    pub max_values: usize,
    pub options: Vec<SelectOption>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Component {
    Button(Button),
    SelectMenu(SelectMenu),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ActionRow {
    pub components: Vec<Component>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<ActionRow>,
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: Some(content.into()), ..Self::default() }
    }

    /// Every piece of visible text, for assertions and logs.
    pub fn plain_text(&self) -> String {
        let mut parts = Vec::new();
        if let Some(content) = &self.content {
            parts.push(content.clone());
        }
        for embed in &self.embeds {
            parts.extend(embed.title.clone());
            parts.extend(embed.description.clone());
            for field in &embed.fields {
                parts.push(format!("{}: {}", field.name, field.value));
            }
            parts.extend(embed.footer.clone());
        }
        parts.join("\n")
    }

    pub fn custom_ids(&self) -> Vec<&str> {
        self.components
            .iter()
            .flat_map(|row| row.components.iter())
            .map(|component| match component {
                Component::Button(button) => button.custom_id.as_str(),
                Component::SelectMenu(menu) => menu.custom_id.as_str(),
            })
            .collect()
    }
}

pub struct EmbedBuilder {
    embed: Embed,
}

impl EmbedBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        Self { embed: Embed { title: Some(title.into()), ..Embed::default() } }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.embed.description = Some(description.into());
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.embed.color = Some(color);
        self
    }

    pub fn footer(mut self, footer: Option<String>) -> Self {
        self.embed.footer = footer;
        self
    }

    pub fn image(mut self, url: Option<String>) -> Self {
        self.embed.image_url = url;
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let field = EmbedField { name: name.into(), value: value.into(), inline: false };
        self.embed.fields.push(field);
        self
    }

    pub fn build(self) -> Embed {
        self.embed
    }
}

pub struct MessageBuilder {
    message: OutgoingMessage,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self { message: OutgoingMessage::default() }
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        let content = content.into();
        self.message.content = if content.is_empty() { None } else { Some(content) };
        self
    }

    pub fn embed(mut self, embed: Embed) -> Self {
        self.message.embeds.push(embed);
        self
    }

    pub fn row(mut self, components: Vec<Component>) -> Self {
        if !components.is_empty() {
            self.message.components.push(ActionRow { components });
        }
        self
    }

    pub fn build(self) -> OutgoingMessage {
        self.message
    }
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// `#RRGGBB` to the integer the platform expects. Malformed input yields `None`.
pub fn color_value(hex: &str) -> Option<u32> {
    let digits = hex.strip_prefix('#')?;
    if digits.len() != 6 {
        return None;
    }
    u32::from_str_radix(digits, 16).ok()
}

pub fn info_message(title: &str, description: &str) -> OutgoingMessage {
    MessageBuilder::new()
        .embed(EmbedBuilder::new(title).description(description).color(COLOR_INFO).build())
        .build()
}

pub fn success_message(description: &str) -> OutgoingMessage {
    MessageBuilder::new()
        .embed(EmbedBuilder::new("Done").description(description).color(COLOR_SUCCESS).build())
        .build()
}

pub fn error_message(description: &str) -> OutgoingMessage {
    MessageBuilder::new()
        .embed(
            EmbedBuilder::new("Something went wrong")
                .description(description)
                .color(COLOR_ERROR)
                .build(),
        )
        .build()
}

pub fn usage_message(prefix: &str) -> OutgoingMessage {
    let examples = [
        "ticket setup #channel",
        "ticket paneltype buttons",
        "ticket setcolor #FF0000",
        "ticket setimage <url>",
        "ticket setwelcomeimage <url>",
        "ticket pingrole @role",
        "ticket accessrole @role",
        "ticket log #channel",
        "ticket limit 10",
        "ticket close",
        "ticket closeall",
        "ticket add <id>",
        "ticket remove <id>",
        "addcategory <label> <value> <description> <emoji>",
        "removecategory <value>",
    ];
    let body = examples.iter().map(|example| format!("`{prefix}{example}`")).collect::<Vec<_>>();
    MessageBuilder::new()
        .embed(
            EmbedBuilder::new("Incorrect usage")
                .description(format!("Examples:\n{}", body.join("\n")))
                .color(COLOR_WARNING)
                .build(),
        )
        .build()
}

/// Validation and permission failures show their detail; anything else gets
/// the generic text plus a reference for the logs.
pub fn failure_message(error: ApplicationError, correlation_id: &str) -> OutgoingMessage {
    let interface = error.into_interface(correlation_id);
    match &interface {
        InterfaceError::BadRequest { message, .. } | InterfaceError::Forbidden { message, .. } => {
            error_message(message)
        }
        InterfaceError::ServiceUnavailable { .. } | InterfaceError::Internal { .. } => {
            error_message(&format!(
                "{} (ref `{}`)",
                interface.user_message(),
                interface.correlation_id()
            ))
        }
    }
}

pub fn ticket_created_message(channel_id: &ChannelId) -> OutgoingMessage {
    success_message(&format!("Your ticket was created: <#{channel_id}>"))
}

pub fn timeout_notice() -> OutgoingMessage {
    MessageBuilder::new()
        .embed(
            EmbedBuilder::new("Setup expired")
                .description(
                    "The ticket setup timed out after a period of inactivity. \
                     Run `ticket setup` again to start over.",
                )
                .color(COLOR_WARNING)
                .build(),
        )
        .build()
}

/// One wizard prompt: the step embed plus a select menu when the step asks for a choice.
pub fn prompt_message(prompt: &Prompt) -> OutgoingMessage {
    let mut embed = EmbedBuilder::new(&prompt.heading).description(&prompt.body).color(COLOR_INFO);
    if let Some(error) = &prompt.error {
        embed = embed.field("Try again", error).color(COLOR_ERROR);
    }

    let mut builder = MessageBuilder::new().embed(embed.build());
    if let PromptInput::Choice { custom_id, options, max_values } = &prompt.input {
        let menu = SelectMenu {
            custom_id: custom_id.clone(),
            placeholder: "Choose an option".to_owned(),
            min_values: 1,
            max_values: (*max_values).max(1),
            options: options
                .iter()
                .map(|option| SelectOption {
                    label: option.label.clone(),
                    value: option.value.clone(),
                    description: option.description.clone(),
                    emoji: None,
                })
                .collect(),
        };
        builder = builder.row(vec![Component::SelectMenu(menu)]);
    }
    builder.build()
}

pub fn panel_message(plan: &PanelPlan) -> OutgoingMessage {
    let embed = EmbedBuilder::new(&plan.embed.title)
        .description(&plan.embed.description)
        .color(color_value(&plan.embed.color).unwrap_or(COLOR_INFO))
        .footer(plan.embed.footer.clone())
        .image(plan.embed.image.clone())
        .build();

    let mut builder = MessageBuilder::new().embed(embed);
    match &plan.components {
        PanelComponents::Buttons(rows) => {
            for row in rows {
                builder = builder.row(
                    row.iter()
                        .map(|button| {
                            Component::Button(
                                Button::new(&button.custom_id, &button.label).emoji(&button.emoji),
                            )
                        })
                        .collect(),
                );
            }
        }
        PanelComponents::Menu { custom_id, placeholder, options } => {
            let menu = SelectMenu {
                custom_id: custom_id.clone(),
                placeholder: placeholder.clone(),
                min_values: 1,
                max_values: 1,
                options: options
                    .iter()
                    .map(|option| SelectOption {
                        label: option.label.clone(),
                        value: option.value.clone(),
                        description: Some(option.description.clone()),
                        emoji: Some(option.emoji.clone()),
                    })
                    .collect(),
            };
            builder = builder.row(vec![Component::SelectMenu(menu)]);
        }
        PanelComponents::Reactions(_) => {}
    }
    builder.build()
}

pub fn skipped_categories_note(skipped: &[SkippedCategory]) -> Option<String> {
    if skipped.is_empty() {
        return None;
    }
    let lines = skipped
        .iter()
        .map(|category| {
            let reason = match category.reason {
                SkipReason::InvalidEmoji => "emoji not available on this server",
                SkipReason::ComponentLimit => "panel is full",
            };
            format!("`{}` ({}): {reason}", category.value, category.emoji)
        })
        .collect::<Vec<_>>();
    Some(format!("Skipped categories:\n{}", lines.join("\n")))
}

/// First message in a new ticket channel.
pub fn welcome_message(
    config: &GuildConfig,
    ticket_type: &str,
    creator_mention: &str,
) -> OutgoingMessage {
    let mut embed = EmbedBuilder::new(config.render_welcome_title(ticket_type))
        .color(color_value(&config.embed_color).unwrap_or(COLOR_INFO))
        .footer(config.embed_footer.clone())
        .image(config.welcome_image.clone());
    if let Some(message) = config.render_welcome_message(creator_mention) {
        embed = embed.description(message);
    }

    let pings = if config.notify_support {
        config.ping_roles.iter().map(|role| format!("<@&{role}>")).collect::<Vec<_>>().join(" ")
    } else {
        String::new()
    };

    MessageBuilder::new().content(pings).embed(embed.build()).build()
}

/// Transcript blocks are cut to fit one message.
pub fn transcript_message(channel_name: &str, lines: &[String]) -> OutgoingMessage {
    let header = format!("Transcript for ticket {channel_name}:\n```\n");
    let footer = "\n```";
    let budget = MESSAGE_CONTENT_MAX_CHARS.saturating_sub(header.chars().count() + footer.len());

    let body = lines.join("\n");
    let body = match body.char_indices().nth(budget) {
        Some((index, _)) => &body[..index],
        None => body.as_str(),
    };
    OutgoingMessage::text(format!("{header}{body}{footer}"))
}
