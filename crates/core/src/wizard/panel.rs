//! Pure planning of the ticket panel a finished wizard posts.
//!
//! Emoji are checked again here against the live registry, with the same
//! function the wizard used when the category was added. Categories that fail
//! are left off the panel and reported in [`PanelPlan::skipped`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::category::Category;
use crate::domain::guild_config::PanelType;
use crate::emoji::EmojiRegistry;
use crate::wizard::draft::DraftConfig;

pub const CREATE_TICKET_PREFIX: &str = "ticket_create_";
pub const TICKET_TYPE_MENU_ID: &str = "ticket_type";
pub const BUTTONS_PER_ROW: usize = 5;
pub const MAX_BUTTON_ROWS: usize = 5;
pub const MAX_MENU_OPTIONS: usize = 25;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelEmbed {
    pub title: String,
    pub description: String,
    pub color: String,
    pub footer: Option<String>,
    pub image: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelButton {
    pub custom_id: String,
    pub label: String,
    pub emoji: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelMenuOption {
    pub label: String,
    pub value: String,
    pub description: String,
    pub emoji: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PanelComponents {
    Buttons(Vec<Vec<PanelButton>>),
    Menu { custom_id: String, placeholder: String, options: Vec<PanelMenuOption> },
    /// Reactions added to the panel message after it is sent, in order.
    Reactions(Vec<String>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    InvalidEmoji,
    ComponentLimit,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedCategory {
    pub value: String,
    pub emoji: String,
    pub reason: SkipReason,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelPlan {
    pub embed: PanelEmbed,
    pub components: PanelComponents,
    pub skipped: Vec<SkippedCategory>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PanelPlanError {
    #[error("none of the categories has an emoji this server can display")]
    NoValidCategories,
}

pub fn create_ticket_custom_id(value: &str) -> String {
    format!("{CREATE_TICKET_PREFIX}{value}")
}

pub fn parse_create_ticket_custom_id(custom_id: &str) -> Option<&str> {
    custom_id.strip_prefix(CREATE_TICKET_PREFIX).filter(|value| !value.is_empty())
}

pub fn plan_panel(
    draft: &DraftConfig,
    registry: &EmojiRegistry,
) -> Result<PanelPlan, PanelPlanError> {
    let embed = PanelEmbed {
        title: draft.panel_title.clone(),
        description: draft.panel_description.clone(),
        color: draft.embed_color.clone(),
        footer: draft.embed_footer.clone(),
        image: draft.panel_image.clone(),
    };

    let mut skipped = Vec::new();
    let mut valid = Vec::new();
    for category in &draft.ticket_categories {
        if category.has_valid_emoji(registry) {
            valid.push(category);
        } else {
            skipped.push(skip(category, SkipReason::InvalidEmoji));
        }
    }

    let limit = match draft.panel_type {
        PanelType::Buttons => BUTTONS_PER_ROW * MAX_BUTTON_ROWS,
        PanelType::Menu => MAX_MENU_OPTIONS,
        PanelType::Reactions => usize::MAX,
    };
    if valid.len() > limit {
        let overflow =
            valid.drain(limit..).map(|category| skip(category, SkipReason::ComponentLimit));
        skipped.extend(overflow);
    }

    let components = match draft.panel_type {
        PanelType::Buttons => PanelComponents::Buttons(
            valid
                .chunks(BUTTONS_PER_ROW)
                .map(|row| {
                    row.iter()
                        .map(|category| PanelButton {
                            custom_id: create_ticket_custom_id(&category.value),
                            label: category.label.clone(),
                            emoji: category.emoji.clone(),
                        })
                        .collect()
                })
                .collect(),
        ),
        PanelType::Menu => {
            if valid.is_empty() {
                return Err(PanelPlanError::NoValidCategories);
            }
            PanelComponents::Menu {
                custom_id: TICKET_TYPE_MENU_ID.to_owned(),
                placeholder: "Choose a ticket type".to_owned(),
                options: valid
                    .iter()
                    .map(|category| PanelMenuOption {
                        label: category.label.clone(),
                        value: category.value.clone(),
                        description: category.description.clone(),
                        emoji: category.emoji.clone(),
                    })
                    .collect(),
            }
        }
        PanelType::Reactions => PanelComponents::Reactions(
            valid.iter().map(|category| category.emoji.clone()).collect(),
        ),
    };

    Ok(PanelPlan { embed, components, skipped })
}

fn skip(category: &Category, reason: SkipReason) -> SkippedCategory {
    SkippedCategory { value: category.value.clone(), emoji: category.emoji.clone(), reason }
}
