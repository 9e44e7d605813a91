use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::category::Category;
use crate::domain::guild_config::{GuildConfig, PanelLocation, PanelType};
use crate::domain::ids::RoleId;
use crate::domain::validation::ValidationError;

/// In-progress configuration collected by a wizard session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftConfig {
    pub panel_type: PanelType,
    pub panel_title: String,
    pub panel_description: String,
    pub embed_color: String,
    pub panel_image: Option<String>,
    pub welcome_image: Option<String>,
    pub welcome_message: Option<String>,
    pub embed_footer: Option<String>,
    pub ping_roles: BTreeSet<RoleId>,
    pub access_roles: BTreeSet<RoleId>,
    pub ticket_categories: Vec<Category>,
}

impl DraftConfig {
    /// Seeds from the stored configuration. Categories start empty so the
    /// final list is exactly what the operator entered.
    pub fn from_config(config: &GuildConfig) -> Self {
        Self {
            panel_type: config.panel_type,
            panel_title: config.panel_title.clone(),
            panel_description: config.panel_description.clone(),
            embed_color: config.embed_color.clone(),
            panel_image: config.panel_image.clone(),
            welcome_image: config.welcome_image.clone(),
            welcome_message: config.welcome_message.clone(),
            embed_footer: config.embed_footer.clone(),
            ping_roles: config.ping_roles.clone(),
            access_roles: config.access_roles.clone(),
            ticket_categories: Vec::new(),
        }
    }

    pub fn has_category(&self, value: &str) -> bool {
        self.ticket_categories.iter().any(|category| category.value == value)
    }

    pub fn push_category(&mut self, category: Category) -> Result<(), ValidationError> {
        if self.has_category(&category.value) {
            return Err(ValidationError::DuplicateCategory(category.value));
        }
        self.ticket_categories.push(category);
        Ok(())
    }

    /// Overwrites every field the wizard owns, plus the panel location.
    pub fn apply_to(&self, config: &mut GuildConfig, panel: PanelLocation) {
        config.panel_type = self.panel_type;
        config.panel_title = self.panel_title.clone();
        config.panel_description = self.panel_description.clone();
        config.embed_color = self.embed_color.clone();
        config.panel_image = self.panel_image.clone();
        config.welcome_image = self.welcome_image.clone();
        config.welcome_message = self.welcome_message.clone();
        config.embed_footer = self.embed_footer.clone();
        config.ping_roles = self.ping_roles.clone();
        config.access_roles = self.access_roles.clone();
        config.ticket_categories = self.ticket_categories.clone();
        config.panel = Some(panel);
    }
}
