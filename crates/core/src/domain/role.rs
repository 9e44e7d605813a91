use serde::{Deserialize, Serialize};

use crate::domain::ids::{GuildId, RoleId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildRole {
    pub id: RoleId,
    pub name: String,
    /// Roles owned by integrations cannot be assigned by hand.
    pub managed: bool,
}

impl GuildRole {
    pub fn new(id: impl Into<String>, name: impl Into<String>, managed: bool) -> Self {
        Self { id: RoleId::new(id), name: name.into(), managed }
    }

    /// The @everyone role shares the guild's id.
    pub fn is_everyone(&self, guild_id: &GuildId) -> bool {
        self.id.as_str() == guild_id.as_str()
    }

    pub fn is_selectable(&self, guild_id: &GuildId) -> bool {
        !self.managed && !self.is_everyone(guild_id)
    }
}
