pub mod audit;
pub mod config;
pub mod domain;
pub mod emoji;
pub mod errors;
pub mod wizard;

pub use domain::category::{parse_category_line, Category};
pub use domain::guild_config::{GuildConfig, PanelLocation, PanelType};
pub use domain::ids::{ChannelId, EmojiId, GuildId, MessageId, RoleId, UserId};
pub use domain::role::GuildRole;
pub use domain::ticket::{Ticket, TicketId, TicketStatus};
pub use domain::validation::ValidationError;
pub use emoji::{is_valid_emoji, EmojiRegistry};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use wizard::{DraftConfig, SessionKey, SessionStore, WizardEngine, WizardSession};
