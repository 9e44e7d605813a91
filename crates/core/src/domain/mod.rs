pub mod category;
pub mod guild_config;
pub mod ids;
pub mod role;
pub mod ticket;
pub mod validation;
