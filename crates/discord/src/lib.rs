//! Discord interface for tickety
//!
//! - **Gateway** (`gateway`) - event loop with reconnection logic
//! - **Events** (`events`) - message, component and reaction handlers
//! - **Commands** (`commands`) - `$ticket ...`, `$addcategory`, `$removecategory`
//! - **Setup** (`setup`) - the panel setup wizard and its session sweeper
//! - **Tickets** (`tickets`) - opening, closing and sharing ticket channels
//! - **Embeds** (`embeds`) - outgoing message builders
//!
//! # Architecture
//!
//! ```text
//! Gateway → EventDispatcher → Handlers → Setup / Tickets → ChatPlatform
//!                                ↓
//!                        OutgoingMessage ← Reply
//! ```

pub mod audit_sink;
pub mod bot;
pub mod commands;
pub mod embeds;
pub mod events;
pub mod finalize;
pub mod gateway;
pub mod platform;
pub mod setup;
pub mod tickets;

#[cfg(test)]
mod testing;
