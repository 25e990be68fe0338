// File: src/services/mod.rs

pub mod builtin_commands;
pub mod command_service;
pub mod extension_service;
pub mod interaction_service;
pub mod settings_service;

pub use command_service::{CommandRegistry, CommandService};
pub use extension_service::ExtensionService;
pub use interaction_service::InteractionController;
pub use settings_service::SettingsService;
