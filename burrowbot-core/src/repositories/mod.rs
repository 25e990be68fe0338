// src/repositories/mod.rs

pub mod memory;

pub use burrowbot_common::traits::repository_traits::BotConfigRepository;
pub use memory::MemoryBotConfigRepository;
