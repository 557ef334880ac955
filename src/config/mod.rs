//! Configuration management.

mod prompts;
mod settings;

pub use prompts::{ChatPrompts, GroundingPrompts, Prompts};
pub use settings::{
    ChatSettings, EmbeddingSettings, GeneralSettings, GroundingMethod, IndexSettings,
    PromptSettings, ProviderSpecialty, RecordSettings, Settings, SplittingSettings,
};
