// Core modules
mod app_config;
mod config;
mod error;
mod general_config;
mod provider;
mod services;
mod store;

#[cfg(test)]
mod test_support;

// CLI module
pub mod cli;

// Public exports
pub use app_config::{AppType, PersonaConfig, DEFAULT_THEME};
pub use config::{
    get_app_config_dir, get_app_config_path, get_claude_settings_path, get_codex_auth_path,
    get_codex_config_path, read_json_file,
};
pub use error::AppError;
pub use general_config::{general_config_path, CodexGeneralConfig, GeneralConfig, GeneralEntry};
pub use provider::{
    mask_api_key, ApiFormat, CodexOptions, Provider, ProviderForm, ProviderModels, ProviderPatch,
    ProviderTarget,
};
pub use services::provider::live::{CodexPreview, LiveCodexStatus};
pub use services::{
    ConfigService, GeneralConfigLine, LivePreview, ProbeService, ProviderService, StatusReport,
    TestResult, TimingBreakdown,
};
pub use store::AppState;
