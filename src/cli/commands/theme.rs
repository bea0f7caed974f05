use crate::cli::ui::{highlight, success};
use crate::error::AppError;
use crate::services::ProviderService;
use crate::store::AppState;

pub fn execute(name: Option<String>) -> Result<(), AppError> {
    let state = AppState::try_new()?;
    match name {
        None => {
            println!("Theme: {}", highlight(&ProviderService::theme(&state)?));
        }
        Some(name) => {
            ProviderService::set_theme(&state, &name)?;
            println!("{}", success(&format!("✓ Theme set to '{}'", name.trim())));
        }
    }
    Ok(())
}
