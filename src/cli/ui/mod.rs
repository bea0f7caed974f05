mod colors;

pub use colors::{
    dim, error, highlight, info, set_accent_target, success, target_color, target_label, warning,
};

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};

pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// inquire 被用户取消（Esc / Ctrl-C）时返回 `None`
pub fn prompt_result<T>(
    result: Result<T, inquire::InquireError>,
) -> Result<Option<T>, crate::error::AppError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(inquire::InquireError::OperationCanceled)
        | Err(inquire::InquireError::OperationInterrupted) => Ok(None),
        Err(e) => Err(crate::error::AppError::Message(format!("Prompt failed: {e}"))),
    }
}
