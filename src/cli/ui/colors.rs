use colored::Color;
use colored::Colorize;
use std::sync::{OnceLock, RwLock};

use crate::app_config::AppType;

use inquire::set_global_render_config;
use inquire::ui::{Color as InquireColor, RenderConfig, StyleSheet, Styled};

static ACCENT_TARGET: OnceLock<RwLock<Option<AppType>>> = OnceLock::new();

fn accent_cell() -> &'static RwLock<Option<AppType>> {
    ACCENT_TARGET.get_or_init(|| RwLock::new(None))
}

/// 设置当前命令针对的 target，决定高亮颜色与 inquire 主题
pub fn set_accent_target(app_type: Option<AppType>) {
    if let Ok(mut guard) = accent_cell().write() {
        *guard = app_type;
    }
    apply_inquire_theme();
}

fn accent_target() -> Option<AppType> {
    accent_cell().read().ok().and_then(|guard| *guard)
}

fn inquire_color_for(app_type: AppType) -> InquireColor {
    match app_type {
        AppType::Claude => InquireColor::LightCyan,
        AppType::Codex => InquireColor::LightGreen,
    }
}

fn apply_inquire_theme() {
    if std::env::var("NO_COLOR").is_ok() {
        set_global_render_config(RenderConfig::empty());
        return;
    }

    let Some(app_type) = accent_target() else {
        set_global_render_config(RenderConfig::default());
        return;
    };

    let accent = inquire_color_for(app_type);
    let cfg = RenderConfig::default_colored()
        .with_prompt_prefix(Styled::new("?").with_fg(accent))
        .with_answered_prompt_prefix(Styled::new(">").with_fg(accent))
        .with_highlighted_option_prefix(Styled::new(">").with_fg(accent))
        .with_selected_option(Some(StyleSheet::new().with_fg(accent)))
        .with_help_message(StyleSheet::new().with_fg(accent))
        .with_answer(StyleSheet::new().with_fg(accent));

    set_global_render_config(cfg);
}

pub fn success(text: &str) -> String {
    text.green().to_string()
}

pub fn error(text: &str) -> String {
    text.red().to_string()
}

pub fn warning(text: &str) -> String {
    text.yellow().to_string()
}

pub fn info(text: &str) -> String {
    text.cyan().to_string()
}

pub fn dim(text: &str) -> String {
    text.dimmed().to_string()
}

pub fn target_color(app_type: AppType) -> Color {
    match app_type {
        AppType::Claude => Color::BrightCyan,
        AppType::Codex => Color::BrightGreen,
    }
}

pub fn highlight(text: &str) -> String {
    let Some(app_type) = accent_target() else {
        return text.bright_blue().bold().to_string();
    };
    text.color(target_color(app_type)).bold().to_string()
}

/// target 名称着色，例如 list 表格中的 Target 列
pub fn target_label(app_type: AppType) -> String {
    app_type.as_str().color(target_color(app_type)).to_string()
}
