use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::{get_app_config_path, read_json_file, write_json_file};
use crate::error::AppError;
use crate::provider::{Provider, ProviderPatch};

pub const DEFAULT_THEME: &str = "persona";

/// 下游 CLI 工具
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AppType {
    #[default]
    Claude,
    Codex,
}

impl AppType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppType::Claude => "claude",
            AppType::Codex => "codex",
        }
    }

    pub fn all() -> [AppType; 2] {
        [AppType::Claude, AppType::Codex]
    }
}

impl std::fmt::Display for AppType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AppType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "claude" => Ok(AppType::Claude),
            "codex" => Ok(AppType::Codex),
            other => Err(AppError::Validation(format!(
                "Unknown target '{other}', expected claude or codex"
            ))),
        }
    }
}

/// ~/.persona/config.json 的根结构
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonaConfig {
    #[serde(default)]
    pub providers: Vec<Provider>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_claude_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_codex_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
}

impl PersonaConfig {
    /// 从默认路径加载；文件不存在时返回空配置
    pub fn load() -> Result<Self, AppError> {
        Self::load_from(&get_app_config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            log::debug!("配置文件不存在，使用空配置: {}", path.display());
            return Ok(Self::default());
        }
        // 存储文件解析失败时直接报错，避免覆盖用户数据
        read_json_file(path)
    }

    pub fn save(&self) -> Result<(), AppError> {
        self.save_to(&get_app_config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), AppError> {
        write_json_file(path, self)
    }

    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    pub fn providers_for(&self, app_type: AppType) -> impl Iterator<Item = &Provider> {
        self.providers
            .iter()
            .filter(move |p| p.app_type() == app_type)
    }

    pub fn get(&self, id: &str) -> Option<&Provider> {
        self.providers.iter().find(|p| p.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Provider> {
        self.providers.iter_mut().find(|p| p.id == id)
    }

    pub fn add(&mut self, provider: Provider) -> Result<(), AppError> {
        if provider.id.trim().is_empty() {
            return Err(AppError::Validation("Provider id is required".into()));
        }
        if provider.name.trim().is_empty() {
            return Err(AppError::Validation("Provider name is required".into()));
        }
        if provider.base_url.trim().is_empty() {
            return Err(AppError::Validation("Base URL is required".into()));
        }
        if provider.api_key.trim().is_empty() {
            return Err(AppError::Validation("API key is required".into()));
        }
        if let Some(existing) = self.get(&provider.id) {
            return Err(AppError::Validation(format!(
                "A provider with id '{}' already exists ({}); choose a different name",
                provider.id, existing.name
            )));
        }
        self.providers.push(provider);
        Ok(())
    }

    pub fn update(&mut self, id: &str, patch: ProviderPatch) -> Result<&Provider, AppError> {
        if patch.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(AppError::Validation("Provider name cannot be empty".into()));
        }
        if patch.base_url.as_deref().is_some_and(|u| u.trim().is_empty()) {
            return Err(AppError::Validation("Base URL cannot be empty".into()));
        }
        if patch.api_key.as_deref().is_some_and(|k| k.trim().is_empty()) {
            return Err(AppError::Validation("API key cannot be empty".into()));
        }
        let provider = self
            .get_mut(id)
            .ok_or_else(|| AppError::provider_not_found(id))?;
        patch.apply(provider);
        Ok(&*provider)
    }

    /// 删除供应商；若它是某个 target 的当前供应商，则同时清空对应指针
    pub fn delete(&mut self, id: &str) -> Result<Provider, AppError> {
        let index = self
            .providers
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| AppError::provider_not_found(id))?;
        let removed = self.providers.remove(index);

        if self.active_claude_provider.as_deref() == Some(id) {
            self.active_claude_provider = None;
        }
        if self.active_codex_provider.as_deref() == Some(id) {
            self.active_codex_provider = None;
        }
        Ok(removed)
    }

    pub fn active_id(&self, app_type: AppType) -> Option<&str> {
        match app_type {
            AppType::Claude => self.active_claude_provider.as_deref(),
            AppType::Codex => self.active_codex_provider.as_deref(),
        }
    }

    pub fn active(&self, app_type: AppType) -> Option<&Provider> {
        self.active_id(app_type).and_then(|id| self.get(id))
    }

    pub fn set_active(&mut self, id: &str, app_type: AppType) -> Result<(), AppError> {
        let provider = self.get(id).ok_or_else(|| AppError::provider_not_found(id))?;
        if provider.app_type() != app_type {
            return Err(AppError::Validation(format!(
                "Provider '{}' targets {}, not {}",
                provider.name,
                provider.app_type(),
                app_type
            )));
        }
        let slot = match app_type {
            AppType::Claude => &mut self.active_claude_provider,
            AppType::Codex => &mut self.active_codex_provider,
        };
        *slot = Some(id.to_string());
        Ok(())
    }

    pub fn clear_active(&mut self, app_type: AppType) {
        match app_type {
            AppType::Claude => self.active_claude_provider = None,
            AppType::Codex => self.active_codex_provider = None,
        }
    }

    pub fn theme(&self) -> &str {
        self.theme
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_THEME)
    }

    pub fn set_theme(&mut self, name: &str) -> Result<(), AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Theme name cannot be empty".into()));
        }
        self.theme = Some(name.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ApiFormat, ProviderForm, ProviderModels, ProviderTarget};

    fn form(name: &str, app_type: AppType) -> Provider {
        ProviderForm {
            name: name.to_string(),
            website: String::new(),
            base_url: "https://api.example.com".into(),
            api_key: "sk-test-123456".into(),
            api_format: ApiFormat::AnthropicMessages,
            models: ProviderModels::default(),
            extra_env: None,
            target: ProviderTarget::for_app(app_type),
        }
        .into_provider()
    }

    #[test]
    fn add_rejects_duplicate_id() {
        let mut cfg = PersonaConfig::default();
        cfg.add(form("Foo", AppType::Claude)).expect("first add");
        let err = cfg
            .add(form("Foo", AppType::Claude))
            .expect_err("duplicate should fail");
        assert!(matches!(err, AppError::Validation(_)));
        cfg.add(form("Foo", AppType::Codex))
            .expect("same name under another target is a different id");
        assert_eq!(cfg.providers().len(), 2);
    }

    #[test]
    fn add_requires_name_and_base_url() {
        let mut cfg = PersonaConfig::default();
        let mut provider = form("Foo", AppType::Claude);
        provider.base_url = " ".into();
        assert!(cfg.add(provider).is_err());
        assert!(cfg.providers().is_empty(), "failed add must not mutate");
    }

    #[test]
    fn api_key_is_required() {
        let mut cfg = PersonaConfig::default();
        let mut provider = form("Foo", AppType::Codex);
        provider.api_key = String::new();
        let err = cfg.add(provider).expect_err("keyless add");
        assert!(matches!(err, AppError::Validation(ref msg) if msg.contains("API key")));
        assert!(cfg.providers().is_empty());

        let provider = form("Bar", AppType::Claude);
        let id = provider.id.clone();
        cfg.add(provider).expect("add");
        let patch = ProviderPatch {
            api_key: Some("  ".into()),
            ..Default::default()
        };
        assert!(cfg.update(&id, patch).is_err());
        assert_eq!(cfg.get(&id).map(|p| p.api_key.as_str()), Some("sk-test-123456"));
    }

    #[test]
    fn delete_clears_only_matching_active_slot() {
        let mut cfg = PersonaConfig::default();
        let claude = form("A", AppType::Claude);
        let codex = form("B", AppType::Codex);
        let (claude_id, codex_id) = (claude.id.clone(), codex.id.clone());
        cfg.add(claude).expect("add claude");
        cfg.add(codex).expect("add codex");
        cfg.set_active(&claude_id, AppType::Claude).expect("activate claude");
        cfg.set_active(&codex_id, AppType::Codex).expect("activate codex");

        cfg.delete(&claude_id).expect("delete");

        assert_eq!(cfg.active_id(AppType::Claude), None);
        assert_eq!(cfg.active_id(AppType::Codex), Some(codex_id.as_str()));
    }

    #[test]
    fn set_active_rejects_wrong_target_and_unknown_id() {
        let mut cfg = PersonaConfig::default();
        let codex = form("B", AppType::Codex);
        let id = codex.id.clone();
        cfg.add(codex).expect("add");

        assert!(cfg.set_active(&id, AppType::Claude).is_err());
        assert!(matches!(
            cfg.set_active("missing", AppType::Codex),
            Err(AppError::NotFound(_))
        ));
        assert_eq!(cfg.active(AppType::Claude), None);
    }

    #[test]
    fn theme_defaults_to_persona() {
        let mut cfg = PersonaConfig::default();
        assert_eq!(cfg.theme(), DEFAULT_THEME);
        cfg.set_theme("dracula").expect("set theme");
        assert_eq!(cfg.theme(), "dracula");
        assert!(cfg.set_theme("  ").is_err());
    }
}
