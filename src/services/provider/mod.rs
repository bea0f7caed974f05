pub mod live;
pub mod merge;

use indexmap::IndexMap;
use serde_json::Value;

use crate::app_config::{AppType, PersonaConfig};
use crate::error::AppError;
use crate::general_config::{CodexGeneralConfig, GeneralConfig};
use crate::provider::{Provider, ProviderForm, ProviderPatch};
use crate::store::AppState;

use live::{CodexPreview, LiveCodexStatus, LiveSnapshot};

/// 供应商相关业务逻辑
pub struct ProviderService;

/// 写入 live 配置的动作
#[derive(Debug, Clone)]
enum LiveWrite {
    /// 激活供应商（通用配置 + 供应商字段）
    Apply(Provider),
    /// 没有激活的供应商时只写入通用配置
    GeneralOnly(AppType),
    /// 清除供应商写入的内容
    Clear(AppType),
}

impl LiveWrite {
    fn app_type(&self) -> AppType {
        match self {
            LiveWrite::Apply(provider) => provider.app_type(),
            LiveWrite::GeneralOnly(app_type) | LiveWrite::Clear(app_type) => *app_type,
        }
    }
}

/// `use --dry-run` 的计算结果
#[derive(Debug, Clone, PartialEq)]
pub enum LivePreview {
    Claude(Value),
    Codex(CodexPreview),
}

/// `status` 命令所需的全部信息
#[derive(Debug, Clone, Default)]
pub struct StatusReport {
    pub claude: Option<Provider>,
    pub codex: Option<Provider>,
    pub claude_env: IndexMap<String, String>,
    pub codex_live: LiveCodexStatus,
}

impl ProviderService {
    /// 重新加载 → 修改 → 写入 live 配置 → 保存；任一步失败都回滚内存状态与 live 文件
    fn run_transaction<R, F>(state: &AppState, f: F) -> Result<R, AppError>
    where
        F: FnOnce(&mut PersonaConfig) -> Result<(R, Option<LiveWrite>), AppError>,
    {
        state.reload()?;

        let mut guard = state.config.write().map_err(AppError::from)?;
        let original = guard.clone();
        let (result, action) = match f(&mut guard) {
            Ok(value) => value,
            Err(err) => {
                *guard = original;
                return Err(err);
            }
        };
        drop(guard);

        let backup = match &action {
            Some(action) => match LiveSnapshot::capture(action.app_type()) {
                Ok(snapshot) => Some(snapshot),
                Err(err) => {
                    Self::restore_memory(state, original);
                    return Err(err);
                }
            },
            None => None,
        };

        if let Some(action) = &action {
            if let Err(err) = Self::apply_live(action) {
                Self::restore_memory(state, original);
                if let Some(backup) = &backup {
                    backup.restore_best_effort();
                }
                return Err(err);
            }
        }

        if let Err(save_err) = state.save() {
            Self::restore_memory(state, original);
            if let Some(backup) = &backup {
                backup.restore_best_effort();
            }
            return Err(save_err);
        }

        Ok(result)
    }

    fn restore_memory(state: &AppState, snapshot: PersonaConfig) {
        match state.config.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(err) => log::error!("恢复内存配置失败: {err}"),
        }
    }

    fn apply_live(action: &LiveWrite) -> Result<(), AppError> {
        match action {
            LiveWrite::Apply(provider) => match provider.app_type() {
                AppType::Claude => {
                    live::apply_claude(provider, &GeneralConfig::load(), true)?;
                }
                AppType::Codex => {
                    live::apply_codex(provider, &CodexGeneralConfig::load(), true)?;
                }
            },
            LiveWrite::GeneralOnly(AppType::Claude) => {
                live::apply_claude_general(&GeneralConfig::load(), true)?;
            }
            LiveWrite::GeneralOnly(AppType::Codex) => {
                log::info!("没有激活的 Codex 供应商，跳过写入");
            }
            LiveWrite::Clear(AppType::Claude) => {
                live::clear_claude()?;
            }
            LiveWrite::Clear(AppType::Codex) => {
                live::clear_codex()?;
            }
        }
        Ok(())
    }

    /// 激活前的校验，失败时不写入任何文件
    fn validate_for_activation(provider: &Provider) -> Result<(), AppError> {
        if provider.app_type() == AppType::Codex && provider.api_key.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "Provider '{}' has no API key; codex requires one",
                provider.name
            )));
        }
        Ok(())
    }

    /// 列出供应商，可按 target 过滤；顺序为插入顺序
    pub fn list(state: &AppState, filter: Option<AppType>) -> Result<Vec<Provider>, AppError> {
        let config = state.config.read().map_err(AppError::from)?;
        Ok(match filter {
            Some(app_type) => config.providers_for(app_type).cloned().collect(),
            None => config.providers().to_vec(),
        })
    }

    pub fn get(state: &AppState, id: &str) -> Result<Provider, AppError> {
        let config = state.config.read().map_err(AppError::from)?;
        config
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::provider_not_found(id))
    }

    /// 当前激活的供应商
    pub fn current(state: &AppState, app_type: AppType) -> Result<Option<Provider>, AppError> {
        let config = state.config.read().map_err(AppError::from)?;
        Ok(config.active(app_type).cloned())
    }

    /// 新增供应商，返回生成 id 后的记录
    pub fn add(state: &AppState, form: ProviderForm) -> Result<Provider, AppError> {
        let provider = form.into_provider();
        log::debug!("新增供应商 {} ({})", provider.name, provider.id);
        Self::run_transaction(state, move |config| {
            config.add(provider.clone())?;
            Ok((provider, None))
        })
    }

    /// 更新供应商；若它是当前激活的供应商，则同时刷新 live 配置
    pub fn update(state: &AppState, id: &str, patch: ProviderPatch) -> Result<Provider, AppError> {
        if patch.is_empty() {
            return Err(AppError::Validation("Nothing to update".into()));
        }
        Self::run_transaction(state, |config| {
            let updated = config.update(id, patch)?.clone();
            let is_active = config.active_id(updated.app_type()) == Some(id);
            let action = if is_active {
                Self::validate_for_activation(&updated)?;
                Some(LiveWrite::Apply(updated.clone()))
            } else {
                None
            };
            Ok((updated, action))
        })
    }

    /// 删除供应商；live 配置保持不变，仅清空引用它的激活指针
    pub fn delete(state: &AppState, id: &str) -> Result<Provider, AppError> {
        Self::run_transaction(state, |config| Ok((config.delete(id)?, None)))
    }

    /// 切换到指定供应商：写入 live 配置后再保存激活指针
    pub fn switch(state: &AppState, id: &str) -> Result<Provider, AppError> {
        Self::run_transaction(state, |config| {
            let provider = config
                .get(id)
                .cloned()
                .ok_or_else(|| AppError::provider_not_found(id))?;
            Self::validate_for_activation(&provider)?;
            config.set_active(id, provider.app_type())?;
            log::info!("切换 {} 供应商 -> {}", provider.app_type(), provider.name);
            Ok((provider.clone(), Some(LiveWrite::Apply(provider))))
        })
    }

    /// 只计算、不写入切换后的 live 配置
    pub fn preview(state: &AppState, id: &str) -> Result<LivePreview, AppError> {
        let provider = Self::get(state, id)?;
        Self::validate_for_activation(&provider)?;
        match provider.app_type() {
            AppType::Claude => {
                live::apply_claude(&provider, &GeneralConfig::load(), false).map(LivePreview::Claude)
            }
            AppType::Codex => live::apply_codex(&provider, &CodexGeneralConfig::load(), false)
                .map(LivePreview::Codex),
        }
    }

    /// 清除 target 上由供应商写入的配置，并清空激活指针
    pub fn clear(state: &AppState, app_type: AppType) -> Result<(), AppError> {
        Self::run_transaction(state, |config| {
            config.clear_active(app_type);
            Ok(((), Some(LiveWrite::Clear(app_type))))
        })
    }

    /// 按当前存储重新写入 live 配置（`use --update`）
    ///
    /// 有激活的供应商时重新应用它，否则只应用通用配置。
    pub fn refresh_live(state: &AppState, app_type: AppType) -> Result<Option<Provider>, AppError> {
        Self::run_transaction(state, |config| {
            let active = config.active(app_type).cloned();
            let action = match &active {
                Some(provider) => {
                    Self::validate_for_activation(provider)?;
                    LiveWrite::Apply(provider.clone())
                }
                None => LiveWrite::GeneralOnly(app_type),
            };
            Ok((active, Some(action)))
        })
    }

    pub fn status(state: &AppState) -> Result<StatusReport, AppError> {
        let config = state.snapshot()?;
        let claude = config.active(AppType::Claude).cloned();
        let codex = config.active(AppType::Codex).cloned();
        let codex_live = live::read_live_codex().unwrap_or_else(|err| {
            log::warn!("读取 Codex 配置失败: {err}");
            LiveCodexStatus::default()
        });
        Ok(StatusReport {
            claude,
            codex,
            claude_env: live::read_live_env(),
            codex_live,
        })
    }

    pub fn theme(state: &AppState) -> Result<String, AppError> {
        let config = state.config.read().map_err(AppError::from)?;
        Ok(config.theme().to_string())
    }

    pub fn set_theme(state: &AppState, name: &str) -> Result<(), AppError> {
        Self::run_transaction(state, |config| Ok((config.set_theme(name)?, None)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        get_claude_settings_path, get_codex_config_path, read_json_file, write_json_file,
        write_text_file,
    };
    use crate::provider::{ApiFormat, CodexOptions, ProviderModels, ProviderTarget};
    use crate::test_support::EnvGuard;
    use serial_test::serial;
    use tempfile::TempDir;

    fn claude_form(name: &str) -> ProviderForm {
        ProviderForm {
            name: name.into(),
            website: String::new(),
            base_url: format!("https://{}.example", name.to_lowercase()),
            api_key: "sk-123456789".into(),
            api_format: ApiFormat::AnthropicMessages,
            models: ProviderModels {
                default: Some("m-default".into()),
                ..Default::default()
            },
            extra_env: None,
            target: ProviderTarget::Claude,
        }
    }

    #[test]
    #[serial]
    fn updating_active_provider_rewrites_live_settings() {
        let temp = TempDir::new().expect("temp home");
        let _env = EnvGuard::set_home(temp.path());
        let state = AppState::try_new().expect("state");

        let provider = ProviderService::add(&state, claude_form("Foo")).expect("add");
        ProviderService::switch(&state, &provider.id).expect("switch");

        ProviderService::update(
            &state,
            &provider.id,
            ProviderPatch {
                base_url: Some("https://new.example".into()),
                ..Default::default()
            },
        )
        .expect("update");

        let settings: Value = read_json_file(&get_claude_settings_path()).expect("settings");
        assert_eq!(settings["env"]["ANTHROPIC_BASE_URL"], "https://new.example");
    }

    #[test]
    #[serial]
    fn updating_inactive_provider_leaves_live_settings_alone() {
        let temp = TempDir::new().expect("temp home");
        let _env = EnvGuard::set_home(temp.path());
        let state = AppState::try_new().expect("state");

        let provider = ProviderService::add(&state, claude_form("Foo")).expect("add");
        ProviderService::update(
            &state,
            &provider.id,
            ProviderPatch {
                name: Some("Renamed".into()),
                ..Default::default()
            },
        )
        .expect("update");

        assert!(!get_claude_settings_path().exists());
        assert_eq!(
            ProviderService::get(&state, &provider.id).expect("get").name,
            "Renamed"
        );
        assert!(ProviderService::update(&state, &provider.id, ProviderPatch::default()).is_err());
    }

    #[test]
    #[serial]
    fn refresh_without_active_provider_writes_general_config_only() {
        let temp = TempDir::new().expect("temp home");
        let _env = EnvGuard::set_home(temp.path());
        write_json_file(
            &crate::config::get_claude_general_config_path(),
            &serde_json::json!({
                "env": { "ANTHROPIC_BASE_URL": "https://sneaky", "DISABLE_TELEMETRY": "1" },
                "permissions": { "allow": ["Read"] }
            }),
        )
        .expect("seed general");
        let state = AppState::try_new().expect("state");

        let active = ProviderService::refresh_live(&state, AppType::Claude).expect("refresh");
        assert!(active.is_none());

        let settings: Value = read_json_file(&get_claude_settings_path()).expect("settings");
        assert_eq!(settings["env"]["DISABLE_TELEMETRY"], "1");
        assert!(settings["env"].get("ANTHROPIC_BASE_URL").is_none());
        assert_eq!(settings["permissions"]["allow"][0], "Read");
    }

    #[test]
    #[serial]
    fn dry_run_preview_does_not_touch_disk() {
        let temp = TempDir::new().expect("temp home");
        let _env = EnvGuard::set_home(temp.path());
        let state = AppState::try_new().expect("state");
        let provider = ProviderService::add(&state, claude_form("Foo")).expect("add");

        let preview = ProviderService::preview(&state, &provider.id).expect("preview");
        match preview {
            LivePreview::Claude(doc) => {
                assert_eq!(doc["env"]["ANTHROPIC_MODEL"], "m-default");
            }
            LivePreview::Codex(_) => panic!("expected claude preview"),
        }
        assert!(!get_claude_settings_path().exists());
        assert!(ProviderService::current(&state, AppType::Claude)
            .expect("current")
            .is_none());
    }

    #[test]
    #[serial]
    fn failed_live_write_keeps_store_unchanged() {
        let temp = TempDir::new().expect("temp home");
        let _env = EnvGuard::set_home(temp.path());
        let state = AppState::try_new().expect("state");
        let provider = ProviderService::add(&state, claude_form("Foo")).expect("add");

        // settings.json 的父路径是一个普通文件，写入必然失败
        std::fs::write(temp.path().join(".claude"), "not a dir").expect("block dir");

        assert!(ProviderService::switch(&state, &provider.id).is_err());
        assert!(ProviderService::current(&state, AppType::Claude)
            .expect("current")
            .is_none());
        let reloaded = AppState::try_new().expect("reload");
        assert!(ProviderService::current(&reloaded, AppType::Claude)
            .expect("current")
            .is_none());
    }

    fn codex_form(name: &str) -> ProviderForm {
        ProviderForm {
            name: name.into(),
            website: String::new(),
            base_url: "https://relay.example/v1".into(),
            api_key: "sk-codex-123456".into(),
            api_format: ApiFormat::OpenaiCompletions,
            models: ProviderModels::default(),
            extra_env: None,
            target: ProviderTarget::Codex(CodexOptions::default()),
        }
    }

    #[test]
    #[serial]
    fn codex_reset_with_unparseable_config_still_clears_pointer() {
        let temp = TempDir::new().expect("temp home");
        let _env = EnvGuard::set_home(temp.path());
        let state = AppState::try_new().expect("state");
        let provider = ProviderService::add(&state, codex_form("Relay")).expect("add");
        ProviderService::switch(&state, &provider.id).expect("switch");

        let broken = "this is = = not toml";
        write_text_file(&get_codex_config_path(), broken).expect("corrupt config");

        ProviderService::clear(&state, AppType::Codex).expect("clear");
        let reloaded = AppState::try_new().expect("reload");
        assert!(ProviderService::current(&reloaded, AppType::Codex)
            .expect("current")
            .is_none());
        let text = std::fs::read_to_string(get_codex_config_path()).expect("read config");
        assert_eq!(text, broken, "unparseable config is left as is");
    }

    #[test]
    #[serial]
    fn codex_switch_refuses_unparseable_config() {
        let temp = TempDir::new().expect("temp home");
        let _env = EnvGuard::set_home(temp.path());
        let broken = "this is = = not toml";
        write_text_file(&get_codex_config_path(), broken).expect("corrupt config");
        let state = AppState::try_new().expect("state");
        let provider = ProviderService::add(&state, codex_form("Relay")).expect("add");

        let err = ProviderService::switch(&state, &provider.id).expect_err("refuse");
        assert!(matches!(err, AppError::TomlEdit { .. }));
        assert!(ProviderService::current(&state, AppType::Codex)
            .expect("current")
            .is_none());
        let text = std::fs::read_to_string(get_codex_config_path()).expect("read config");
        assert_eq!(text, broken);
    }

    #[test]
    #[serial]
    fn add_without_api_key_is_rejected() {
        let temp = TempDir::new().expect("temp home");
        let _env = EnvGuard::set_home(temp.path());
        let state = AppState::try_new().expect("state");
        let form = ProviderForm {
            api_key: String::new(),
            ..claude_form("Keyless")
        };

        let err = ProviderService::add(&state, form).expect_err("keyless add");
        assert!(matches!(err, AppError::Validation(_)));
        assert!(ProviderService::list(&state, None).expect("list").is_empty());
        assert!(!crate::config::get_app_config_path().exists());
    }
}
