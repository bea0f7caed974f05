use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use toml_edit::{value, DocumentMut, Item, Table};

use crate::app_config::AppType;
use crate::config::{
    delete_file, get_claude_settings_path, get_codex_auth_path, get_codex_config_path,
    read_optional_json_file, write_json_file, write_text_file,
};
use crate::error::AppError;
use crate::general_config::{CodexGeneralConfig, GeneralConfig};
use crate::provider::Provider;

use super::merge::{self, MergedSettings};

/// Codex 中 persona 使用的 profile 名
pub const CODEX_PROFILE_NAME: &str = "persona";

/// 写入前的 live 文件原始内容，用于失败回滚
#[derive(Debug, Clone)]
pub(crate) enum LiveSnapshot {
    Claude {
        settings: Option<String>,
    },
    Codex {
        auth: Option<String>,
        config: Option<String>,
    },
}

fn read_optional_text(path: &Path) -> Result<Option<String>, AppError> {
    if !path.exists() {
        return Ok(None);
    }
    fs::read_to_string(path)
        .map(Some)
        .map_err(|e| AppError::io(path, e))
}

fn restore_text(path: &Path, content: &Option<String>) -> Result<(), AppError> {
    match content {
        Some(text) => write_text_file(path, text),
        None => delete_file(path),
    }
}

impl LiveSnapshot {
    pub(crate) fn capture(app_type: AppType) -> Result<Self, AppError> {
        match app_type {
            AppType::Claude => Ok(LiveSnapshot::Claude {
                settings: read_optional_text(&get_claude_settings_path())?,
            }),
            AppType::Codex => Ok(LiveSnapshot::Codex {
                auth: read_optional_text(&get_codex_auth_path())?,
                config: read_optional_text(&get_codex_config_path())?,
            }),
        }
    }

    pub(crate) fn restore(&self) -> Result<(), AppError> {
        match self {
            LiveSnapshot::Claude { settings } => {
                restore_text(&get_claude_settings_path(), settings)?;
            }
            LiveSnapshot::Codex { auth, config } => {
                restore_text(&get_codex_auth_path(), auth)?;
                restore_text(&get_codex_config_path(), config)?;
            }
        }
        Ok(())
    }

    /// 回滚失败只记录日志，原始错误继续向上返回
    pub(crate) fn restore_best_effort(&self) {
        if let Err(err) = self.restore() {
            log::error!("回滚 live 配置失败: {err}");
        }
    }
}

// ---------------------------------------------------------------------------
// Claude
// ---------------------------------------------------------------------------

/// 读取 Claude settings.json；缺失或无法解析时使用 `{"env":{}}`
pub fn read_claude_settings() -> Map<String, Value> {
    let path = get_claude_settings_path();
    let mut doc = match read_optional_json_file::<Value>(&path) {
        Some(Value::Object(map)) => map,
        Some(_) => {
            log::warn!("{} 不是 JSON 对象，按空配置处理", path.display());
            Map::new()
        }
        None => Map::new(),
    };
    if !doc.get("env").is_some_and(Value::is_object) {
        doc.insert("env".into(), Value::Object(Map::new()));
    }
    doc
}

fn compose_claude_document(merged: &MergedSettings) -> Value {
    let mut doc = read_claude_settings();
    let env: Map<String, Value> = merged
        .env
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    doc.insert("env".into(), Value::Object(env));
    for (key, val) in &merged.passthrough {
        if key == "env" {
            continue;
        }
        doc.insert(key.clone(), val.clone());
    }
    Value::Object(doc)
}

fn write_claude_document(doc: &Value, commit: bool) -> Result<(), AppError> {
    if commit {
        let path = get_claude_settings_path();
        write_json_file(&path, doc)?;
        log::info!("已写入 {}", path.display());
    }
    Ok(())
}

/// 计算并（在 `commit` 时）写入供应商对应的 Claude settings，返回计算出的文档
pub fn apply_claude(
    provider: &Provider,
    general: &GeneralConfig,
    commit: bool,
) -> Result<Value, AppError> {
    let merged = merge::merge(provider, general);
    let doc = compose_claude_document(&merged);
    write_claude_document(&doc, commit)?;
    Ok(doc)
}

/// 仅应用通用配置（不含任何供应商字段）
pub fn apply_claude_general(general: &GeneralConfig, commit: bool) -> Result<Value, AppError> {
    let mut merged = merge::general_only(general);
    merged.env.retain(|k, _| !merge::is_provider_key(k));
    let doc = compose_claude_document(&merged);
    write_claude_document(&doc, commit)?;
    Ok(doc)
}

/// 从 settings.json 的 env 中移除供应商写入的键；返回移除的数量
pub fn clear_claude() -> Result<usize, AppError> {
    let path = get_claude_settings_path();
    if !path.exists() {
        return Ok(0);
    }
    let mut doc = read_claude_settings();
    let removed = match doc.get_mut("env") {
        Some(Value::Object(env)) => merge::strip_provider_keys(env),
        _ => 0,
    };
    if removed > 0 {
        write_json_file(&path, &Value::Object(doc))?;
        log::info!("已从 {} 移除 {removed} 个供应商环境变量", path.display());
    }
    Ok(removed)
}

/// 当前 Claude settings 中的 env（非字符串值会被转为字符串）
pub fn read_live_env() -> IndexMap<String, String> {
    let doc = read_claude_settings();
    let Some(Value::Object(env)) = doc.get("env") else {
        return IndexMap::new();
    };
    env.iter()
        .filter_map(|(k, v)| {
            let text = match v {
                Value::String(s) => s.clone(),
                Value::Null | Value::Array(_) | Value::Object(_) => return None,
                other => other.to_string(),
            };
            Some((k.clone(), text))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Codex
// ---------------------------------------------------------------------------

/// Codex 写入结果（`use --dry-run` 时只计算不落盘）
#[derive(Debug, Clone, PartialEq)]
pub struct CodexPreview {
    pub config_text: String,
    pub auth: Map<String, Value>,
    pub auth_key: String,
}

/// 当前 Codex 配置中 persona profile 的状态
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveCodexStatus {
    pub model_provider: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub auth: IndexMap<String, String>,
}

fn read_codex_document() -> Result<DocumentMut, AppError> {
    let path = get_codex_config_path();
    let text = read_optional_text(&path)?.unwrap_or_default();
    if text.trim().is_empty() {
        return Ok(DocumentMut::new());
    }
    text.parse::<DocumentMut>()
        .map_err(|e| AppError::toml_edit(&path, e))
}

fn read_codex_auth() -> Map<String, Value> {
    let path = get_codex_auth_path();
    match read_optional_json_file::<Value>(&path) {
        Some(Value::Object(map)) => map,
        Some(_) => {
            log::warn!("{} 不是 JSON 对象，按空配置处理", path.display());
            Map::new()
        }
        None => Map::new(),
    }
}

fn implicit_table() -> Table {
    let mut table = Table::new();
    table.set_implicit(true);
    table
}

/// 取得（必要时创建）`parent[key]` 子表；行内表会被展开为普通表
fn child_table<'a>(parent: &'a mut Table, key: &str) -> Result<&'a mut Table, AppError> {
    let item = parent.entry(key).or_insert(Item::None);
    if let Item::Value(toml_edit::Value::InlineTable(inline)) = item {
        let table = inline.clone().into_table();
        *item = Item::Table(table);
    }
    if !item.is_table() {
        *item = Item::Table(implicit_table());
    }
    match item {
        Item::Table(table) => Ok(table),
        _ => Err(AppError::Config(format!("config.toml 中的 {key} 不是表"))),
    }
}

fn toml_to_edit_value(val: &toml::Value) -> toml_edit::Value {
    use toml_edit::Value as EditValue;
    match val {
        toml::Value::String(s) => EditValue::from(s.as_str()),
        toml::Value::Integer(i) => EditValue::from(*i),
        toml::Value::Float(f) => EditValue::from(*f),
        toml::Value::Boolean(b) => EditValue::from(*b),
        toml::Value::Datetime(dt) => {
            let text = dt.to_string();
            text.parse::<EditValue>()
                .unwrap_or_else(|_| EditValue::from(text.as_str()))
        }
        toml::Value::Array(items) => {
            let mut array = toml_edit::Array::new();
            for item in items {
                array.push(toml_to_edit_value(item));
            }
            EditValue::Array(array)
        }
        toml::Value::Table(table) => {
            let mut inline = toml_edit::InlineTable::new();
            for (k, v) in table {
                inline.insert(k.as_str(), toml_to_edit_value(v));
            }
            EditValue::InlineTable(inline)
        }
    }
}

fn provider_entry(provider: &Provider) -> Table {
    let opts = provider.codex_options().cloned().unwrap_or_default();
    let mut entry = Table::new();
    entry["name"] = value(provider.name.as_str());
    entry["wire_api"] = value(opts.wire_api());
    entry["base_url"] = value(provider.base_url.as_str());
    match opts.env_key() {
        Some(env_key) => {
            entry["env_key"] = value(env_key);
            entry["requires_openai_auth"] = value(false);
        }
        None => {
            entry["requires_openai_auth"] = value(opts.requires_openai_auth.unwrap_or(true));
        }
    }
    entry
}

fn persona_profile(provider: &Provider, general: &CodexGeneralConfig) -> Table {
    let mut profile = Table::new();
    profile["model_provider"] = value(provider.name.as_str());
    profile["model"] = value(merge::resolve_codex_model(provider));
    profile["disable_response_storage"] = value(general.disable_response_storage());
    // 通用配置中的键（包括 model）覆盖供应商推导出的值
    for (key, val) in general.profile_extras() {
        profile[key] = Item::Value(toml_to_edit_value(val));
    }
    profile
}

fn compose_codex(
    provider: &Provider,
    general: &CodexGeneralConfig,
) -> Result<CodexPreview, AppError> {
    if provider.codex_options().is_none() {
        return Err(AppError::Validation(format!(
            "Provider '{}' is not a codex provider",
            provider.name
        )));
    }
    if provider.api_key.trim().is_empty() {
        return Err(AppError::Validation(format!(
            "Provider '{}' has no API key; codex requires one",
            provider.name
        )));
    }

    let mut doc = read_codex_document()?;
    let root = doc.as_table_mut();
    child_table(root, "model_providers")?
        .insert(&provider.name, Item::Table(provider_entry(provider)));
    child_table(root, "profiles")?
        .insert(CODEX_PROFILE_NAME, Item::Table(persona_profile(provider, general)));

    let auth_key = provider
        .codex_options()
        .map(|opts| opts.auth_key_name().to_string())
        .unwrap_or_else(|| "OPENAI_API_KEY".to_string());
    let mut auth = read_codex_auth();
    auth.insert(auth_key.clone(), Value::String(provider.api_key.clone()));

    Ok(CodexPreview {
        config_text: doc.to_string(),
        auth,
        auth_key,
    })
}

/// 写入 Codex 的 config.toml 与 auth.json
///
/// 两个文件分别原子替换；auth.json 写入失败时把 config.toml 恢复为写入前的内容。
pub fn apply_codex(
    provider: &Provider,
    general: &CodexGeneralConfig,
    commit: bool,
) -> Result<CodexPreview, AppError> {
    let preview = compose_codex(provider, general)?;
    if !commit {
        return Ok(preview);
    }

    let snapshot = LiveSnapshot::capture(AppType::Codex)?;
    write_text_file(&get_codex_config_path(), &preview.config_text)?;
    if let Err(err) = write_json_file(&get_codex_auth_path(), &Value::Object(preview.auth.clone())) {
        snapshot.restore_best_effort();
        return Err(err);
    }
    log::info!(
        "已写入 Codex 配置: provider={}, auth 键={}",
        provider.name,
        preview.auth_key
    );
    Ok(preview)
}

fn profile_references(item: &Item, provider_name: &str) -> bool {
    item.as_table_like()
        .and_then(|t| t.get("model_provider"))
        .and_then(Item::as_str)
        == Some(provider_name)
}

/// 移除 `profiles.persona`，以及不再被任何 profile 引用的供应商表
///
/// auth.json 保持不变。返回是否有内容被移除。
pub fn clear_codex() -> Result<bool, AppError> {
    let path = get_codex_config_path();
    if !path.exists() {
        return Ok(false);
    }
    let mut doc = match read_codex_document() {
        Ok(doc) => doc,
        Err(err) => {
            log::warn!("{} 无法解析，跳过清理: {err}", path.display());
            return Ok(false);
        }
    };
    let root = doc.as_table_mut();

    let removed_profile = root
        .get_mut("profiles")
        .and_then(Item::as_table_like_mut)
        .and_then(|profiles| profiles.remove(CODEX_PROFILE_NAME));
    let Some(removed_profile) = removed_profile else {
        return Ok(false);
    };

    let provider_name = removed_profile
        .as_table_like()
        .and_then(|t| t.get("model_provider"))
        .and_then(Item::as_str)
        .map(str::to_string);

    if let Some(name) = provider_name {
        let still_referenced = root
            .get("profiles")
            .and_then(Item::as_table_like)
            .is_some_and(|profiles| profiles.iter().any(|(_, p)| profile_references(p, &name)))
            || root.get("model_provider").and_then(Item::as_str) == Some(name.as_str());
        if !still_referenced {
            if let Some(providers) = root
                .get_mut("model_providers")
                .and_then(Item::as_table_like_mut)
            {
                providers.remove(&name);
            }
        }
    }

    for key in ["profiles", "model_providers"] {
        let empty = root
            .get(key)
            .and_then(Item::as_table_like)
            .is_some_and(|t| t.is_empty());
        if empty {
            root.remove(key);
        }
    }

    write_text_file(&path, &doc.to_string())?;
    log::info!("已从 {} 移除 persona profile", path.display());
    Ok(true)
}

/// 读取 Codex 当前的 persona profile 与 auth.json 中的键
pub fn read_live_codex() -> Result<LiveCodexStatus, AppError> {
    let doc = read_codex_document()?;
    let mut status = LiveCodexStatus::default();

    let profile = doc
        .get("profiles")
        .and_then(Item::as_table_like)
        .and_then(|p| p.get(CODEX_PROFILE_NAME))
        .and_then(Item::as_table_like);
    if let Some(profile) = profile {
        status.model_provider = profile
            .get("model_provider")
            .and_then(Item::as_str)
            .map(str::to_string);
        status.model = profile.get("model").and_then(Item::as_str).map(str::to_string);
    }
    if let Some(name) = &status.model_provider {
        status.base_url = doc
            .get("model_providers")
            .and_then(Item::as_table_like)
            .and_then(|p| p.get(name))
            .and_then(Item::as_table_like)
            .and_then(|t| t.get("base_url"))
            .and_then(Item::as_str)
            .map(str::to_string);
    }

    status.auth = read_codex_auth()
        .into_iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
        .collect();
    Ok(status)
}
