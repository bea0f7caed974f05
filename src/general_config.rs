use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::app_config::AppType;
use crate::config::{
    get_claude_general_config_path, get_codex_general_config_path, read_optional_json_file,
    read_text_file_or_default,
};
use crate::error::AppError;

/// 通用配置中的一项，加载时一次性解码
#[derive(Debug, Clone, PartialEq)]
pub enum GeneralEntry {
    /// 顶层标量，作为同名环境变量
    EnvFlat(String),
    /// `"env": { ... }` 子对象
    EnvNested(IndexMap<String, String>),
    /// 原样写入 settings 根级别的对象
    Passthrough(Value),
}

/// Claude 通用配置 (~/.persona/general/claude.json)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneralConfig {
    entries: IndexMap<String, GeneralEntry>,
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl GeneralConfig {
    pub fn load() -> Self {
        Self::load_from(&get_claude_general_config_path())
    }

    /// 文件缺失或解析失败时视为空配置
    pub fn load_from(path: &Path) -> Self {
        match read_optional_json_file::<Value>(path) {
            Some(Value::Object(map)) => Self::from_object(&map),
            Some(_) => {
                log::warn!("通用配置 {} 不是 JSON 对象，已忽略", path.display());
                Self::default()
            }
            None => Self::default(),
        }
    }

    pub fn from_object(map: &Map<String, Value>) -> Self {
        let mut entries = IndexMap::new();
        for (key, value) in map {
            let entry = match (key.as_str(), value) {
                ("env", Value::Object(env)) => {
                    let nested = env
                        .iter()
                        .filter_map(|(k, v)| match scalar_to_string(v) {
                            Some(s) => Some((k.clone(), s)),
                            None => {
                                log::debug!("忽略通用配置 env.{k}: 不是标量");
                                None
                            }
                        })
                        .collect();
                    GeneralEntry::EnvNested(nested)
                }
                (_, Value::Object(_)) => GeneralEntry::Passthrough(value.clone()),
                (_, Value::Array(_) | Value::Null) => {
                    log::debug!("忽略通用配置项 {key}: 数组或 null");
                    continue;
                }
                (_, scalar) => match scalar_to_string(scalar) {
                    Some(s) => GeneralEntry::EnvFlat(s),
                    None => continue,
                },
            };
            entries.insert(key.clone(), entry);
        }
        Self { entries }
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &GeneralEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Codex 通用配置 (~/.persona/general/codex.toml)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodexGeneralConfig {
    table: toml::Table,
}

/// 由 persona 自己管理、不允许通用配置覆盖的键
const CODEX_RESERVED_KEYS: [&str; 3] = ["model_provider", "model_providers", "disable_response_storage"];

impl CodexGeneralConfig {
    pub fn load() -> Self {
        Self::load_from(&get_codex_general_config_path())
    }

    pub fn load_from(path: &Path) -> Self {
        let text = match read_text_file_or_default(path) {
            Ok(text) => text,
            Err(err) => {
                log::warn!("读取 Codex 通用配置失败: {err}");
                return Self::default();
            }
        };
        match Self::parse(&text) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Codex 通用配置 {} 解析失败，已忽略: {err}", path.display());
                Self::default()
            }
        }
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let table: toml::Table = toml::from_str(text)?;
        Ok(Self { table })
    }

    pub fn disable_response_storage(&self) -> bool {
        self.table
            .get("disable_response_storage")
            .and_then(toml::Value::as_bool)
            .unwrap_or(true)
    }

    /// 需要复制进 `profiles.persona` 的其余键
    pub fn profile_extras(&self) -> impl Iterator<Item = (&str, &toml::Value)> {
        self.table
            .iter()
            .filter(|(k, _)| !CODEX_RESERVED_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.as_str(), v))
    }

    pub fn table(&self) -> &toml::Table {
        &self.table
    }
}

pub fn general_config_path(app_type: AppType) -> PathBuf {
    match app_type {
        AppType::Claude => get_claude_general_config_path(),
        AppType::Codex => get_codex_general_config_path(),
    }
}

/// 校验编辑后的通用配置文本
pub fn validate_general_text(app_type: AppType, path: &Path, text: &str) -> Result<(), AppError> {
    if text.trim().is_empty() {
        return Ok(());
    }
    match app_type {
        AppType::Claude => {
            let value: Value = serde_json::from_str(text).map_err(|e| AppError::json(path, e))?;
            if !value.is_object() {
                return Err(AppError::Validation(
                    "Claude general config must be a JSON object".into(),
                ));
            }
        }
        AppType::Codex => {
            CodexGeneralConfig::parse(text).map_err(|e| AppError::toml(path, e))?;
        }
    }
    Ok(())
}
