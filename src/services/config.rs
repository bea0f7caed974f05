use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::app_config::AppType;
use crate::config::{read_text_file_or_default, write_text_file};
use crate::error::AppError;
use crate::general_config::{general_config_path, validate_general_text, CodexGeneralConfig};
use crate::provider::display_env_value;

const DEFAULT_CLAUDE_GENERAL: &str = "{\n  \"env\": {}\n}\n";
const DEFAULT_CODEX_GENERAL: &str = "# Common Codex settings copied into profiles.persona\n";

/// 通用配置展示用的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneralConfigLine {
    /// 所属分组（嵌套对象的键名），顶层项为 `None`
    pub section: Option<String>,
    pub key: String,
    /// 已脱敏的值
    pub value: String,
}

/// 通用配置（env 覆盖项）相关业务逻辑
pub struct ConfigService;

impl ConfigService {
    pub fn path(app_type: AppType) -> PathBuf {
        general_config_path(app_type)
    }

    /// 读取通用配置并转换为已脱敏的展示行
    pub fn show(app_type: AppType) -> Result<Vec<GeneralConfigLine>, AppError> {
        let path = Self::path(app_type);
        let text = read_text_file_or_default(&path)?;
        match app_type {
            AppType::Claude => Ok(Self::claude_lines(&path, &text)),
            AppType::Codex => Ok(Self::codex_lines(&path, &text)),
        }
    }

    fn claude_lines(path: &Path, text: &str) -> Vec<GeneralConfigLine> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let root = match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                log::warn!("{} 不是 JSON 对象", path.display());
                return Vec::new();
            }
            Err(err) => {
                log::warn!("{} 解析失败: {err}", path.display());
                return Vec::new();
            }
        };

        let mut lines = Vec::new();
        for (key, value) in &root {
            match value {
                Value::Object(nested) => {
                    for (sub_key, sub_value) in nested {
                        if let Some(text) = scalar_text(sub_value) {
                            lines.push(GeneralConfigLine {
                                section: Some(key.clone()),
                                key: sub_key.clone(),
                                value: display_env_value(sub_key, &text),
                            });
                        }
                    }
                }
                other => {
                    if let Some(text) = scalar_text(other) {
                        lines.push(GeneralConfigLine {
                            section: None,
                            key: key.clone(),
                            value: display_env_value(key, &text),
                        });
                    }
                }
            }
        }
        lines
    }

    fn codex_lines(path: &Path, text: &str) -> Vec<GeneralConfigLine> {
        let config = match CodexGeneralConfig::parse(text) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("{} 解析失败: {err}", path.display());
                return Vec::new();
            }
        };
        config
            .table()
            .iter()
            .map(|(key, value)| {
                let text = match value {
                    toml::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                GeneralConfigLine {
                    section: None,
                    key: key.clone(),
                    value: display_env_value(key, &text),
                }
            })
            .collect()
    }

    /// 校验后原子写入通用配置
    pub fn save_text(app_type: AppType, text: &str) -> Result<(), AppError> {
        let path = Self::path(app_type);
        validate_general_text(app_type, &path, text)?;
        write_text_file(&path, text)
    }

    /// 确保文件存在（不存在时写入模板），返回路径
    pub fn ensure_file(app_type: AppType) -> Result<PathBuf, AppError> {
        let path = Self::path(app_type);
        if !path.exists() {
            let template = match app_type {
                AppType::Claude => DEFAULT_CLAUDE_GENERAL,
                AppType::Codex => DEFAULT_CODEX_GENERAL,
            };
            write_text_file(&path, template)?;
        }
        Ok(path)
    }

    /// 调用外部编辑器修改通用配置；编辑结果无效时恢复原内容并返回错误
    pub fn edit_with<F>(app_type: AppType, editor: F) -> Result<PathBuf, AppError>
    where
        F: FnOnce(&Path) -> Result<(), AppError>,
    {
        let path = Self::ensure_file(app_type)?;
        let before = read_text_file_or_default(&path)?;

        editor(&path)?;

        let after = read_text_file_or_default(&path)?;
        if let Err(err) = validate_general_text(app_type, &path, &after) {
            write_text_file(&path, &before)?;
            return Err(err);
        }
        Ok(path)
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::EnvGuard;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn show_masks_secret_like_keys() {
        let temp = TempDir::new().expect("temp home");
        let _home = EnvGuard::set_home(temp.path());
        ConfigService::save_text(
            AppType::Claude,
            r#"{ "env": { "MY_API_KEY": "abcdefghijkl", "REGION": "eu" }, "SECRET_TOKEN": "short" }"#,
        )
        .expect("save");

        let lines = ConfigService::show(AppType::Claude).expect("show");
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].value, "abcd****ijkl");
        assert_eq!(lines[1].value, "eu");
        assert_eq!(lines[2].value, "********");
    }

    #[test]
    #[serial]
    fn invalid_edit_restores_previous_content() {
        let temp = TempDir::new().expect("temp home");
        let _home = EnvGuard::set_home(temp.path());
        ConfigService::save_text(AppType::Codex, "approval_policy = \"never\"\n").expect("save");

        let err = ConfigService::edit_with(AppType::Codex, |path| {
            std::fs::write(path, "approval_policy = ").map_err(|e| AppError::io(path, e))
        })
        .expect_err("invalid toml");
        assert!(matches!(err, AppError::Toml { .. }));

        let text = std::fs::read_to_string(ConfigService::path(AppType::Codex)).expect("read");
        assert_eq!(text, "approval_policy = \"never\"\n");
    }

    #[test]
    #[serial]
    fn save_rejects_invalid_json() {
        let temp = TempDir::new().expect("temp home");
        let _home = EnvGuard::set_home(temp.path());
        assert!(ConfigService::save_text(AppType::Claude, "{").is_err());
        assert!(!ConfigService::path(AppType::Claude).exists());
    }
}
