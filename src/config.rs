use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::AppError;

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("/root"))
}

fn env_dir_override(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .map(PathBuf::from)
        .filter(|p| !p.as_os_str().is_empty())
}

/// Persona 自身的配置目录 (~/.persona)
pub fn get_app_config_dir() -> PathBuf {
    home_dir().join(".persona")
}

/// 供应商存储文件 (~/.persona/config.json)
pub fn get_app_config_path() -> PathBuf {
    get_app_config_dir().join("config.json")
}

pub fn get_general_config_dir() -> PathBuf {
    get_app_config_dir().join("general")
}

/// Claude 通用配置 (JSON)
pub fn get_claude_general_config_path() -> PathBuf {
    get_general_config_dir().join("claude.json")
}

/// Codex 通用配置 (TOML)
pub fn get_codex_general_config_path() -> PathBuf {
    get_general_config_dir().join("codex.toml")
}

/// Claude Code 配置目录，遵循 `CLAUDE_CONFIG_DIR`
pub fn get_claude_config_dir() -> PathBuf {
    env_dir_override("CLAUDE_CONFIG_DIR").unwrap_or_else(|| home_dir().join(".claude"))
}

pub fn get_claude_settings_path() -> PathBuf {
    get_claude_config_dir().join("settings.json")
}

/// Codex 配置目录，遵循 `CODEX_HOME`
pub fn get_codex_config_dir() -> PathBuf {
    env_dir_override("CODEX_HOME").unwrap_or_else(|| home_dir().join(".codex"))
}

pub fn get_codex_config_path() -> PathBuf {
    get_codex_config_dir().join("config.toml")
}

pub fn get_codex_auth_path() -> PathBuf {
    get_codex_config_dir().join("auth.json")
}

/// 读取 JSON 文件
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let content = fs::read_to_string(path).map_err(|e| AppError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| AppError::json(path, e))
}

/// 读取可选 JSON 文件：不存在或解析失败时返回 `None`
pub fn read_optional_json_file<T: DeserializeOwned>(path: &Path) -> Option<T> {
    if !path.exists() {
        return None;
    }
    match read_json_file(path) {
        Ok(value) => Some(value),
        Err(err) => {
            log::warn!("读取 {} 失败，按空配置处理: {err}", path.display());
            None
        }
    }
}

/// 读取可选文本文件，不存在时返回空字符串
pub fn read_text_file_or_default(path: &Path) -> Result<String, AppError> {
    if !path.exists() {
        return Ok(String::new());
    }
    fs::read_to_string(path).map_err(|e| AppError::io(path, e))
}

/// 写入 JSON 文件（美化格式，原子替换）
pub fn write_json_file<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<(), AppError> {
    let json =
        serde_json::to_string_pretty(data).map_err(|e| AppError::JsonSerialize { source: e })?;
    atomic_write(path, json.as_bytes())
}

pub fn write_text_file(path: &Path, data: &str) -> Result<(), AppError> {
    atomic_write(path, data.as_bytes())
}

/// 先写入同目录临时文件，再 rename 覆盖目标文件
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), AppError> {
    let parent = path
        .parent()
        .ok_or_else(|| AppError::Config(format!("无效的路径: {}", path.display())))?;
    fs::create_dir_all(parent).map_err(|e| AppError::io(parent, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| AppError::IoContext {
        context: format!("创建临时文件失败: {}", parent.display()),
        source: e,
    })?;
    tmp.write_all(data).map_err(|e| AppError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| AppError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| AppError::io(path, e.error))?;
    Ok(())
}

pub fn delete_file(path: &Path) -> Result<(), AppError> {
    if path.exists() {
        fs::remove_file(path).map_err(|e| AppError::io(path, e))?;
    }
    Ok(())
}
