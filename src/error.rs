use std::path::Path;
use std::sync::PoisonError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("配置错误: {0}")]
    Config(String),
    #[error("无效输入: {0}")]
    Validation(String),
    #[error("未找到: {0}")]
    NotFound(String),
    #[error("IO 错误: {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    IoContext {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON 解析错误: {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("JSON 序列化失败: {source}")]
    JsonSerialize {
        #[source]
        source: serde_json::Error,
    },
    #[error("TOML 解析错误: {path}: {source}")]
    Toml {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("TOML 文档错误: {path}: {source}")]
    TomlEdit {
        path: String,
        #[source]
        source: toml_edit::TomlError,
    },
    #[error("锁获取失败: {0}")]
    Lock(String),
    #[error("{0}")]
    Message(String),
}

impl AppError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn json(path: impl AsRef<Path>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn toml(path: impl AsRef<Path>, source: toml::de::Error) -> Self {
        Self::Toml {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn toml_edit(path: impl AsRef<Path>, source: toml_edit::TomlError) -> Self {
        Self::TomlEdit {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn provider_not_found(id: &str) -> Self {
        Self::NotFound(format!("Provider '{id}' not found"))
    }
}

impl<T> From<PoisonError<T>> for AppError {
    fn from(err: PoisonError<T>) -> Self {
        Self::Lock(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_mentions_path() {
        let err = AppError::io(
            "/tmp/persona/config.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let text = err.to_string();
        assert!(text.contains("/tmp/persona/config.json"), "{text}");
        assert!(text.contains("denied"), "{text}");
    }

    #[test]
    fn poisoned_lock_maps_to_lock_error() {
        let lock = std::sync::RwLock::new(0);
        let _ = std::panic::catch_unwind(|| {
            let _guard = lock.write().expect("lock");
            panic!("poison");
        });
        let err: AppError = lock.read().map(|_| ()).unwrap_err().into();
        assert!(matches!(err, AppError::Lock(_)));
    }
}
