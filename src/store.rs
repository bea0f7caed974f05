use std::path::PathBuf;
use std::sync::RwLock;

use crate::app_config::PersonaConfig;
use crate::config::get_app_config_path;
use crate::error::AppError;

/// 全局应用状态：内存中的供应商存储 + 对应的配置文件路径
pub struct AppState {
    pub config: RwLock<PersonaConfig>,
    path: PathBuf,
}

impl AppState {
    /// 从默认路径加载
    pub fn try_new() -> Result<Self, AppError> {
        Self::open(get_app_config_path())
    }

    pub fn open(path: PathBuf) -> Result<Self, AppError> {
        let config = PersonaConfig::load_from(&path)?;
        Ok(Self {
            config: RwLock::new(config),
            path,
        })
    }

    /// 重新读取磁盘上的配置，覆盖内存状态
    pub fn reload(&self) -> Result<(), AppError> {
        let fresh = PersonaConfig::load_from(&self.path)?;
        let mut guard = self.config.write()?;
        *guard = fresh;
        Ok(())
    }

    /// 将内存状态完整写回磁盘
    pub fn save(&self) -> Result<(), AppError> {
        let config = self.config.read()?;
        config.save_to(&self.path)
    }

    pub fn snapshot(&self) -> Result<PersonaConfig, AppError> {
        Ok(self.config.read()?.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn reload_picks_up_external_edits() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("config.json");
        let state = AppState::open(path.clone()).expect("open empty store");
        assert!(state.snapshot().expect("snapshot").providers.is_empty());

        {
            let mut guard = state.config.write().expect("write lock");
            guard.theme = Some("ocean".into());
        }
        state.save().expect("save");

        let other = AppState::open(path).expect("second handle");
        {
            let mut guard = other.config.write().expect("write lock");
            guard.theme = Some("forest".into());
        }
        other.save().expect("save other");

        state.reload().expect("reload");
        assert_eq!(state.snapshot().expect("snapshot").theme(), "forest");
    }

    #[test]
    fn corrupt_store_is_an_error() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, "[1, 2").expect("seed garbage");
        assert!(AppState::open(path).is_err());
    }
}
