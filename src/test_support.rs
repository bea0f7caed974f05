use std::ffi::OsString;
use std::path::Path;

const HOME_VARS: [&str; 4] = ["HOME", "USERPROFILE", "CLAUDE_CONFIG_DIR", "CODEX_HOME"];

/// 把 HOME 指向临时目录并清除 Claude / Codex 目录覆盖，drop 时恢复原值
pub(crate) struct EnvGuard {
    old: Vec<(&'static str, Option<OsString>)>,
}

impl EnvGuard {
    pub(crate) fn set_home(home: &Path) -> Self {
        let old = HOME_VARS
            .iter()
            .map(|k| (*k, std::env::var_os(k)))
            .collect();
        std::env::set_var("HOME", home);
        std::env::set_var("USERPROFILE", home);
        std::env::remove_var("CLAUDE_CONFIG_DIR");
        std::env::remove_var("CODEX_HOME");
        Self { old }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.old {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }
}
