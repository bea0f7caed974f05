#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock};

use tempfile::TempDir;

static TEST_HOME: OnceLock<TempDir> = OnceLock::new();
static TEST_MUTEX: OnceLock<Mutex<()>> = OnceLock::new();

/// 串行化访问 HOME 等全局状态的测试
pub fn lock_test_mutex() -> MutexGuard<'static, ()> {
    TEST_MUTEX
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 把 HOME 指向进程内共享的临时目录，并清除 Claude / Codex 目录覆盖
pub fn ensure_test_home() -> PathBuf {
    let home = TEST_HOME
        .get_or_init(|| {
            tempfile::Builder::new()
                .prefix("persona-test-home-")
                .tempdir()
                .expect("create test home")
        })
        .path()
        .to_path_buf();
    std::env::set_var("HOME", &home);
    #[cfg(windows)]
    std::env::set_var("USERPROFILE", &home);
    std::env::remove_var("CLAUDE_CONFIG_DIR");
    std::env::remove_var("CODEX_HOME");
    home
}

/// 清空测试 HOME 下由本工具读写的目录
pub fn reset_test_fs() {
    let home = ensure_test_home();
    for dir in [".persona", ".claude", ".codex"] {
        let path = home.join(dir);
        if path.exists() {
            std::fs::remove_dir_all(&path).expect("reset test dir");
        }
    }
}

pub fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dir");
    }
    std::fs::write(path, content).expect("write fixture");
}

pub fn read_file(path: &Path) -> String {
    std::fs::read_to_string(path).expect("read file")
}
