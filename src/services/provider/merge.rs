use indexmap::IndexMap;
use serde_json::Value;

use crate::general_config::{GeneralConfig, GeneralEntry};
use crate::provider::{Provider, ProviderTarget};

pub const ENV_BASE_URL: &str = "ANTHROPIC_BASE_URL";
pub const ENV_AUTH_TOKEN: &str = "ANTHROPIC_AUTH_TOKEN";
pub const ENV_MODEL: &str = "ANTHROPIC_MODEL";
pub const ENV_HAIKU_MODEL: &str = "ANTHROPIC_DEFAULT_HAIKU_MODEL";
pub const ENV_OPUS_MODEL: &str = "ANTHROPIC_DEFAULT_OPUS_MODEL";
pub const ENV_SONNET_MODEL: &str = "ANTHROPIC_DEFAULT_SONNET_MODEL";
pub const ENV_API_FORMAT: &str = "ANTHROPIC_API_FORMAT";

/// 由供应商写入、清除时需要移除的 Claude 环境变量
pub const CLAUDE_PROVIDER_ENV_KEYS: [&str; 7] = [
    ENV_BASE_URL,
    ENV_AUTH_TOKEN,
    ENV_MODEL,
    ENV_HAIKU_MODEL,
    ENV_OPUS_MODEL,
    ENV_SONNET_MODEL,
    ENV_API_FORMAT,
];

/// Codex 未配置模型时使用的模型
pub const CODEX_FALLBACK_MODEL: &str = "gpt-4o";

/// 合并结果：写入 settings 的 env 以及根级别透传项
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedSettings {
    pub env: IndexMap<String, String>,
    pub passthrough: IndexMap<String, Value>,
}

/// 仅由通用配置得到的合并结果（第一步）
pub fn general_only(general: &GeneralConfig) -> MergedSettings {
    let mut merged = MergedSettings::default();
    for (key, entry) in general.entries() {
        match entry {
            GeneralEntry::EnvNested(map) => {
                for (k, v) in map {
                    merged.env.insert(k.clone(), v.clone());
                }
            }
            GeneralEntry::EnvFlat(v) => {
                merged.env.insert(key.to_string(), v.clone());
            }
            GeneralEntry::Passthrough(v) => {
                merged.passthrough.insert(key.to_string(), v.clone());
            }
        }
    }
    merged
}

/// 计算某个供应商激活后应写入的配置
///
/// 优先级从低到高：通用配置 → 供应商固定字段 → `extraEnv`。
/// Codex 供应商只取通用配置部分，其余由 TOML 写入器处理。
pub fn merge(provider: &Provider, general: &GeneralConfig) -> MergedSettings {
    let mut merged = general_only(general);

    if let ProviderTarget::Claude = provider.target {
        let env = &mut merged.env;
        env.insert(ENV_BASE_URL.into(), provider.base_url.clone());
        env.insert(ENV_AUTH_TOKEN.into(), provider.api_key.clone());

        let roles = [
            (ENV_MODEL, provider.models.default_model()),
            (ENV_HAIKU_MODEL, provider.models.haiku()),
            (ENV_OPUS_MODEL, provider.models.opus()),
            (ENV_SONNET_MODEL, provider.models.sonnet()),
        ];
        for (key, model) in roles {
            if let Some(model) = model {
                env.insert(key.into(), model.to_string());
            }
        }
        env.insert(ENV_API_FORMAT.into(), provider.api_format.as_str().into());

        if let Some(extra) = &provider.extra_env {
            for (k, v) in extra {
                env.insert(k.clone(), v.clone());
            }
        }
    }

    merged
}

/// Codex 写入 `profiles.persona.model` 的模型名
pub fn resolve_codex_model(provider: &Provider) -> &str {
    provider.models.resolve_or(CODEX_FALLBACK_MODEL)
}

/// 移除供应商写入的键，保留通用配置或手工添加的键
pub fn strip_provider_keys(env: &mut serde_json::Map<String, Value>) -> usize {
    let before = env.len();
    for key in CLAUDE_PROVIDER_ENV_KEYS {
        env.remove(key);
    }
    before - env.len()
}

pub fn is_provider_key(key: &str) -> bool {
    CLAUDE_PROVIDER_ENV_KEYS.contains(&key)
}
