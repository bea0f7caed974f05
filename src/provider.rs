use clap::ValueEnum;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::app_config::AppType;

/// 供应商请求/响应格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ApiFormat {
    /// Anthropic Messages API
    #[default]
    AnthropicMessages,
    /// OpenAI Chat Completions API
    OpenaiCompletions,
}

impl ApiFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiFormat::AnthropicMessages => "anthropic-messages",
            ApiFormat::OpenaiCompletions => "openai-completions",
        }
    }

    /// 连通性测试在未配置模型时使用的兜底模型
    pub fn probe_fallback_model(&self) -> &'static str {
        match self {
            ApiFormat::AnthropicMessages => "claude-3-haiku-20240307",
            ApiFormat::OpenaiCompletions => "gpt-4o-mini",
        }
    }
}

impl std::fmt::Display for ApiFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 逻辑模型角色 -> 模型名
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderModels {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub haiku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opus: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sonnet: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl ProviderModels {
    pub fn default_model(&self) -> Option<&str> {
        non_empty(&self.default)
    }

    pub fn haiku(&self) -> Option<&str> {
        non_empty(&self.haiku)
    }

    pub fn opus(&self) -> Option<&str> {
        non_empty(&self.opus)
    }

    pub fn sonnet(&self) -> Option<&str> {
        non_empty(&self.sonnet)
    }

    /// default → haiku → fallback
    pub fn resolve_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.default_model().or_else(|| self.haiku()).unwrap_or(fallback)
    }
}

/// Codex 专属字段
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodexOptions {
    /// "responses" / "chat" 等，缺省为 "responses"
    pub wire_api: Option<String>,
    pub requires_openai_auth: Option<bool>,
    /// auth.json 中使用的键名，缺省为 OPENAI_API_KEY
    pub env_key: Option<String>,
}

impl CodexOptions {
    pub fn wire_api(&self) -> &str {
        non_empty(&self.wire_api).unwrap_or("responses")
    }

    pub fn env_key(&self) -> Option<&str> {
        non_empty(&self.env_key)
    }

    pub fn auth_key_name(&self) -> &str {
        self.env_key().unwrap_or("OPENAI_API_KEY")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderTarget {
    Claude,
    Codex(CodexOptions),
}

impl ProviderTarget {
    pub fn for_app(app_type: AppType) -> Self {
        match app_type {
            AppType::Claude => ProviderTarget::Claude,
            AppType::Codex => ProviderTarget::Codex(CodexOptions::default()),
        }
    }

    pub fn app_type(&self) -> AppType {
        match self {
            ProviderTarget::Claude => AppType::Claude,
            ProviderTarget::Codex(_) => AppType::Codex,
        }
    }
}

/// 供应商记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ProviderRecord", into = "ProviderRecord")]
pub struct Provider {
    pub id: String,
    pub name: String,
    pub website: String,
    pub base_url: String,
    pub api_key: String,
    pub api_format: ApiFormat,
    pub models: ProviderModels,
    pub extra_env: Option<IndexMap<String, String>>,
    pub created_at: Option<i64>,
    pub target: ProviderTarget,
}

impl Provider {
    pub fn app_type(&self) -> AppType {
        self.target.app_type()
    }

    pub fn codex_options(&self) -> Option<&CodexOptions> {
        match &self.target {
            ProviderTarget::Codex(opts) => Some(opts),
            ProviderTarget::Claude => None,
        }
    }
}

/// 磁盘上的扁平 JSON 形态（camelCase，target 缺省视为 claude）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderRecord {
    id: String,
    name: String,
    #[serde(default)]
    website: String,
    #[serde(default)]
    api_key: String,
    #[serde(default)]
    base_url: String,
    #[serde(default)]
    api_format: ApiFormat,
    #[serde(default)]
    models: ProviderModels,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<AppType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    extra_env: Option<IndexMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    wire_api: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    requires_open_ai_auth: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    env_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<i64>,
}

impl From<ProviderRecord> for Provider {
    fn from(raw: ProviderRecord) -> Self {
        let target = match raw.target.unwrap_or_default() {
            AppType::Claude => {
                if raw.wire_api.is_some() || raw.requires_open_ai_auth.is_some() || raw.env_key.is_some() {
                    log::debug!("忽略 Claude 供应商 {} 上的 Codex 专属字段", raw.id);
                }
                ProviderTarget::Claude
            }
            AppType::Codex => ProviderTarget::Codex(CodexOptions {
                wire_api: raw.wire_api,
                requires_openai_auth: raw.requires_open_ai_auth,
                env_key: raw.env_key,
            }),
        };

        Provider {
            id: raw.id,
            name: raw.name,
            website: raw.website,
            base_url: raw.base_url,
            api_key: raw.api_key,
            api_format: raw.api_format,
            models: raw.models,
            extra_env: raw.extra_env,
            created_at: raw.created_at,
            target,
        }
    }
}

impl From<Provider> for ProviderRecord {
    fn from(provider: Provider) -> Self {
        let (target, codex) = match provider.target {
            ProviderTarget::Claude => (AppType::Claude, CodexOptions::default()),
            ProviderTarget::Codex(opts) => (AppType::Codex, opts),
        };

        ProviderRecord {
            id: provider.id,
            name: provider.name,
            website: provider.website,
            api_key: provider.api_key,
            base_url: provider.base_url,
            api_format: provider.api_format,
            models: provider.models,
            target: Some(target),
            extra_env: provider.extra_env,
            wire_api: codex.wire_api,
            requires_open_ai_auth: codex.requires_openai_auth,
            env_key: codex.env_key,
            created_at: provider.created_at,
        }
    }
}

/// 新建供应商所需的全部字段（即不含 id 的记录）
#[derive(Debug, Clone)]
pub struct ProviderForm {
    pub name: String,
    pub website: String,
    pub base_url: String,
    pub api_key: String,
    pub api_format: ApiFormat,
    pub models: ProviderModels,
    pub extra_env: Option<IndexMap<String, String>>,
    pub target: ProviderTarget,
}

impl ProviderForm {
    pub fn into_provider(self) -> Provider {
        let id = generate_provider_id(self.target.app_type(), &self.name);
        let website = if self.website.trim().is_empty() {
            "https://example.com".to_string()
        } else {
            self.website
        };
        Provider {
            id,
            name: self.name,
            website,
            base_url: self.base_url,
            api_key: self.api_key,
            api_format: self.api_format,
            models: self.models,
            extra_env: self.extra_env,
            created_at: Some(chrono::Utc::now().timestamp_millis()),
            target: self.target,
        }
    }
}

/// 部分更新：只覆盖给出的字段；models 整体替换
#[derive(Debug, Clone, Default)]
pub struct ProviderPatch {
    pub name: Option<String>,
    pub website: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub api_format: Option<ApiFormat>,
    pub models: Option<ProviderModels>,
    pub extra_env: Option<IndexMap<String, String>>,
    pub wire_api: Option<String>,
    pub requires_openai_auth: Option<bool>,
    pub env_key: Option<String>,
}

impl ProviderPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.website.is_none()
            && self.base_url.is_none()
            && self.api_key.is_none()
            && self.api_format.is_none()
            && self.models.is_none()
            && self.extra_env.is_none()
            && self.wire_api.is_none()
            && self.requires_openai_auth.is_none()
            && self.env_key.is_none()
    }

    pub fn apply(self, provider: &mut Provider) {
        if let Some(name) = self.name {
            provider.name = name;
        }
        if let Some(website) = self.website {
            provider.website = website;
        }
        if let Some(base_url) = self.base_url {
            provider.base_url = base_url;
        }
        if let Some(api_key) = self.api_key {
            provider.api_key = api_key;
        }
        if let Some(api_format) = self.api_format {
            provider.api_format = api_format;
        }
        if let Some(models) = self.models {
            provider.models = models;
        }
        if let Some(extra_env) = self.extra_env {
            provider.extra_env = Some(extra_env);
        }

        match &mut provider.target {
            ProviderTarget::Codex(opts) => {
                if let Some(wire_api) = self.wire_api {
                    opts.wire_api = Some(wire_api);
                }
                if let Some(requires) = self.requires_openai_auth {
                    opts.requires_openai_auth = Some(requires);
                }
                if let Some(env_key) = self.env_key {
                    opts.env_key = Some(env_key);
                }
            }
            ProviderTarget::Claude => {
                if self.wire_api.is_some()
                    || self.requires_openai_auth.is_some()
                    || self.env_key.is_some()
                {
                    log::warn!("供应商 {} 不是 Codex 供应商，忽略 Codex 专属字段", provider.id);
                }
            }
        }
    }
}

/// 由 (target, name) 生成稳定的 8 位十六进制 ID
pub fn generate_provider_id(app_type: AppType, name: &str) -> String {
    let digest = Sha256::digest(format!("{}:{}", app_type.as_str(), name).as_bytes());
    digest
        .iter()
        .take(4)
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// 密钥脱敏：前 4 位 + **** + 后 4 位；不超过 8 个字符时整体隐藏
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "********".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}****{tail}")
}

/// 键名包含 key/token/secret 的环境变量视为敏感
pub fn is_secret_key(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.contains("key") || lower.contains("token") || lower.contains("secret")
}

pub fn display_env_value(name: &str, value: &str) -> String {
    if is_secret_key(name) {
        mask_api_key(value)
    } else {
        value.to_string()
    }
}
