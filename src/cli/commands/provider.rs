use std::time::Duration;

use clap::Args;
use indexmap::IndexMap;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;

use crate::app_config::AppType;
use crate::cli::ui::{
    create_table, dim, error, highlight, info, prompt_result, success, target_label, warning,
};
use crate::error::AppError;
use crate::provider::{
    display_env_value, mask_api_key, ApiFormat, CodexOptions, Provider, ProviderForm,
    ProviderModels, ProviderPatch, ProviderTarget,
};
use crate::services::provider::live::CodexPreview;
use crate::services::provider::merge::CLAUDE_PROVIDER_ENV_KEYS;
use crate::services::{LivePreview, ProbeService, ProviderService, TestResult};
use crate::store::AppState;

/// add / edit 共用的字段参数
#[derive(Args, Debug, Default, Clone)]
pub struct ProviderFields {
    /// Display name
    #[arg(long)]
    pub name: Option<String>,

    /// Provider website
    #[arg(long)]
    pub website: Option<String>,

    /// API base URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// API key
    #[arg(long)]
    pub api_key: Option<String>,

    /// Request format used by the provider
    #[arg(long, value_enum)]
    pub api_format: Option<ApiFormat>,

    /// Default model
    #[arg(long)]
    pub default_model: Option<String>,

    /// Model used for the haiku role
    #[arg(long)]
    pub haiku_model: Option<String>,

    /// Model used for the opus role
    #[arg(long)]
    pub opus_model: Option<String>,

    /// Model used for the sonnet role
    #[arg(long)]
    pub sonnet_model: Option<String>,

    /// Extra environment variable written for claude (repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    pub extra_env: Vec<(String, String)>,

    /// Codex wire API (default: responses)
    #[arg(long)]
    pub wire_api: Option<String>,

    /// Codex: whether the provider uses OpenAI auth
    #[arg(long)]
    pub requires_openai_auth: Option<bool>,

    /// Codex: key name used in auth.json
    #[arg(long)]
    pub env_key: Option<String>,
}

fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

impl ProviderFields {
    fn has_models(&self) -> bool {
        self.default_model.is_some()
            || self.haiku_model.is_some()
            || self.opus_model.is_some()
            || self.sonnet_model.is_some()
    }

    /// 在已有模型上覆盖给出的角色；空字符串表示清除该角色
    fn models_over(&self, base: &ProviderModels) -> ProviderModels {
        let pick = |flag: &Option<String>, old: &Option<String>| match flag {
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(v.trim().to_string()),
            None => old.clone(),
        };
        ProviderModels {
            default: pick(&self.default_model, &base.default),
            haiku: pick(&self.haiku_model, &base.haiku),
            opus: pick(&self.opus_model, &base.opus),
            sonnet: pick(&self.sonnet_model, &base.sonnet),
        }
    }

    fn extra_env_map(&self) -> Option<IndexMap<String, String>> {
        if self.extra_env.is_empty() {
            None
        } else {
            Some(self.extra_env.iter().cloned().collect())
        }
    }

    fn codex_options(&self) -> CodexOptions {
        CodexOptions {
            wire_api: self.wire_api.clone(),
            requires_openai_auth: self.requires_openai_auth,
            env_key: self.env_key.clone(),
        }
    }

    fn has_codex_fields(&self) -> bool {
        self.wire_api.is_some() || self.requires_openai_auth.is_some() || self.env_key.is_some()
    }

    /// 构造新增表单；name / base_url / api_key 必填
    pub fn into_form(self, app_type: AppType) -> Result<ProviderForm, AppError> {
        let name = self
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| AppError::Validation("--name is required".into()))?;
        let base_url = self
            .base_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| AppError::Validation("--base-url is required".into()))?;
        let api_key = self
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AppError::Validation("--api-key is required".into()))?;
        if app_type == AppType::Claude && self.has_codex_fields() {
            log::warn!("--wire-api / --requires-openai-auth / --env-key 仅对 codex 供应商生效");
        }
        let target = match app_type {
            AppType::Claude => ProviderTarget::Claude,
            AppType::Codex => ProviderTarget::Codex(self.codex_options()),
        };
        let api_format = self.api_format.unwrap_or(match app_type {
            AppType::Claude => ApiFormat::AnthropicMessages,
            AppType::Codex => ApiFormat::OpenaiCompletions,
        });

        Ok(ProviderForm {
            name: name.trim().to_string(),
            website: self.website.clone().unwrap_or_default(),
            base_url: base_url.trim().to_string(),
            api_key: api_key.trim().to_string(),
            api_format,
            models: self.models_over(&ProviderModels::default()),
            extra_env: self.extra_env_map(),
            target,
        })
    }

    /// 构造部分更新
    pub fn into_patch(self, existing: &Provider) -> ProviderPatch {
        let models = self
            .has_models()
            .then(|| self.models_over(&existing.models));
        let extra_env = self.extra_env_map().map(|additions| {
            let mut merged = existing.extra_env.clone().unwrap_or_default();
            merged.extend(additions);
            merged
        });
        ProviderPatch {
            name: self.name,
            website: self.website,
            base_url: self.base_url,
            api_key: self.api_key,
            api_format: self.api_format,
            models,
            extra_env,
            wire_api: self.wire_api,
            requires_openai_auth: self.requires_openai_auth,
            env_key: self.env_key,
        }
    }
}

fn get_state() -> Result<AppState, AppError> {
    AppState::try_new()
}

fn format_created_at(created_at: Option<i64>) -> String {
    created_at
        .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis)
        .map(|dt| {
            dt.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M")
                .to_string()
        })
        .unwrap_or_else(|| "-".to_string())
}

fn or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

pub fn list(filter: Option<AppType>) -> Result<(), AppError> {
    let state = get_state()?;
    let providers = ProviderService::list(&state, filter)?;
    let active_claude = ProviderService::current(&state, AppType::Claude)?.map(|p| p.id);
    let active_codex = ProviderService::current(&state, AppType::Codex)?.map(|p| p.id);

    if providers.is_empty() {
        println!("{}", info("No providers found."));
        println!("Use 'persona add --name <NAME> --base-url <URL> --api-key <KEY>' to create one.");
        return Ok(());
    }

    let mut table = create_table();
    table.set_header(vec!["", "ID", "Name", "Target", "Base URL", "Format", "Created"]);

    for provider in &providers {
        let active = match provider.app_type() {
            AppType::Claude => active_claude.as_deref(),
            AppType::Codex => active_codex.as_deref(),
        } == Some(provider.id.as_str());
        let marker = if active { "✓" } else { "" };
        let name = if active {
            format!("* {}", provider.name)
        } else {
            format!("  {}", provider.name)
        };
        table.add_row(vec![
            marker.to_string(),
            provider.id.clone(),
            name,
            target_label(provider.app_type()),
            provider.base_url.clone(),
            provider.api_format.to_string(),
            format_created_at(provider.created_at),
        ]);
    }

    println!("{table}");
    for app_type in AppType::all() {
        if filter.is_some_and(|f| f != app_type) {
            continue;
        }
        let active = match app_type {
            AppType::Claude => active_claude.as_deref(),
            AppType::Codex => active_codex.as_deref(),
        };
        println!(
            "{} Active {}: {}",
            info("→"),
            app_type,
            highlight(active.unwrap_or("none"))
        );
    }
    Ok(())
}

pub fn show(id: &str) -> Result<(), AppError> {
    let state = get_state()?;
    let provider = ProviderService::get(&state, id)?;
    let active = ProviderService::current(&state, provider.app_type())?
        .is_some_and(|p| p.id == provider.id);

    println!("{}", highlight(&provider.name));
    println!("{}", "═".repeat(60));
    println!("  ID:        {}", provider.id);
    println!("  Target:    {}", target_label(provider.app_type()));
    println!("  Active:    {}", if active { success("yes") } else { dim("no") });
    println!("  Website:   {}", provider.website);
    println!("  Base URL:  {}", provider.base_url);
    println!("  API Key:   {}", mask_api_key(&provider.api_key));
    println!("  Format:    {}", provider.api_format);
    println!("  Created:   {}", format_created_at(provider.created_at));

    println!("\n{}", highlight("Models"));
    println!("  Default:   {}", or_dash(provider.models.default_model()));
    println!("  Haiku:     {}", or_dash(provider.models.haiku()));
    println!("  Opus:      {}", or_dash(provider.models.opus()));
    println!("  Sonnet:    {}", or_dash(provider.models.sonnet()));

    if let Some(opts) = provider.codex_options() {
        println!("\n{}", highlight("Codex"));
        println!("  Wire API:  {}", opts.wire_api());
        println!("  Auth key:  {}", opts.auth_key_name());
        if opts.env_key().is_none() {
            println!(
                "  OpenAI auth: {}",
                opts.requires_openai_auth.unwrap_or(true)
            );
        }
    }

    if let Some(extra) = provider.extra_env.as_ref().filter(|e| !e.is_empty()) {
        println!("\n{}", highlight("Extra env"));
        for (key, value) in extra {
            println!("  {key}: {}", display_env_value(key, value));
        }
    }
    println!("{}", "─".repeat(60));
    Ok(())
}

const RESET_CHOICE: &str = "__reset__";

struct Choice {
    id: String,
    label: String,
}

impl std::fmt::Display for Choice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label)
    }
}

fn provider_choices(providers: &[Provider], active: Option<&str>) -> Vec<Choice> {
    providers
        .iter()
        .map(|p| Choice {
            id: p.id.clone(),
            label: if Some(p.id.as_str()) == active {
                format!("{} ({}) (current)", p.name, p.id)
            } else {
                format!("{} ({})", p.name, p.id)
            },
        })
        .collect()
}

pub fn use_provider(
    id: Option<String>,
    target: Option<AppType>,
    update: bool,
    dry_run: bool,
) -> Result<(), AppError> {
    let state = get_state()?;
    let app_type = target.unwrap_or_default();

    if update {
        return refresh(&state, app_type, dry_run);
    }

    let id = match id {
        Some(id) => id,
        None => {
            let providers = ProviderService::list(&state, Some(app_type))?;
            let active = ProviderService::current(&state, app_type)?.map(|p| p.id);
            let mut choices = vec![Choice {
                id: RESET_CHOICE.to_string(),
                label: format!("Reset to default ({app_type} official)"),
            }];
            choices.extend(provider_choices(&providers, active.as_deref()));

            let prompt = inquire::Select::new(&format!("Select a {app_type} provider:"), choices)
                .with_page_size(12)
                .prompt();
            let Some(choice) = prompt_result(prompt)? else {
                println!("{}", info("Cancelled."));
                return Ok(());
            };
            if choice.id == RESET_CHOICE {
                if dry_run {
                    println!("{}", info("Dry run: reset would remove the provider settings."));
                    return Ok(());
                }
                return reset_with(&state, app_type);
            }
            choice.id
        }
    };

    if dry_run {
        let provider = ProviderService::get(&state, &id)?;
        let preview = ProviderService::preview(&state, &id)?;
        println!(
            "{}",
            highlight(&format!("Dry run: settings for '{}' (not written)", provider.name))
        );
        print_preview(&preview);
        return Ok(());
    }

    let provider = ProviderService::switch(&state, &id)?;
    println!(
        "{}",
        success(&format!("✓ Switched {} to provider '{}'", provider.app_type(), provider.name))
    );
    print_applied(&provider);
    println!(
        "\n{}",
        info(&format!("Restart the {} CLI for the change to take effect.", provider.app_type()))
    );
    Ok(())
}

fn refresh(state: &AppState, app_type: AppType, dry_run: bool) -> Result<(), AppError> {
    if dry_run {
        match ProviderService::current(state, app_type)? {
            Some(provider) => print_preview(&ProviderService::preview(state, &provider.id)?),
            None if app_type == AppType::Claude => {
                let doc = crate::services::provider::live::apply_claude_general(
                    &crate::general_config::GeneralConfig::load(),
                    false,
                )?;
                print_preview(&LivePreview::Claude(doc));
            }
            None => println!("{}", info("No active codex provider; nothing to write.")),
        }
        return Ok(());
    }

    match ProviderService::refresh_live(state, app_type)? {
        Some(provider) => {
            println!(
                "{}",
                success(&format!("✓ Re-applied '{}' to {}", provider.name, app_type))
            );
            print_applied(&provider);
        }
        None if app_type == AppType::Claude => {
            println!(
                "{}",
                success("✓ No active provider; applied the general config to claude")
            );
        }
        None => println!("{}", info("No active codex provider; nothing to write.")),
    }
    Ok(())
}

fn print_applied(provider: &Provider) {
    println!("{}", highlight("Applied settings:"));
    match provider.app_type() {
        AppType::Claude => {
            println!("  ANTHROPIC_BASE_URL: {}", provider.base_url);
            println!("  ANTHROPIC_AUTH_TOKEN: {}", mask_api_key(&provider.api_key));
            let roles = [
                ("ANTHROPIC_MODEL", provider.models.default_model()),
                ("ANTHROPIC_DEFAULT_HAIKU_MODEL", provider.models.haiku()),
                ("ANTHROPIC_DEFAULT_OPUS_MODEL", provider.models.opus()),
                ("ANTHROPIC_DEFAULT_SONNET_MODEL", provider.models.sonnet()),
            ];
            for (key, model) in roles {
                if let Some(model) = model {
                    println!("  {key}: {model}");
                }
            }
        }
        AppType::Codex => {
            let model = crate::services::provider::merge::resolve_codex_model(provider);
            let auth_key = provider
                .codex_options()
                .map(CodexOptions::auth_key_name)
                .unwrap_or("OPENAI_API_KEY");
            println!("  profile: persona");
            println!("  model_provider: {}", provider.name);
            println!("  base_url: {}", provider.base_url);
            println!("  model: {model}");
            println!("  auth.{auth_key}: {}", mask_api_key(&provider.api_key));
        }
    }
}

fn print_preview(preview: &LivePreview) {
    match preview {
        LivePreview::Claude(doc) => print_claude_document(doc),
        LivePreview::Codex(codex) => print_codex_preview(codex),
    }
}

fn print_claude_document(doc: &Value) {
    println!("{}", dim("settings.json"));
    if let Some(env) = doc.get("env").and_then(Value::as_object) {
        println!("  env:");
        for (key, value) in env {
            let text = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
            println!("    {key}: {}", display_env_value(key, &text));
        }
    }
    if let Some(root) = doc.as_object() {
        for (key, value) in root.iter().filter(|(k, _)| k.as_str() != "env") {
            println!("  {key}: {value}");
        }
    }
}

fn print_codex_preview(preview: &CodexPreview) {
    println!("{}", dim("config.toml"));
    for line in preview.config_text.lines() {
        println!("  {line}");
    }
    println!("{}", dim("auth.json"));
    for (key, value) in &preview.auth {
        let text = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
        println!("  {key}: {}", mask_api_key(&text));
    }
}

fn prompt_text(label: &str, default: Option<&str>) -> Result<Option<String>, AppError> {
    let mut prompt = inquire::Text::new(label);
    if let Some(default) = default {
        prompt = prompt.with_default(default);
    }
    prompt_result(prompt.prompt())
}

/// 交互补全 add 缺失的必填字段
fn fill_missing(fields: &mut ProviderFields) -> Result<bool, AppError> {
    if fields.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
        match prompt_text("Provider name:", None)? {
            Some(name) => fields.name = Some(name),
            None => return Ok(false),
        }
    }
    if fields.base_url.as_deref().map_or(true, |u| u.trim().is_empty()) {
        match prompt_text("Base URL:", None)? {
            Some(url) => fields.base_url = Some(url),
            None => return Ok(false),
        }
    }
    if fields.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
        let prompt = inquire::Password::new("API key:")
            .without_confirmation()
            .with_display_mode(inquire::PasswordDisplayMode::Masked)
            .prompt();
        match prompt_result(prompt)? {
            Some(key) => fields.api_key = Some(key),
            None => return Ok(false),
        }
    }
    Ok(true)
}

pub fn add(mut fields: ProviderFields, target: Option<AppType>) -> Result<(), AppError> {
    let state = get_state()?;
    let app_type = target.unwrap_or_default();

    let interactive =
        fields.name.is_none() || fields.base_url.is_none() || fields.api_key.is_none();
    if interactive && !fill_missing(&mut fields)? {
        println!("{}", info("Cancelled."));
        return Ok(());
    }

    let provider = ProviderService::add(&state, fields.into_form(app_type)?)?;
    println!(
        "{}",
        success(&format!("✓ Added {} provider '{}'", app_type, provider.name))
    );
    println!("  ID: {}", highlight(&provider.id));
    println!("\n{}", info(&format!("Use 'persona use {}' to activate it.", provider.id)));
    Ok(())
}

pub fn edit(id: &str, fields: ProviderFields) -> Result<(), AppError> {
    let state = get_state()?;
    let existing = ProviderService::get(&state, id)?;
    let patch = fields.into_patch(&existing);
    if patch.is_empty() {
        return Err(AppError::Validation(
            "Nothing to update; pass at least one field flag (see `persona edit --help`)".into(),
        ));
    }

    let was_active = ProviderService::current(&state, existing.app_type())?
        .is_some_and(|p| p.id == existing.id);
    let updated = ProviderService::update(&state, id, patch)?;

    println!("{}", success(&format!("✓ Updated provider '{}'", updated.name)));
    if was_active {
        println!(
            "{}",
            info(&format!("  Live {} settings were refreshed.", updated.app_type()))
        );
    }
    Ok(())
}

pub fn remove(id: Option<String>, target: Option<AppType>, yes: bool) -> Result<(), AppError> {
    let state = get_state()?;

    let id = match id {
        Some(id) => id,
        None => {
            let providers = ProviderService::list(&state, target)?;
            if providers.is_empty() {
                println!("{}", warning("No providers to delete."));
                return Ok(());
            }
            let prompt =
                inquire::Select::new("Select a provider to delete:", provider_choices(&providers, None))
                    .prompt();
            match prompt_result(prompt)? {
                Some(choice) => choice.id,
                None => {
                    println!("{}", info("Cancelled."));
                    return Ok(());
                }
            }
        }
    };

    let provider = ProviderService::get(&state, &id)?;
    if !yes {
        let prompt = inquire::Confirm::new(&format!(
            "Are you sure you want to delete provider '{}'?",
            provider.name
        ))
        .with_default(false)
        .prompt();
        if prompt_result(prompt)? != Some(true) {
            println!("{}", info("Cancelled."));
            return Ok(());
        }
    }

    let removed = ProviderService::delete(&state, &id)?;
    println!("{}", success(&format!("✓ Deleted provider '{}'", removed.name)));
    Ok(())
}

fn format_breakdown(result: &TestResult) -> Option<String> {
    let breakdown = result.timing_breakdown.as_ref()?;
    let parts: Vec<String> = [
        ("DNS", breakdown.dns),
        ("Connect", breakdown.connect),
        ("TTFB", breakdown.ttfb),
        ("API", breakdown.api),
    ]
    .into_iter()
    .filter_map(|(label, value)| value.map(|ms| format!("{label} {ms}ms")))
    .collect();
    (!parts.is_empty()).then(|| parts.join(" | "))
}

pub fn ping(id: Option<String>, target: Option<AppType>) -> Result<(), AppError> {
    let state = get_state()?;

    let provider = match id {
        Some(id) => ProviderService::get(&state, &id)?,
        None => {
            let providers = ProviderService::list(&state, target)?;
            if providers.is_empty() {
                println!("{}", warning("No providers to test."));
                return Ok(());
            }
            let prompt =
                inquire::Select::new("Select a provider to test:", provider_choices(&providers, None))
                    .prompt();
            match prompt_result(prompt)? {
                Some(choice) => ProviderService::get(&state, &choice.id)?,
                None => {
                    println!("{}", info("Cancelled."));
                    return Ok(());
                }
            }
        }
    };

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("Testing {} ...", provider.name));
    spinner.enable_steady_tick(Duration::from_millis(100));
    let result = ProbeService::test_provider_blocking(&provider);
    spinner.finish_and_clear();
    let result = result?;

    if result.success {
        println!(
            "{}",
            success(&format!(
                "✓ {} is reachable ({} ms)",
                result.provider,
                result.latency.unwrap_or_default()
            ))
        );
        println!("  Endpoint: {}", or_dash(result.endpoint.as_deref()));
        println!("  Model:    {}", or_dash(result.model.as_deref()));
        if let Some(line) = format_breakdown(&result) {
            println!("  Timing:   {line}");
        }
    } else {
        println!("{}", error(&format!("✗ {} failed", result.provider)));
        println!("  {}", or_dash(result.error.as_deref()));
        if result.is_auth_failure() {
            println!("{}", warning("  Check your API key."));
        }
    }
    Ok(())
}

pub fn status() -> Result<(), AppError> {
    let state = get_state()?;
    let report = ProviderService::status(&state)?;

    println!("{}", highlight("Current Status"));
    println!("{}", "═".repeat(60));

    for (app_type, active) in [(AppType::Claude, &report.claude), (AppType::Codex, &report.codex)] {
        println!("\n{}", target_label(app_type));
        match active {
            Some(provider) => {
                println!("  {} {}", success("Active provider:"), provider.name);
                println!("  ID:       {}", provider.id);
                println!("  Website:  {}", provider.website);
                println!("  API URL:  {}", provider.base_url);
                println!("  Format:   {}", provider.api_format);
            }
            None => println!("  {}", warning("No active provider selected.")),
        }
    }

    println!("\n{}", highlight("Claude settings"));
    let mut shown = false;
    for key in CLAUDE_PROVIDER_ENV_KEYS {
        if let Some(value) = report.claude_env.get(key).filter(|v| !v.is_empty()) {
            println!("  {key}: {}", display_env_value(key, value));
            shown = true;
        }
    }
    if !shown {
        println!("  {}", dim("(none)"));
    }

    println!("\n{}", highlight("Codex settings"));
    let live = &report.codex_live;
    match &live.model_provider {
        Some(name) => {
            println!("  profiles.persona.model_provider: {name}");
            println!("  profiles.persona.model: {}", or_dash(live.model.as_deref()));
            println!("  base_url: {}", or_dash(live.base_url.as_deref()));
        }
        None => println!("  {}", dim("(no persona profile)")),
    }
    for (key, value) in &live.auth {
        println!("  auth.{key}: {}", mask_api_key(value));
    }
    println!();
    Ok(())
}

fn reset_with(state: &AppState, app_type: AppType) -> Result<(), AppError> {
    ProviderService::clear(state, app_type)?;
    println!(
        "{}",
        success(&format!("✓ Reset {app_type} to its default configuration"))
    );
    match app_type {
        AppType::Claude => {
            println!("{}", highlight("Cleared settings:"));
            for key in CLAUDE_PROVIDER_ENV_KEYS {
                println!("  {key}");
            }
        }
        AppType::Codex => {
            println!("{}", highlight("Removed profiles.persona from config.toml"));
        }
    }
    println!(
        "\n{}",
        info(&format!("Restart the {app_type} CLI for the change to take effect."))
    );
    Ok(())
}

pub fn reset(target: Option<AppType>) -> Result<(), AppError> {
    let state = get_state()?;
    reset_with(&state, target.unwrap_or_default())
}
