use std::future::Future;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::json;
use url::Url;

use crate::error::AppError;
use crate::provider::{ApiFormat, Provider};

/// 每个阶段（DNS / 连接 / 请求）的超时
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

const ANTHROPIC_VERSION: &str = "2023-06-01";
const UNAUTHORIZED_MESSAGE: &str = "Unauthorized (401) - Invalid API key";
const FORBIDDEN_MESSAGE: &str = "Forbidden (403) - API key lacks permission";

/// 各阶段耗时（毫秒）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TimingBreakdown {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttfb: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api: Option<u64>,
}

/// 连通性测试结果；网络问题不会以 `Err` 返回，而是写入 `error`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub provider: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing_breakdown: Option<TimingBreakdown>,
}

impl TestResult {
    /// 401/403 属于凭据问题
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self.error.as_deref(),
            Some(UNAUTHORIZED_MESSAGE) | Some(FORBIDDEN_MESSAGE)
        )
    }
}

/// 原始连接计时：均为相对测试开始的累计毫秒数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionTiming {
    pub dns: u64,
    pub connect: u64,
    pub tls: Option<u64>,
    pub ttfb: u64,
}

impl ConnectionTiming {
    /// 某阶段失败后，其后所有阶段都记为失败时的耗时
    fn collapsed_after_dns(dns: u64) -> Self {
        Self {
            dns,
            connect: dns,
            tls: None,
            ttfb: dns,
        }
    }

    pub fn breakdown(&self, api: u64) -> TimingBreakdown {
        let dns = (self.dns > 0).then_some(self.dns);
        let connect = match self.tls.filter(|t| *t > 0) {
            Some(tls) => Some(tls.saturating_sub(self.dns)),
            None => (self.connect > 0).then(|| self.connect.saturating_sub(self.dns)),
        };
        let ttfb = (self.ttfb > 0).then(|| self.ttfb.saturating_sub(self.connect));
        TimingBreakdown {
            dns,
            connect,
            ttfb,
            api: Some(api),
        }
    }
}

/// 生成待尝试的端点列表
pub fn endpoint_candidates(base_url: &str, api_format: ApiFormat) -> Vec<String> {
    let base = base_url.trim().trim_end_matches('/');
    if base.contains("/messages") || base.contains("/chat/completions") || base.contains("/v1/") {
        return vec![base.to_string()];
    }
    let suffixes: [&str; 2] = match api_format {
        ApiFormat::AnthropicMessages => ["/messages", "/v1/messages"],
        ApiFormat::OpenaiCompletions => ["/chat/completions", "/v1/chat/completions"],
    };
    suffixes
        .iter()
        .map(|suffix| format!("{base}{suffix}"))
        .chain(std::iter::once(base.to_string()))
        .collect()
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn host_of(url: &Url) -> Option<String> {
    url.host_str()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
}

fn is_loopback(url: &Url) -> bool {
    match host_of(url) {
        Some(host) if host.eq_ignore_ascii_case("localhost") => true,
        Some(host) => host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback()),
        None => false,
    }
}

fn build_client(url: &Url) -> Result<Client, AppError> {
    let mut builder = Client::builder().timeout(PROBE_TIMEOUT);
    if is_loopback(url) {
        builder = builder.no_proxy();
    }
    builder
        .build()
        .map_err(|e| AppError::Message(format!("创建 HTTP 客户端失败: {e}")))
}

/// 在当前线程的运行时上执行网络请求
fn run_http<F, T>(future: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| AppError::Message(format!("创建异步运行时失败: {e}")))?;
    runtime.block_on(future)
}

/// 供应商连通性测试
pub struct ProbeService;

impl ProbeService {
    /// 阻塞版本，供 CLI 使用
    pub fn test_provider_blocking(provider: &Provider) -> Result<TestResult, AppError> {
        run_http(async { Ok(Self::test_provider(provider).await) })
    }

    pub async fn test_provider(provider: &Provider) -> TestResult {
        let start = Instant::now();
        let mut result = TestResult {
            provider: provider.name.clone(),
            ..Default::default()
        };

        let base = provider.base_url.trim().trim_end_matches('/');
        let url = match Url::parse(base) {
            Ok(url) if url.host_str().is_some() => url,
            Ok(_) | Err(_) => {
                result.error = Some(format!("Invalid base URL: {}", provider.base_url));
                return result;
            }
        };
        let client = match build_client(&url) {
            Ok(client) => client,
            Err(err) => {
                result.error = Some(err.to_string());
                return result;
            }
        };

        let timing = Self::measure_connection(&client, &url, start).await;
        log::debug!("{} 连接计时: {:?}", provider.name, timing);

        let model = provider
            .models
            .resolve_or(provider.api_format.probe_fallback_model())
            .to_string();
        let body = json!({
            "model": model,
            "max_tokens": 10,
            "messages": [{ "role": "user", "content": "Hi" }],
        });

        let candidates = endpoint_candidates(&provider.base_url, provider.api_format);
        for endpoint in &candidates {
            let request_start = Instant::now();
            let request = client.post(endpoint).json(&body);
            let request = match provider.api_format {
                ApiFormat::AnthropicMessages => request
                    .header("x-api-key", &provider.api_key)
                    .header("anthropic-version", ANTHROPIC_VERSION),
                ApiFormat::OpenaiCompletions => request.bearer_auth(&provider.api_key),
            };

            let status = match request.send().await {
                Ok(response) => response.status(),
                Err(err) => {
                    log::debug!("请求 {endpoint} 失败: {err}");
                    continue;
                }
            };

            if status.is_success() {
                result.success = true;
                result.latency = Some(elapsed_ms(start));
                result.model = Some(model);
                result.endpoint = Some(endpoint.clone());
                result.timing_breakdown = Some(timing.breakdown(elapsed_ms(request_start)));
                return result;
            }
            match status {
                StatusCode::UNAUTHORIZED => {
                    result.latency = Some(elapsed_ms(start));
                    result.error = Some(UNAUTHORIZED_MESSAGE.to_string());
                    return result;
                }
                StatusCode::FORBIDDEN => {
                    result.latency = Some(elapsed_ms(start));
                    result.error = Some(FORBIDDEN_MESSAGE.to_string());
                    return result;
                }
                other => log::debug!("{endpoint} 返回 {other}，尝试下一个端点"),
            }
        }

        result.latency = Some(elapsed_ms(start));
        result.error = Some(format!(
            "All endpoints failed. Tried: {}",
            candidates.join(", ")
        ));
        result
    }

    /// 对 `scheme://host[:port]/` 依次测量 DNS、TCP 连接与首字节时间
    pub async fn measure_connection(client: &Client, url: &Url, start: Instant) -> ConnectionTiming {
        let Some(host) = host_of(url) else {
            return ConnectionTiming::default();
        };
        let port = url.port_or_known_default().unwrap_or(443);

        let addr = match tokio::time::timeout(PROBE_TIMEOUT, tokio::net::lookup_host((host.as_str(), port))).await {
            Ok(Ok(mut addrs)) => addrs.next(),
            Ok(Err(err)) => {
                log::debug!("DNS 解析 {host} 失败: {err}");
                None
            }
            Err(_) => None,
        };
        let dns = elapsed_ms(start);
        let Some(addr) = addr else {
            return ConnectionTiming::collapsed_after_dns(dns);
        };

        let connected = matches!(
            tokio::time::timeout(PROBE_TIMEOUT, tokio::net::TcpStream::connect(addr)).await,
            Ok(Ok(_))
        );
        let connect = elapsed_ms(start);
        if !connected {
            return ConnectionTiming {
                dns,
                connect,
                tls: None,
                ttfb: connect,
            };
        }

        let host_url = match url.port() {
            Some(port) => format!("{}://{}:{}/", url.scheme(), url.host_str().unwrap_or(&host), port),
            None => format!("{}://{}/", url.scheme(), url.host_str().unwrap_or(&host)),
        };
        if let Err(err) = client.head(&host_url).send().await {
            log::debug!("HEAD {host_url} 失败: {err}");
        }
        let ttfb = elapsed_ms(start);

        ConnectionTiming {
            dns,
            connect,
            tls: None,
            ttfb,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_follow_api_format() {
        assert_eq!(
            endpoint_candidates("https://api.example.com/", ApiFormat::AnthropicMessages),
            vec![
                "https://api.example.com/messages",
                "https://api.example.com/v1/messages",
                "https://api.example.com",
            ]
        );
        assert_eq!(
            endpoint_candidates("https://api.example.com", ApiFormat::OpenaiCompletions),
            vec![
                "https://api.example.com/chat/completions",
                "https://api.example.com/v1/chat/completions",
                "https://api.example.com",
            ]
        );
    }

    #[test]
    fn endpoint_shaped_url_is_the_only_candidate() {
        for url in [
            "https://relay.dev/v1/messages",
            "https://relay.dev/openai/chat/completions/",
            "https://relay.dev/v1/custom",
        ] {
            let candidates = endpoint_candidates(url, ApiFormat::AnthropicMessages);
            assert_eq!(candidates.len(), 1, "{url}");
            assert_eq!(candidates[0], url.trim_end_matches('/'));
        }
    }

    #[test]
    fn breakdown_uses_phase_differences() {
        let timing = ConnectionTiming {
            dns: 5,
            connect: 20,
            tls: None,
            ttfb: 50,
        };
        let breakdown = timing.breakdown(120);
        assert_eq!(breakdown.dns, Some(5));
        assert_eq!(breakdown.connect, Some(15));
        assert_eq!(breakdown.ttfb, Some(30));
        assert_eq!(breakdown.api, Some(120));

        let with_tls = ConnectionTiming {
            tls: Some(40),
            ..timing
        };
        assert_eq!(with_tls.breakdown(1).connect, Some(35));
    }

    #[test]
    fn breakdown_omits_zero_phases_but_keeps_api() {
        let breakdown = ConnectionTiming::default().breakdown(0);
        assert_eq!(
            breakdown,
            TimingBreakdown {
                api: Some(0),
                ..Default::default()
            }
        );
    }

    #[test]
    fn loopback_detection() {
        let parse = |s: &str| Url::parse(s).expect("url");
        assert!(is_loopback(&parse("http://127.0.0.1:8080")));
        assert!(is_loopback(&parse("http://localhost")));
        assert!(is_loopback(&parse("http://[::1]:9000")));
        assert!(!is_loopback(&parse("https://api.example.com")));
    }

    #[test]
    fn invalid_base_url_is_reported_not_raised() {
        let provider = crate::provider::ProviderForm {
            name: "Broken".into(),
            website: String::new(),
            base_url: "not a url".into(),
            api_key: "sk-1".into(),
            api_format: ApiFormat::AnthropicMessages,
            models: Default::default(),
            extra_env: None,
            target: crate::provider::ProviderTarget::Claude,
        }
        .into_provider();

        let result = ProbeService::test_provider_blocking(&provider).expect("runtime");
        assert!(!result.success);
        assert_eq!(result.provider, "Broken");
        assert!(result.error.expect("error").contains("Invalid base URL"));
    }
}
