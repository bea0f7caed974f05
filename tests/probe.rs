use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use persona_lib::{
    ApiFormat, Provider, ProbeService, ProviderForm, ProviderModels, ProviderTarget,
};

/// 极简 HTTP 桩服务：记录 POST 路径，按路径返回状态码
struct MockServer {
    base_url: String,
    posts: Arc<Mutex<Vec<String>>>,
}

impl MockServer {
    fn start(status_for: fn(&str) -> u16) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        let port = listener.local_addr().expect("local addr").port();
        let posts = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&posts);

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                handle(stream, status_for, &recorded);
            }
        });

        Self {
            base_url: format!("http://127.0.0.1:{port}/api"),
            posts,
        }
    }

    fn posts(&self) -> Vec<String> {
        self.posts.lock().expect("posts lock").clone()
    }
}

fn read_request(stream: &mut TcpStream) -> Option<(String, String)> {
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .ok()?;
    let mut data = Vec::new();
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            // 仅建立连接（测量 TCP 耗时）的空连接
            return None;
        }
        data.extend_from_slice(&chunk[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&data[..header_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while data.len() < header_end + content_length {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&chunk[..n]);
    }

    let mut request_line = head.lines().next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    Some((method, path))
}

fn handle(mut stream: TcpStream, status_for: fn(&str) -> u16, posts: &Mutex<Vec<String>>) {
    let Some((method, path)) = read_request(&mut stream) else {
        return;
    };
    let response = if method == "POST" {
        posts.lock().expect("posts lock").push(path.clone());
        let status = status_for(&path);
        format!("HTTP/1.1 {status} Mock\r\nContent-Type: application/json\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{{}}")
    } else {
        "HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
    };
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}

fn provider(base_url: &str, api_format: ApiFormat) -> Provider {
    ProviderForm {
        name: "Mock".into(),
        website: String::new(),
        base_url: base_url.to_string(),
        api_key: "sk-test-key-123456".into(),
        api_format,
        models: ProviderModels {
            default: Some("m1".into()),
            ..Default::default()
        },
        extra_env: None,
        target: ProviderTarget::Claude,
    }
    .into_provider()
}

#[test]
fn falls_through_candidates_until_success() {
    let server = MockServer::start(|path| if path == "/api" { 200 } else { 404 });
    let result = ProbeService::test_provider_blocking(&provider(
        &server.base_url,
        ApiFormat::AnthropicMessages,
    ))
    .expect("probe");

    assert!(result.success, "unexpected failure: {:?}", result.error);
    assert_eq!(result.endpoint.as_deref(), Some(server.base_url.as_str()));
    assert_eq!(result.model.as_deref(), Some("m1"));
    assert!(result.latency.is_some());
    assert!(result.error.is_none());
    assert_eq!(
        server.posts(),
        vec!["/api/messages", "/api/v1/messages", "/api"]
    );
}

#[test]
fn openai_format_falls_through_to_bare_url() {
    let server = MockServer::start(|path| if path == "/api" { 200 } else { 404 });
    let result = ProbeService::test_provider_blocking(&provider(
        &server.base_url,
        ApiFormat::OpenaiCompletions,
    ))
    .expect("probe");

    assert!(result.success, "unexpected failure: {:?}", result.error);
    assert_eq!(result.endpoint.as_deref(), Some(server.base_url.as_str()));
    assert_eq!(
        server.posts(),
        vec!["/api/chat/completions", "/api/v1/chat/completions", "/api"]
    );
}

#[test]
fn unauthorized_stops_after_first_candidate() {
    let server = MockServer::start(|_| 401);
    let result = ProbeService::test_provider_blocking(&provider(
        &server.base_url,
        ApiFormat::AnthropicMessages,
    ))
    .expect("probe");

    assert!(!result.success);
    assert!(result.is_auth_failure());
    assert_eq!(
        result.error.as_deref(),
        Some("Unauthorized (401) - Invalid API key")
    );
    assert_eq!(server.posts(), vec!["/api/messages"]);
}

#[test]
fn forbidden_stops_after_first_candidate() {
    let server = MockServer::start(|_| 403);
    let result = ProbeService::test_provider_blocking(&provider(
        &server.base_url,
        ApiFormat::OpenaiCompletions,
    ))
    .expect("probe");

    assert!(!result.success);
    assert!(result.error.as_deref().is_some_and(|e| e.starts_with("Forbidden (403)")));
    assert_eq!(server.posts(), vec!["/api/chat/completions"]);
}

#[test]
fn exhausted_candidates_list_every_endpoint() {
    let server = MockServer::start(|_| 500);
    let result = ProbeService::test_provider_blocking(&provider(
        &server.base_url,
        ApiFormat::OpenaiCompletions,
    ))
    .expect("probe");

    assert!(!result.success);
    let error = result.error.expect("error message");
    assert!(error.starts_with("All endpoints failed. Tried: "));
    assert!(error.contains(&format!("{}/v1/chat/completions", server.base_url)));
    assert_eq!(server.posts().len(), 3);
    assert!(result.timing_breakdown.is_none());
}

#[test]
fn unreachable_host_is_a_result_not_an_error() {
    // 绑定后立即释放端口，连接会被拒绝
    let port = TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .expect("free port")
        .port();
    let result = ProbeService::test_provider_blocking(&provider(
        &format!("http://127.0.0.1:{port}"),
        ApiFormat::AnthropicMessages,
    ))
    .expect("probe");

    assert!(!result.success);
    assert!(result
        .error
        .as_deref()
        .is_some_and(|e| e.starts_with("All endpoints failed")));
}
