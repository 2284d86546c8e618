#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chat_gateway::GatewayConfig;

#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status_code: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl MockResponse {
    pub fn json(status_code: u16, body: &str) -> Self {
        Self {
            status_code,
            content_type: "application/json",
            body: body.to_string(),
        }
    }

    pub fn event_stream(body: &str) -> Self {
        Self {
            status_code: 200,
            content_type: "text/event-stream",
            body: body.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub request_line: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl CapturedRequest {
    pub fn json_body(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("captured body should be json")
    }

    pub fn path(&self) -> &str {
        self.request_line.split(' ').nth(1).unwrap_or_default()
    }
}

/// Upstream stand-in: serves the queued responses in order, one connection each.
pub struct MockServer {
    addr: std::net::SocketAddr,
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl MockServer {
    pub fn start(responses: Vec<MockResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        let captured = Arc::new(Mutex::new(Vec::new()));
        let captured_clone = Arc::clone(&captured);

        let handle = thread::spawn(move || {
            let mut queue = VecDeque::from(responses);
            while let Some(response) = queue.pop_front() {
                let (mut stream, _) = listener.accept().expect("accept connection");
                stream
                    .set_read_timeout(Some(Duration::from_secs(3)))
                    .expect("set stream timeout");

                let request = read_http_request(&mut stream);
                captured_clone.lock().expect("captured lock").push(request);

                let raw = format!(
                    "HTTP/1.1 {} Mock\r\nContent-Length: {}\r\nContent-Type: {}\r\nConnection: close\r\n\r\n{}",
                    response.status_code,
                    response.body.len(),
                    response.content_type,
                    response.body,
                );
                stream.write_all(raw.as_bytes()).expect("write response");
                stream.flush().expect("flush response");
            }
        });

        Self {
            addr,
            captured,
            handle: Some(handle),
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn captured(&self) -> Vec<CapturedRequest> {
        self.captured.lock().expect("captured lock").clone()
    }

    pub fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.join().expect("join mock server");
        }
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Config with every provider keyed and pointed at `base_url`.
pub fn config_for(base_url: &str) -> GatewayConfig {
    let vars = HashMap::from([
        ("OPENROUTER_API_KEY", "or-key"),
        ("OPENAI_API_KEY", "sk-openai"),
        ("ANTHROPIC_API_KEY", "sk-ant"),
        ("GEMINI_API_KEY", "g-key"),
        ("OPENROUTER_BASE_URL", base_url),
        ("OPENAI_BASE_URL", base_url),
        ("ANTHROPIC_BASE_URL", base_url),
        ("GEMINI_BASE_URL", base_url),
        ("GATEWAY_TIMEOUT_MS", "5000"),
        ("GATEWAY_HTTP_REFERER", "https://chat.example"),
        ("GATEWAY_APP_TITLE", "Chat Example"),
    ]);

    GatewayConfig::from_lookup(|name| vars.get(name).map(|value| value.to_string()))
        .expect("test config")
}

fn read_http_request(stream: &mut std::net::TcpStream) -> CapturedRequest {
    let mut request = Vec::new();
    let mut chunk = [0_u8; 1024];

    let header_end = loop {
        match stream.read(&mut chunk) {
            Ok(0) => break request.len(),
            Ok(bytes_read) => {
                request.extend_from_slice(&chunk[..bytes_read]);
                if let Some(position) = request.windows(4).position(|window| window == b"\r\n\r\n")
                {
                    break position + 4;
                }
            }
            Err(_) => break request.len(),
        }
    };

    let head = String::from_utf8_lossy(&request[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default().to_string();
    let headers = lines
        .take_while(|line| !line.is_empty())
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            Some((name.trim().to_ascii_lowercase(), value.trim().to_string()))
        })
        .collect::<BTreeMap<_, _>>();

    let content_length = headers
        .get("content-length")
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(0);
    while request.len() < header_end + content_length {
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(bytes_read) => request.extend_from_slice(&chunk[..bytes_read]),
        }
    }

    let body_end = (header_end + content_length).min(request.len());
    CapturedRequest {
        request_line,
        headers,
        body: String::from_utf8_lossy(&request[header_end..body_end]).to_string(),
    }
}
