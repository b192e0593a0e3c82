//! Mock Plaid API server for testing
//!
//! Simulates the subset of the Plaid API the client uses:
//! - POST /item/get
//! - POST /accounts/balance/get
//! - POST /transactions/get (offset/count pagination)
//! - POST /item/access_token/invalidate
//!
//! Access tokens starting with `access-sandbox-` are accepted; anything
//! else gets an `INVALID_ACCESS_TOKEN` error body.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use chrono::{Duration, NaiveDate};
use serde_json::{json, Value as JsonValue};

/// Mock Plaid server
pub struct MockPlaidServer {
    port: u16,
    running: Arc<AtomicBool>,
    requests: Arc<Mutex<HashMap<String, usize>>>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

/// Configuration for mock responses
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub num_accounts: usize,
    /// Transactions per account
    pub num_transactions: usize,
    /// Error code reported inside a successful /item/get response
    pub item_error_code: Option<String>,
    /// Answer every request with HTTP 429
    pub rate_limit: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            num_accounts: 3,
            num_transactions: 10,
            item_error_code: None,
            rate_limit: false,
        }
    }
}

impl MockPlaidServer {
    /// Start on a random available port
    pub fn start(config: MockConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        let running = Arc::new(AtomicBool::new(true));
        let requests = Arc::new(Mutex::new(HashMap::new()));

        listener.set_nonblocking(true)?;

        let running_clone = running.clone();
        let requests_clone = requests.clone();
        let thread_handle = thread::spawn(move || {
            while running_clone.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, _)) => {
                        let cfg = config.clone();
                        let requests = requests_clone.clone();
                        thread::spawn(move || handle_connection(stream, &cfg, &requests));
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(std::time::Duration::from_millis(10));
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(Self {
            port,
            running,
            requests,
            thread_handle: Some(thread_handle),
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Number of requests received for `path`
    pub fn requests_to(&self, path: &str) -> usize {
        self.requests
            .lock()
            .map(|r| r.get(path).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MockPlaidServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Read one HTTP request, returning (path, body)
fn read_request(stream: &mut TcpStream) -> Option<(String, String)> {
    stream.set_nonblocking(false).ok()?;
    let mut data = Vec::new();
    let mut buffer = [0; 8192];

    let header_end = loop {
        let n = stream.read(&mut buffer).ok()?;
        if n == 0 {
            return None;
        }
        data.extend_from_slice(&buffer[..n]);
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
        let n = stream.read(&mut buffer).ok()?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buffer[..n]);
    }

    let path = head.lines().next()?.split_whitespace().nth(1)?.to_string();
    let body = String::from_utf8_lossy(&data[header_end..]).to_string();
    Some((path, body))
}

fn handle_connection(
    mut stream: TcpStream,
    config: &MockConfig,
    requests: &Mutex<HashMap<String, usize>>,
) {
    let Some((path, body)) = read_request(&mut stream) else {
        return;
    };
    if let Ok(mut counts) = requests.lock() {
        *counts.entry(path.clone()).or_insert(0) += 1;
    }

    if config.rate_limit {
        let body = error_body("RATE_LIMIT_EXCEEDED", "RATE_LIMIT_EXCEEDED", "rate limit exceeded");
        send_response(&mut stream, 429, "Too Many Requests", &body);
        return;
    }

    let request: JsonValue = serde_json::from_str(&body).unwrap_or(JsonValue::Null);
    let token = request["access_token"].as_str().unwrap_or("");
    if !token.starts_with("access-sandbox-") {
        let body = error_body(
            "INVALID_INPUT",
            "INVALID_ACCESS_TOKEN",
            "provided access token is in an invalid format",
        );
        send_response(&mut stream, 400, "Bad Request", &body);
        return;
    }

    let response = match path.as_str() {
        "/item/get" => item_response(config),
        "/accounts/balance/get" => accounts_response(config),
        "/transactions/get" => transactions_response(config, &request),
        "/item/access_token/invalidate" => json!({
            "new_access_token": format!("access-sandbox-{}", uuid::Uuid::new_v4()),
            "request_id": "mock",
        }),
        _ => {
            send_response(&mut stream, 404, "Not Found", r#"{"error": "Endpoint not found"}"#);
            return;
        }
    };
    send_response(&mut stream, 200, "OK", &response.to_string());
}

fn error_body(error_type: &str, error_code: &str, message: &str) -> String {
    json!({
        "error_type": error_type,
        "error_code": error_code,
        "error_message": message,
        "display_message": null,
        "request_id": "mock",
    })
    .to_string()
}

fn item_response(config: &MockConfig) -> JsonValue {
    let error = config.item_error_code.as_ref().map(|code| {
        json!({
            "error_type": "ITEM_ERROR",
            "error_code": code,
            "error_message": "the login details of this item have changed",
        })
    });
    json!({
        "item": {
            "item_id": "item_mock",
            "institution_id": "ins_3",
            "institution_name": "Chase",
            "error": error,
            "consent_expiration_time": null,
        },
        "request_id": "mock",
    })
}

fn accounts_response(config: &MockConfig) -> JsonValue {
    let accounts: Vec<JsonValue> = (1..=config.num_accounts)
        .map(|i| {
            json!({
                "account_id": format!("acc_{}", i),
                "balances": {
                    "available": 900.25 + i as f64,
                    "current": 999.5 + i as f64,
                    "limit": null,
                    "iso_currency_code": "USD",
                },
                "mask": format!("{:04}", i),
                "name": format!("Checking {}", i),
                "official_name": null,
                "type": "depository",
                "subtype": "checking",
            })
        })
        .collect();
    json!({ "accounts": accounts, "request_id": "mock" })
}

fn transactions_response(config: &MockConfig, request: &JsonValue) -> JsonValue {
    let start = request["start_date"]
        .as_str()
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        .unwrap_or_default();
    let end = request["end_date"]
        .as_str()
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        .unwrap_or(start);
    let span = (end - start).num_days().max(0) + 1;

    let account_ids: Vec<String> = match request["options"]["account_ids"].as_array() {
        Some(ids) if !ids.is_empty() => ids
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
        _ => (1..=config.num_accounts).map(|i| format!("acc_{}", i)).collect(),
    };

    let all: Vec<JsonValue> = account_ids
        .iter()
        .flat_map(|account_id| {
            (0..config.num_transactions).map(move |i| {
                json!({
                    "transaction_id": format!("{}_tx_{}", account_id, i),
                    "account_id": account_id,
                    "amount": 4.5 + i as f64,
                    "iso_currency_code": "USD",
                    "date": (start + Duration::days(i as i64 % span)).format("%Y-%m-%d").to_string(),
                    "name": format!("Purchase {}", i),
                    "merchant_name": "Blue  Bottle Coffee",
                    "pending": i % 5 == 0,
                    "personal_finance_category": {
                        "primary": "FOOD_AND_DRINK",
                        "detailed": "FOOD_AND_DRINK_COFFEE",
                    },
                })
            })
        })
        .collect();

    let offset = request["options"]["offset"].as_u64().unwrap_or(0) as usize;
    let count = request["options"]["count"].as_u64().unwrap_or(100) as usize;
    let page: Vec<JsonValue> = all.iter().skip(offset).take(count).cloned().collect();

    json!({
        "transactions": page,
        "total_transactions": all.len(),
        "request_id": "mock",
    })
}

fn send_response(stream: &mut TcpStream, status: u16, status_text: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        status_text,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}
