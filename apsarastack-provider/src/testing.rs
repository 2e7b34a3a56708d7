//! In-process HTTP responder standing in for ApsaraStack endpoints

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use percent_encoding::percent_decode_str;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::connectivity::{ApsaraStackClient, Config, Protocol};

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Zero-based position among all requests the server received
    pub sequence: usize,
    pub method: String,
    pub path: String,
    /// Lower-cased header names
    pub headers: HashMap<String, String>,
    /// Query and form parameters, decoded
    pub params: BTreeMap<String, String>,
}

impl RecordedRequest {
    pub fn action(&self) -> &str {
        self.param("Action").unwrap_or_default()
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

type Handler = dyn Fn(&RecordedRequest) -> (u16, serde_json::Value) + Send + Sync;

pub struct MockServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockServer {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> (u16, serde_json::Value) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Arc<Handler> = Arc::new(handler);

        let recorded = requests.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let recorded = recorded.clone();
                let handler = handler.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, recorded, handler).await;
                });
            }
        });

        Self { addr, requests }
    }

    /// `host:port`, without scheme
    pub fn endpoint(&self) -> String {
        self.addr.to_string()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|r| r.action().to_string())
            .collect()
    }

    pub fn requests_for(&self, action: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.action() == action)
            .collect()
    }
}

async fn serve(
    stream: TcpStream,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
    handler: Arc<Handler>,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();

    let mut headers = HashMap::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await?;
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_lowercase(), value.trim().to_string());
        }
    }

    let length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body = vec![0; length];
    reader.read_exact(&mut body).await?;

    let (path, query) = target.split_once('?').unwrap_or((target.as_str(), ""));
    let mut params = parse_form(query);
    params.extend(parse_form(&String::from_utf8_lossy(&body)));

    let request = {
        let mut all = recorded.lock().unwrap();
        let request = RecordedRequest {
            sequence: all.len(),
            method,
            path: path.to_string(),
            headers,
            params,
        };
        all.push(request.clone());
        request
    };

    let (status, payload) = handler(&request);
    let payload = payload.to_string();
    let response = format!(
        "HTTP/1.1 {} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        payload.len(),
        payload
    );
    let mut stream = reader.into_inner();
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

fn parse_form(raw: &str) -> BTreeMap<String, String> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            let decode = |s: &str| {
                percent_decode_str(&s.replace('+', " "))
                    .decode_utf8_lossy()
                    .to_string()
            };
            (decode(k), decode(v))
        })
        .collect()
}

/// Configuration pointing every product at the mock server
pub fn config_for(server: &MockServer) -> Config {
    Config {
        access_key: "ak".to_string(),
        secret_key: "sk".to_string(),
        region: "cn-qingdao-env66-d01".to_string(),
        protocol: Protocol::Http,
        department: "11".to_string(),
        resource_group: "27".to_string(),
        domain: Some(server.endpoint()),
        tls_handshake_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

/// Client against the mock server that polls without delay
pub fn client_for(server: &MockServer) -> ApsaraStackClient {
    ApsaraStackClient::new(config_for(server))
        .unwrap()
        .with_poll_interval(Duration::from_millis(10))
}
