//! Scripted HTTP/1.1 server on an ephemeral localhost port
//!
//! A scripted server answers each accepted connection with the next response; once
//! the script runs out the last response repeats. A routed server answers by
//! request path and returns 404 for unknown paths. Requests are recorded for
//! assertions.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub body: String,
    pub delay: Duration,
}

impl MockResponse {
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Method, path and body of one received request
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: String,
}

pub struct MockServer {
    pub url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

/// How the server picks the response for one connection
#[derive(Clone)]
enum Responder {
    Fixed(MockResponse),
    Routed(Arc<Vec<(String, MockResponse)>>),
}

impl Responder {
    fn respond(&self, path: &str) -> MockResponse {
        match self {
            Responder::Fixed(response) => response.clone(),
            Responder::Routed(routes) => routes
                .iter()
                .find(|(route, _)| route == path)
                .map(|(_, response)| response.clone())
                .unwrap_or_else(|| MockResponse::json(404, "Not Found")),
        }
    }
}

impl MockServer {
    pub async fn start(script: Vec<MockResponse>) -> Self {
        Self::listen(move |served| {
            let response = script
                .get(served)
                .or_else(|| script.last())
                .cloned()
                .unwrap_or_else(|| MockResponse::json(500, "{}"));
            Responder::Fixed(response)
        })
        .await
    }

    /// Serve each `(path, response)` route for as many requests as arrive
    pub async fn routed(routes: Vec<(String, MockResponse)>) -> Self {
        let routes = Arc::new(routes);
        Self::listen(move |_| Responder::Routed(Arc::clone(&routes))).await
    }

    async fn listen<F>(mut responder_for: F) -> Self
    where
        F: FnMut(usize) -> Responder + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock server");
        let url = format!("http://{}", listener.local_addr().expect("local addr"));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = Arc::clone(&requests);
        tokio::spawn(async move {
            let mut served = 0usize;
            while let Ok((stream, _)) = listener.accept().await {
                let responder = responder_for(served);
                served += 1;
                let recorded = Arc::clone(&recorded);
                tokio::spawn(async move {
                    let _ = serve(stream, responder, recorded).await;
                });
            }
        });

        Self { url, requests }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn hits(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }
}

async fn serve(
    mut stream: TcpStream,
    responder: Responder,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
    let request = RecordedRequest {
        method: request_line.next().unwrap_or_default().to_string(),
        path: request_line.next().unwrap_or_default().to_string(),
        body: String::from_utf8_lossy(&buf[header_end..]).to_string(),
    };
    let response = responder.respond(&request.path);
    recorded.lock().expect("requests lock").push(request);

    tokio::time::sleep(response.delay).await;
    let reply = format!(
        "HTTP/1.1 {} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        response.status,
        response.body.len(),
        response.body
    );
    stream.write_all(reply.as_bytes()).await?;
    stream.shutdown().await
}
