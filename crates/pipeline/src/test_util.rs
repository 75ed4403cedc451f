//! Mock storage provider and pipeline helpers for tests.

use std::sync::{Arc, Mutex};

use gnfd_sp_client::{Account, Client, ClientConfig, RetryOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::chain::ChainClient;
use crate::upload::{ObjectPipeline, PipelineConfig};

const TEST_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

#[derive(Debug, Clone)]
pub(crate) struct Captured {
    pub head: String,
    pub body: Vec<u8>,
}

impl Captured {
    pub fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.head.lines().skip(1).find_map(|line| {
            let (k, v) = line.split_once(':')?;
            k.trim()
                .eq_ignore_ascii_case(name)
                .then(|| v.trim().to_string())
        })
    }
}

/// Answers each connection with the next canned response.
pub(crate) struct MockSp {
    url: String,
    requests: Arc<Mutex<Vec<Captured>>>,
    handle: tokio::task::JoinHandle<()>,
}

impl MockSp {
    pub async fn start(responses: Vec<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = Arc::clone(&requests);
        let handle = tokio::spawn(async move {
            for resp in responses {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let captured = read_request(&mut stream).await;
                recorded.lock().unwrap().push(captured);
                let _ = stream.write_all(resp.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        Self {
            url,
            requests,
            handle,
        }
    }

    pub fn requests(&self) -> Vec<Captured> {
        self.requests.lock().unwrap().clone()
    }

    pub fn client(&self) -> Client {
        let config = ClientConfig {
            endpoint: self.url.clone(),
            retry: RetryOptions::disabled(),
            ..Default::default()
        };
        let account = Account::from_private_key_hex(TEST_KEY).unwrap();
        Client::new(config, Some(account)).unwrap()
    }
}

impl Drop for MockSp {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn read_request(stream: &mut tokio::net::TcpStream) -> Captured {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break buf.len(),
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let content_length = head
        .lines()
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf.get(head_end + 4..).map(<[u8]>::to_vec).unwrap_or_default();
    while body.len() < content_length {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => body.extend_from_slice(&chunk[..n]),
        }
    }
    Captured { head, body }
}

fn http_response(status: &str, headers: &[(&str, &str)], body: &str) -> String {
    let mut resp = format!("HTTP/1.1 {status}\r\n");
    for (k, v) in headers {
        resp.push_str(&format!("{k}: {v}\r\n"));
    }
    resp.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    ));
    resp
}

pub(crate) fn approval_ok(signature: &str) -> String {
    http_response("200 OK", &[("X-Gnfd-Pre-Signature", signature)], "")
}

pub(crate) fn put_ok(etag: &str) -> String {
    http_response("200 OK", &[("ETag", &format!("\"{etag}\""))], "")
}

pub(crate) fn xml_error(status: &str, code: &str, message: &str) -> String {
    let body = format!(
        "<Error><Code>{code}</Code><Message>{message}</Message><RequestId>req-7</RequestId></Error>"
    );
    http_response(status, &[("Content-Type", "application/xml")], &body)
}

/// Pipeline wired to `sp` and `chain`.
pub(crate) fn pipeline<C>(sp: &MockSp, chain: Arc<C>, config: PipelineConfig) -> ObjectPipeline
where
    C: ChainClient + 'static,
{
    ObjectPipeline::new(sp.client(), chain, config)
}
