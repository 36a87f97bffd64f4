//! One-shot HTTP server on loopback for exercising the reqwest clients

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Request as received on the wire
pub struct CapturedRequest {
    head: String,
    body: Vec<u8>,
}

impl CapturedRequest {
    /// `METHOD /path HTTP/1.1`
    pub fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    /// Header value, name matched case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
        })
    }

    /// Body with invalid UTF-8 (the WAV payload) replaced
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Serves exactly one request with `status` and a JSON `body`
///
/// Returns the base URL (`http://127.0.0.1:<port>/api`) and a handle that
/// resolves to the captured request.
pub async fn serve_once(
    status: u16,
    body: &'static str,
) -> (String, JoinHandle<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}/api", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let request = read_request(&mut stream).await;

        let response = format!(
            "HTTP/1.1 {status} Test\r\n\
             content-type: application/json\r\n\
             content-length: {}\r\n\
             connection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        let _ = stream.shutdown().await;
        request
    });

    (base_url, handle)
}

async fn read_request(stream: &mut TcpStream) -> CapturedRequest {
    let mut raw = Vec::new();
    let mut chunk = [0_u8; 4096];

    let head_end = loop {
        let read = stream.read(&mut chunk).await.unwrap();
        assert!(read > 0, "connection closed before headers");
        raw.extend_from_slice(&chunk[..read]);
        if let Some(pos) = find(&raw, b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&raw[..head_end]).into_owned();
    let mut request = CapturedRequest {
        head,
        body: raw[head_end..].to_vec(),
    };

    let content_length = request
        .header("content-length")
        .and_then(|value| value.parse::<usize>().ok());
    let chunked = request
        .header("transfer-encoding")
        .is_some_and(|value| value.eq_ignore_ascii_case("chunked"));

    loop {
        let complete = match content_length {
            Some(length) => request.body.len() >= length,
            None if chunked => request.body.ends_with(b"0\r\n\r\n"),
            None => true,
        };
        if complete {
            break;
        }
        let read = stream.read(&mut chunk).await.unwrap();
        if read == 0 {
            break;
        }
        request.body.extend_from_slice(&chunk[..read]);
    }

    request
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
