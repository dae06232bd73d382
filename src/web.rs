use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Component, Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

pub(crate) const MAX_REQUEST_LENGTH: usize = 4096;
const NOT_FOUND_BODY: &[u8] = b"<h1>404 NOT FOUND</h1>";

/// Serves files under `root` to one loopback client at a time.
pub struct WebServer {
    listener: TcpListener,
    root: PathBuf,
}

impl WebServer {
    pub async fn bind(port: u16, root: impl Into<PathBuf>) -> io::Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await?;
        Ok(Self {
            listener,
            root: root.into(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) -> io::Result<()> {
        info!(addr = %self.local_addr()?, root = %self.root.display(), "web server listening");

        loop {
            let (stream, peer_addr) = self.listener.accept().await?;
            debug!(%peer_addr, "connection accepted");

            if let Err(error) = self.handle_connection(stream).await {
                warn!(%peer_addr, %error, "unable to serve request");
            }
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream) -> io::Result<()> {
        let mut buf = vec![0u8; MAX_REQUEST_LENGTH];
        let size = stream.read(&mut buf).await?;
        let request = String::from_utf8_lossy(&buf[..size]);

        let response = match request_target(&request) {
            None => http_response("400 Bad Request", b""),
            Some(target) => self.respond_to(target).await,
        };

        stream.write_all(&response).await?;
        stream.shutdown().await
    }

    async fn respond_to(&self, target: &str) -> Vec<u8> {
        let Some(file_path) = resolve_request_path(&self.root, target) else {
            return http_response("404 Not Found", NOT_FOUND_BODY);
        };

        match tokio::fs::read(&file_path).await {
            Ok(contents) => {
                info!(path = %file_path.display(), "200 OK");
                http_response("200 OK", &contents)
            }
            Err(error) => {
                info!(path = %file_path.display(), %error, "404 Not Found");
                http_response("404 Not Found", NOT_FOUND_BODY)
            }
        }
    }
}

/// The target of the request line, e.g. `/index.html` in `GET /index.html HTTP/1.1`.
pub(crate) fn request_target(request: &str) -> Option<&str> {
    let request_line = request.lines().next()?;
    let mut parts = request_line.split_whitespace();
    let _method = parts.next()?;
    parts.next()
}

/// Maps a request target onto a file under `root`. `/` is `index.html`.
/// Targets escaping `root` resolve to nothing.
pub fn resolve_request_path(root: &Path, target: &str) -> Option<PathBuf> {
    let path = target.split(|c: char| c == '?' || c == '#').next().unwrap_or_default();
    let relative = match path.trim_start_matches('/') {
        "" => "index.html",
        relative => relative,
    };

    let relative = Path::new(relative);
    if !relative.components().all(|component| matches!(component, Component::Normal(_))) {
        return None;
    }

    Some(root.join(relative))
}

pub(crate) fn http_response(status: &str, body: &[u8]) -> Vec<u8> {
    let mut response = format!("HTTP/1.1 {status}\r\nContent-Length: {}\r\n\r\n", body.len()).into_bytes();
    response.extend_from_slice(body);
    response
}
