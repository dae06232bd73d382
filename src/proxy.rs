use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::web::{http_response, request_target, MAX_REQUEST_LENGTH};

const DEFAULT_HTTP_PORT: u16 = 80;
const CACHE_FILE_NAME: &str = "cache.txt";

/// Stores whole origin responses keyed by request target.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Vec<u8>>;
    async fn put(&mut self, key: &str, response: Vec<u8>) -> io::Result<()>;
}

/// An unbounded in-memory map backed by a single on-disk slot.
///
/// The slot (`<cache-dir>/cache.txt`) holds only the most recent miss: its
/// first line is the key, the rest is the response. Nothing is ever evicted
/// from memory.
pub struct MemoryDiskCache {
    memory: HashMap<String, Vec<u8>>,
    cache_file: PathBuf,
}

impl MemoryDiskCache {
    pub async fn new(cache_dir: impl Into<PathBuf>) -> io::Result<Self> {
        let cache_dir = cache_dir.into();
        tokio::fs::create_dir_all(&cache_dir).await?;

        Ok(Self {
            memory: HashMap::new(),
            cache_file: cache_dir.join(CACHE_FILE_NAME),
        })
    }

    async fn read_disk_slot(&self, key: &str) -> Option<Vec<u8>> {
        let contents = tokio::fs::read(&self.cache_file).await.ok()?;
        let newline = contents.iter().position(|&byte| byte == b'\n')?;
        if &contents[..newline] != key.as_bytes() {
            return None;
        }

        Some(contents[newline + 1..].to_vec())
    }
}

#[async_trait]
impl ResponseCache for MemoryDiskCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        if let Some(response) = self.memory.get(key) {
            debug!(%key, "memory cache hit");
            return Some(response.clone());
        }

        let response = self.read_disk_slot(key).await;
        if response.is_some() {
            debug!(%key, "disk cache hit");
        }
        response
    }

    async fn put(&mut self, key: &str, response: Vec<u8>) -> io::Result<()> {
        let mut slot = Vec::with_capacity(key.len() + 1 + response.len());
        slot.extend_from_slice(key.as_bytes());
        slot.push(b'\n');
        slot.extend_from_slice(&response);

        self.memory.insert(key.to_string(), response);
        tokio::fs::write(&self.cache_file, slot).await
    }
}

/// What the proxy needs from a client request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyRequest {
    target: String,
    host: String,
    port: u16,
}

impl ProxyRequest {
    /// Reads the target from the request line and the origin from the `Host`
    /// header, falling back to an absolute-form target.
    pub fn parse(request: &str) -> Option<Self> {
        let target = request_target(request)?.to_string();

        let authority = request
            .lines()
            .skip(1)
            .take_while(|line| !line.is_empty())
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.trim().eq_ignore_ascii_case("host").then(|| value.trim().to_string())
            })
            .or_else(|| {
                let without_scheme = target.strip_prefix("http://")?;
                without_scheme.split('/').next().map(str::to_string)
            })?;

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (host.to_string(), port.parse().ok()?),
            None => (authority, DEFAULT_HTTP_PORT),
        };

        if host.is_empty() {
            return None;
        }

        Some(Self { target, host, port })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

/// Rewrites the client request so the origin closes the connection after
/// responding.
pub fn forwarded_request(request: &str) -> String {
    let (head, body) = request.split_once("\r\n\r\n").unwrap_or((request, ""));

    let mut forwarded = String::with_capacity(request.len() + 19);
    for line in head.lines() {
        let header_name = line.split_once(':').map(|(name, _)| name.trim());
        if matches!(header_name, Some(name) if name.eq_ignore_ascii_case("connection") || name.eq_ignore_ascii_case("proxy-connection")) {
            continue;
        }
        forwarded.push_str(line);
        forwarded.push_str("\r\n");
    }

    forwarded.push_str("Connection: close\r\n\r\n");
    forwarded.push_str(body);
    forwarded
}

/// A caching forward proxy serving one loopback client at a time.
pub struct Proxy<C: ResponseCache> {
    listener: TcpListener,
    cache: C,
}

impl<C: ResponseCache> Proxy<C> {
    pub async fn bind(port: u16, cache: C) -> io::Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await?;
        Ok(Self { listener, cache })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(mut self) -> io::Result<()> {
        info!(addr = %self.local_addr()?, "proxy listening");

        loop {
            let (stream, peer_addr) = self.listener.accept().await?;
            debug!(%peer_addr, "connection accepted");

            if let Err(error) = self.handle_connection(stream).await {
                warn!(%peer_addr, %error, "unable to relay request");
            }
        }
    }

    async fn handle_connection(&mut self, mut stream: TcpStream) -> io::Result<()> {
        let mut buf = vec![0u8; MAX_REQUEST_LENGTH];
        let size = stream.read(&mut buf).await?;
        let request = String::from_utf8_lossy(&buf[..size]).into_owned();

        let response = match ProxyRequest::parse(&request) {
            None => http_response("400 Bad Request", b""),
            Some(proxy_request) => self.respond_to(&proxy_request, &request).await,
        };

        stream.write_all(&response).await?;
        stream.shutdown().await
    }

    async fn respond_to(&mut self, proxy_request: &ProxyRequest, request: &str) -> Vec<u8> {
        if let Some(response) = self.cache.get(proxy_request.target()).await {
            return response;
        }

        let response = match fetch_from_origin(proxy_request, request).await {
            Ok(response) => response,
            Err(error) => {
                warn!(host = %proxy_request.host(), port = proxy_request.port(), %error, "origin unreachable");
                return http_response("502 Bad Gateway", b"");
            }
        };

        info!(request_target = %proxy_request.target(), bytes = response.len(), "fetched from origin");
        if let Err(error) = self.cache.put(proxy_request.target(), response.clone()).await {
            warn!(%error, "unable to store response in cache");
        }

        response
    }
}

async fn fetch_from_origin(proxy_request: &ProxyRequest, request: &str) -> io::Result<Vec<u8>> {
    let mut origin = TcpStream::connect((proxy_request.host(), proxy_request.port())).await?;
    origin.write_all(forwarded_request(request).as_bytes()).await?;

    let mut response = Vec::new();
    origin.read_to_end(&mut response).await?;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_cache_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("netprobe-{name}-{}", std::process::id()))
    }

    #[test]
    fn parses_host_header() {
        let request = ProxyRequest::parse("GET /index.html HTTP/1.1\r\nHost: example.com:8080\r\n\r\n").unwrap();
        assert_eq!(request.target(), "/index.html");
        assert_eq!(request.host(), "example.com");
        assert_eq!(request.port(), 8080);
    }

    #[test]
    fn port_defaults_to_80() {
        let request = ProxyRequest::parse("GET / HTTP/1.1\r\nUser-Agent: t\r\nhost: example.com\r\n\r\n").unwrap();
        assert_eq!(request.host(), "example.com");
        assert_eq!(request.port(), 80);
    }

    #[test]
    fn absolute_target_without_host_header() {
        let request = ProxyRequest::parse("GET http://example.org:81/a HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(request.host(), "example.org");
        assert_eq!(request.port(), 81);
        assert_eq!(request.target(), "http://example.org:81/a");
    }

    #[test]
    fn rejects_request_without_origin() {
        assert!(ProxyRequest::parse("GET /a HTTP/1.1\r\n\r\n").is_none());
        assert!(ProxyRequest::parse("").is_none());
    }

    #[test]
    fn forwarded_request_closes_connection() {
        let forwarded = forwarded_request("GET / HTTP/1.1\r\nHost: a\r\nConnection: keep-alive\r\n\r\n");
        assert_eq!(forwarded, "GET / HTTP/1.1\r\nHost: a\r\nConnection: close\r\n\r\n");
    }

    #[tokio::test]
    async fn disk_slot_requires_matching_key() {
        let cache_dir = temp_cache_dir("slot");
        let mut cache = MemoryDiskCache::new(&cache_dir).await.unwrap();
        cache.put("/a", b"response a".to_vec()).await.unwrap();

        let fresh = MemoryDiskCache::new(&cache_dir).await.unwrap();
        assert_eq!(fresh.get("/a").await, Some(b"response a".to_vec()));
        assert_eq!(fresh.get("/b").await, None);

        cache.put("/b", b"response b".to_vec()).await.unwrap();
        assert_eq!(fresh.get("/a").await, None);
        assert_eq!(cache.get("/a").await, Some(b"response a".to_vec()));

        tokio::fs::remove_dir_all(&cache_dir).await.unwrap();
    }
}
