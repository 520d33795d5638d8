//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use axum::Router;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use carto_service::config::ServiceConfig;
use carto_service::http::HttpServer;
use carto_service::lifecycle::Shutdown;
use carto_service::observability::{LogFormat, Logger};

/// Config for a server on `port` that logs JSON lines into `log_dir` only.
pub fn test_config(port: u16, log_dir: &Path) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.listener.bind_address = format!("127.0.0.1:{port}");
    config.logging.dir = log_dir.to_path_buf();
    config.logging.console.enabled = false;
    config.logging.file.format = LogFormat::Json;
    config.logging.compress = false;
    config
}

pub struct RunningServer {
    pub base: String,
    pub logger: Logger,
    shutdown: Shutdown,
    handle: JoinHandle<Result<(), std::io::Error>>,
}

impl RunningServer {
    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = tokio::time::timeout(Duration::from_secs(5), self.handle).await;
        self.logger.flush();
    }
}

/// Bind and serve `config` with `routes` mounted under the prefix.
pub async fn spawn_server(config: ServiceConfig, routes: Router) -> RunningServer {
    let logger = Logger::from_config(&config.logging, config.environment.production).unwrap();
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::builder(config)
        .logger(logger.clone())
        .routes(routes)
        .build();
    let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));

    RunningServer {
        base: format!("http://{addr}"),
        logger,
        shutdown,
        handle,
    }
}

/// One RESP command as its bulk-string arguments.
async fn read_command<R: AsyncBufRead + Unpin>(reader: &mut R) -> Option<Vec<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line).await.ok()? == 0 {
        return None;
    }
    let count: usize = line.trim_end().strip_prefix('*')?.parse().ok()?;

    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        reader.read_line(&mut line).await.ok()?;
        let len: usize = line.trim_end().strip_prefix('$')?.parse().ok()?;
        let mut buf = vec![0u8; len + 2];
        reader.read_exact(&mut buf).await.ok()?;
        buf.truncate(len);
        args.push(String::from_utf8_lossy(&buf).into_owned());
    }
    Some(args)
}

/// Answers `+PONG` to PING and `+OK` to anything else, one reply per command.
pub async fn start_mock_redis(addr: SocketAddr) {
    let listener = TcpListener::bind(addr).await.unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (read, mut write) = socket.into_split();
                let mut reader = BufReader::new(read);
                while let Some(args) = read_command(&mut reader).await {
                    let ping = args.first().is_some_and(|c| c.eq_ignore_ascii_case("PING"));
                    let reply: &[u8] = if ping { b"+PONG\r\n" } else { b"+OK\r\n" };
                    if write.write_all(reply).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
}

/// Accepts connections and never answers.
pub async fn start_hung_listener(addr: SocketAddr) {
    let listener = TcpListener::bind(addr).await.unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
}

/// Parse every JSON line of a log file. Missing file = no lines.
pub fn read_log(path: &Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect()
}

/// Lines whose context carries `correlation_id`.
pub fn lines_for(lines: &[Value], correlation_id: &str) -> Vec<Value> {
    lines
        .iter()
        .filter(|line| line["correlationId"] == correlation_id)
        .cloned()
        .collect()
}
