//! Redis probe
//!
//! One RESP round-trip over a raw TCP stream: optional `AUTH`, then `PING`.
//! The text protocol is simple enough that a client crate would be overkill
//! for a reachability check.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use super::{FieldSchema, ProbeConfigError, ProbeOutcome, ProbeSpec, Prober};

pub struct RedisProber;

impl RedisProber {
    async fn command(reader: &mut BufReader<TcpStream>, command: &str) -> std::io::Result<String> {
        reader.get_mut().write_all(command.as_bytes()).await?;
        let mut line = String::new();
        reader.read_line(&mut line).await?;
        Ok(line.trim_end().to_string())
    }
}

#[async_trait]
impl Prober for RedisProber {
    fn kind(&self) -> &'static str {
        "redis"
    }

    fn validate(&self, spec: &ProbeSpec) -> Result<(), ProbeConfigError> {
        if !spec.has_config("host") {
            return Err(ProbeConfigError::missing("host"));
        }
        Ok(())
    }

    async fn probe(&self, spec: &ProbeSpec) -> ProbeOutcome {
        let start = Instant::now();

        let host = spec.str_config("host", "localhost");
        let port = spec.int_config("port", 6379);
        let password = spec.str_config("password", "");
        let addr = format!("{host}:{port}");

        let check = async {
            let stream = TcpStream::connect(&addr).await?;
            let mut reader = BufReader::new(stream);

            if !password.is_empty() {
                let reply = Self::command(&mut reader, &format!("AUTH {password}\r\n")).await?;
                if !reply.starts_with("+OK") {
                    return Ok::<_, std::io::Error>(Err(format!("AUTH rejected: {reply}")));
                }
            }

            let reply = Self::command(&mut reader, "PING\r\n").await?;
            if reply.starts_with("+PONG") {
                Ok(Ok(()))
            } else {
                Ok(Err(format!("unexpected PING reply: {reply}")))
            }
        };

        let result = tokio::time::timeout(spec.timeout, check).await;
        let latency = start.elapsed();

        match result {
            Ok(Ok(Ok(()))) => {
                let mut metrics = serde_json::Map::new();
                metrics.insert("addr".into(), Value::from(addr.clone()));
                let mut outcome = ProbeOutcome::success(format!("Redis PONG from {addr}"), latency);
                outcome.metrics = Some(metrics);
                outcome
            }
            Ok(Ok(Err(message))) => ProbeOutcome::failure(message, latency),
            Ok(Err(e)) => ProbeOutcome::failure(format!("connection failed: {e}"), latency),
            Err(_) => ProbeOutcome::failure(
                format!("probe timed out after {:?}", spec.timeout),
                latency,
            ),
        }
    }

    fn config_schema(&self) -> HashMap<&'static str, FieldSchema> {
        HashMap::from([
            ("host", FieldSchema::string("Host", true).placeholder("localhost")),
            ("port", FieldSchema::number("Port", false, 6379)),
            ("password", FieldSchema::password("Password", false)),
        ])
    }
}
