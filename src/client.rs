use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use deskremote::protocol::CommandKind;

/// Fields whose base64 payload is summarised instead of printed.
const BULKY_FIELDS: [&str; 2] = ["image", "data"];

/// Sends each command line and prints the server's reply, if one is due.
pub async fn send_commands(ip: &str, port: u16, commands: &[String], wait: Duration) -> Result<()> {
    let addr = format!("{}:{}", ip, port);
    println!("Connecting to {}...", addr);
    let socket = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("failed to connect to {addr}"))?;
    socket.set_nodelay(true)?;
    println!("Connected.");

    let (reader, mut writer) = socket.into_split();
    let mut replies = BufReader::new(reader).lines();

    for command in commands {
        let request: Value = serde_json::from_str(command)
            .with_context(|| format!("not a JSON command: {command}"))?;
        let mut line = serde_json::to_vec(&request)?;
        line.push(b'\n');
        writer.write_all(&line).await?;

        if !expects_reply(&request) {
            println!("-> {} (no reply expected)", command_tag(&request));
            continue;
        }

        let reply = tokio::time::timeout(wait, replies.next_line())
            .await
            .map_err(|_| anyhow!("no reply within {}s", wait.as_secs()))??
            .ok_or_else(|| anyhow!("Connection closed by server"))?;
        let mut reply: Value = serde_json::from_str(&reply)?;
        summarise(&mut reply);
        println!("{}", serde_json::to_string_pretty(&reply)?);
    }
    Ok(())
}

fn command_tag(request: &Value) -> &str {
    request.get("type").and_then(Value::as_str).unwrap_or("?")
}

fn expects_reply(request: &Value) -> bool {
    CommandKind::from_tag(command_tag(request)).is_none_or(|kind| !kind.is_fire_and_forget())
}

fn summarise(reply: &mut Value) {
    let Some(fields) = reply.as_object_mut() else {
        return;
    };
    for key in BULKY_FIELDS {
        if let Some(Value::String(encoded)) = fields.get(key) {
            // base64 expands 3 bytes into 4 characters.
            let decoded = encoded.len() as u64 / 4 * 3;
            let summary = format!("<{} of base64>", format_size(decoded));
            fields.insert(key.to_string(), Value::String(summary));
        }
    }
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
