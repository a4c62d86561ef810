// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `vmsnap send` command - Send one command to a running server.

use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use vmsnap_core::ConfigLoader;

pub async fn execute(
    config_path: &str,
    socket: Option<&str>,
    request: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let socket_path = match socket {
        Some(path) => PathBuf::from(path),
        None => ConfigLoader::load_file(config_path)?.server.socket_path,
    };

    let line = request.join(" ");
    tracing::debug!(socket = %socket_path.display(), request = %line, "Sending command");

    let stream = UnixStream::connect(&socket_path).await.map_err(|e| {
        format!(
            "cannot connect to {} (is `vmsnap serve` running?): {}",
            socket_path.display(),
            e
        )
    })?;

    let (reader, mut writer) = stream.into_split();
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.shutdown().await?;

    let reply = BufReader::new(reader)
        .lines()
        .next_line()
        .await?
        .ok_or("server closed the connection without replying")?;

    println!("{}", reply);

    if reply.starts_with("err") {
        std::process::exit(1);
    }

    Ok(())
}
