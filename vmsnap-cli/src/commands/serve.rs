// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `vmsnap serve` command - Run the command server.
//!
//! Allocates a guest of the configured size and accepts one command per
//! line on a Unix socket. Every reply is a single line: `ok <outcome>`,
//! `err <message>`, or the stats JSON.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

use vmsnap_core::{
    Command, ConfigLoader, GuestMemory, NullState, SnapshotController, SnapshotService,
};

type Service = SnapshotService<NullState>;

pub async fn execute(config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(config = %config_path, "Starting snapshot server");

    // Fail fast on invalid config before any memory is mapped
    let config = ConfigLoader::load_file(config_path)?;

    let guest = GuestMemory::allocate(config.guest.memory)?;
    let mut controller = SnapshotController::new(guest, config.snapshot.clone(), NullState);

    if let Some(address) = config.guest.shared_address {
        controller.link_shared(address.value())?;
    }

    let service = SnapshotService::new(controller);

    let socket_path = config.server.socket_path.clone();
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)?;
    }
    let listener = UnixListener::bind(&socket_path)?;

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                    VMSNAP SNAPSHOT SERVER                    ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    println!("  Guest Memory:   {}", config.guest.memory);
    println!("  Backing File:   {}", config.snapshot.backing_file.display());
    println!("  Shared File:    {}", config.snapshot.shared_file.display());
    println!("  Socket:         {}", socket_path.display());
    println!();
    println!("Press Ctrl+C to stop...");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let service = service.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, service).await {
                            tracing::warn!(error = %e, "Client connection failed");
                        }
                    });
                }
                Err(e) => tracing::warn!(error = %e, "Failed to accept connection"),
            },
            result = &mut shutdown => {
                result?;
                break;
            }
        }
    }

    println!();
    println!("Shutting down...");
    tracing::info!("Shutting down snapshot server");

    let _ = std::fs::remove_file(&socket_path);
    Ok(())
}

async fn handle_connection(stream: UnixStream, service: Service) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let reply = respond(&service, line.trim()).await;
        writer.write_all(reply.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }

    Ok(())
}

/// Produce the one-line reply for one request line.
async fn respond(service: &Service, line: &str) -> String {
    let svc = service.clone();

    if line.eq_ignore_ascii_case("stats") {
        return match tokio::task::spawn_blocking(move || svc.stats()).await {
            Ok(Ok(stats)) => stats
                .to_json()
                .unwrap_or_else(|e| format!("err {}", e)),
            Ok(Err(e)) => format!("err {}", e),
            Err(e) => format!("err {}", e),
        };
    }

    let command: Command = match line.parse() {
        Ok(command) => command,
        Err(e) => return format!("err {}", e),
    };

    // Remapping guest memory blocks; keep it off the async workers
    match tokio::task::spawn_blocking(move || svc.execute(command)).await {
        Ok(Ok(outcome)) => format!("ok {}", outcome),
        Ok(Err(e)) => {
            tracing::warn!(command = %command, kind = ?e.kind(), error = %e, "Command failed");
            format!("err {}", e)
        }
        Err(e) => format!("err {}", e),
    }
}
