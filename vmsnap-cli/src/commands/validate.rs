// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `vmsnap validate` command - Validate configuration file.

use vmsnap_core::ConfigLoader;

pub async fn execute(file: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(file = %file, "Validating configuration");

    match ConfigLoader::load_file(file) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Snapshot Files:");
            println!(
                "  Backing File:   {}",
                config.snapshot.backing_file.display()
            );
            println!(
                "  Shared File:    {}",
                config.snapshot.shared_file.display()
            );
            println!();
            println!("Guest:");
            println!("  Memory:         {}", config.guest.memory);
            match config.guest.shared_address {
                Some(address) => println!("  Shared Page:    {}", address),
                None => println!("  Shared Page:    (not linked at startup)"),
            }
            println!();
            println!("Server:");
            println!(
                "  Socket:         {}",
                config.server.socket_path.display()
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
