use crate::config::Settings;
use crate::download::http_client;
use crate::error::Error;
use crate::installer;
use crate::vault::VaultContext;
use anyhow::{bail, Result};
use indicatif::{ProgressBar, ProgressStyle};

pub fn run_install(vault: &VaultContext, settings: &Settings) -> Result<()> {
    let client = http_client()?;
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template("{spinner} {msg} [{bar:30}] {bytes}/{total_bytes} ({percent}%)")?
            .progress_chars("=> "),
    );
    pb.set_message("Downloading mcp-server");

    let result = installer::install(vault, settings, &client, |p| {
        if p.total_bytes > 0 && pb.length() != Some(p.total_bytes) {
            pb.set_length(p.total_bytes);
        }
        pb.set_position(p.bytes_received);
    });

    match result {
        Ok(report) => {
            pb.finish_with_message(format!("Downloaded {} bytes", report.bytes));
            println!(
                "Installed {} from {}",
                report.install_path.executable_path.display(),
                report.url
            );
            if let Some(from) = &report.install_path.symlinked_from {
                println!("  (resolved from {})", from.display());
            }
            println!("Updated host config {}", report.config_path.display());
            println!("Restart the desktop host to load the server.");
            Ok(())
        }
        Err(e) => {
            pb.abandon_with_message("install FAILED");
            bail!("{e}\n{}", next_step(&e))
        }
    }
}

pub fn next_step(e: &Error) -> &'static str {
    match e {
        Error::NoApiKey => "Next: enable the Local REST API plugin in Obsidian, or pass --api-key.",
        Error::DirectoryNotWritable(_) | Error::CreateDirectory { .. } | Error::Fs { .. } => {
            "Next: check permissions on the vault's .obsidian directory, then reinstall."
        }
        Error::MalformedConfig { .. } => {
            "Next: fix the JSON in the host config file by hand; it was left unchanged."
        }
        Error::MalformedVersion { .. } => "Next: reinstall the mcp-tools plugin so its manifest has a valid version.",
        _ => "Next: check your network connection and reinstall.",
    }
}
