//! BLE sniffer capture dump
//!
//! Decodes captured sniffer frames and prints one JSON record per frame on
//! stdout. Logs go to stderr.

mod dump;
mod settings;

use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dump::Dumper;
use settings::{InputFormat, Settings};

#[derive(Parser, Debug)]
#[command(name = "btle-dump")]
#[command(about = "Decode BLE sniffer captures to JSON", version)]
struct Cli {
    /// Capture file, stdin when omitted or `-`
    input: Option<PathBuf>,

    /// JSON settings file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Input encoding
    #[arg(short = 'f', long, value_enum)]
    format: Option<InputFormat>,

    /// Board id for packets read from a SLIP stream
    #[arg(short = 'b', long)]
    board_id: Option<u8>,

    /// Pretty-print JSON records
    #[arg(short = 'p', long)]
    pretty: bool,

    /// Drop frames that fail to decode instead of reporting them
    #[arg(long)]
    skip_errors: bool,

    /// Log filter used when RUST_LOG is not set
    #[arg(long)]
    log_filter: Option<String>,
}

impl Cli {
    fn settings(&self) -> Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };

        if let Some(format) = self.format {
            settings.format = format;
        }
        if let Some(board_id) = self.board_id {
            settings.board_id = board_id;
        }
        if self.pretty {
            settings.pretty = true;
        }
        if self.skip_errors {
            settings.report_errors = false;
        }
        if let Some(filter) = &self.log_filter {
            settings.log_filter = filter.clone();
        }
        Ok(settings)
    }

    fn input_path(&self) -> Option<&PathBuf> {
        self.input.as_ref().filter(|path| path.as_os_str() != "-")
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.settings()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| settings.log_filter.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    tracing::info!("Decoding {:?} input", settings.format);

    let stdout = io::stdout();
    let mut dumper = Dumper::new(stdout.lock(), &settings);

    match (cli.input_path(), settings.format) {
        (Some(path), InputFormat::Hex) => {
            let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
            dump::dump_hex(BufReader::new(file), &mut dumper)?;
        }
        (Some(path), InputFormat::Slip) => {
            let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
            dump::dump_slip(file, settings.board_id, &mut dumper)?;
        }
        (None, InputFormat::Hex) => dump::dump_hex(io::stdin().lock(), &mut dumper)?,
        (None, InputFormat::Slip) => dump::dump_slip(io::stdin().lock(), settings.board_id, &mut dumper)?,
    }

    let summary = dumper.finish()?;
    tracing::info!(
        "Done: {} decoded, {} failed, {} responses, {} skipped",
        summary.decoded,
        summary.failed,
        summary.responses,
        summary.skipped
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from(["btle-dump", "-f", "slip", "-b", "2", "--skip-errors", "capture.bin"]);
        let settings = cli.settings().unwrap();
        assert_eq!(settings.format, InputFormat::Slip);
        assert_eq!(settings.board_id, 2);
        assert!(!settings.report_errors);
        assert_eq!(cli.input_path(), Some(&PathBuf::from("capture.bin")));
    }

    #[test]
    fn test_dash_means_stdin() {
        let cli = Cli::parse_from(["btle-dump", "-"]);
        assert_eq!(cli.input_path(), None);
        assert_eq!(cli.settings().unwrap(), Settings::default());
    }
}
