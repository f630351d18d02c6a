use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};
use vodgrab_engine::{HlsDownloader, PipelineOutcome};

mod cli;
mod config;
mod error;
mod logging;
mod progress;

use cli::CliArgs;
use config::ProgramConfig;
use error::AppError;
use progress::DownloadProgress;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Some segments could not be downloaded; nothing was merged.
const EXIT_PARTIAL_FAILURE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    // Using parse() instead of try_parse() to let clap handle --help and --version
    let args = CliArgs::parse();

    // Held until main returns so the file log is flushed.
    let _log_guard = match logging::init_logging(&args.log_dir, args.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    print_banner();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Download failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn print_banner() {
    println!("==================================================================");
    println!(" vodgrab {} - HLS video-on-demand downloader", env!("CARGO_PKG_VERSION"));
    println!("==================================================================");
}

async fn run(args: CliArgs) -> Result<ExitCode, AppError> {
    let config = ProgramConfig::from_args(&args)?;

    let mut downloader = HlsDownloader::new(config.hls_config, &config.merge_config)?;
    info!(url = %config.url, "Starting download");
    info!(
        "Proxy: {}",
        if downloader.proxy_enabled() { "enabled" } else { "disabled" }
    );

    let progress = if config.show_progress {
        DownloadProgress::new(true)
    } else {
        DownloadProgress::disabled()
    };
    if let Some(handler) = progress.event_handler() {
        downloader = downloader.with_event_handler(handler);
    }

    let outcome = downloader
        .download(&config.url, &config.segments_dir, &config.output)
        .await;

    match outcome {
        Ok(PipelineOutcome::Completed { output, segments }) => {
            progress.finish("Download complete");
            info!(segments, "All segments downloaded and merged");
            println!("Video merged successfully to: {}", output.display());
            Ok(ExitCode::SUCCESS)
        }
        Ok(PipelineOutcome::PartialFailure { report }) => {
            progress.finish("Download incomplete");
            warn!(
                failed = report.failed.len(),
                total = report.total,
                "Some segments failed to download, skipping merge"
            );
            for (ordinal, reason) in &report.failed {
                error!(ordinal, "Segment failed: {reason}");
            }
            eprintln!(
                "{} of {} segments failed to download (ordinals {:?}); segments kept in {}",
                report.failed.len(),
                report.total,
                report.failed_ordinals(),
                config.segments_dir.display()
            );
            Ok(ExitCode::from(EXIT_PARTIAL_FAILURE))
        }
        Err(e) => {
            progress.finish("Download failed");
            Err(e.into())
        }
    }
}
