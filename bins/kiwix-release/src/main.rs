//! Kiwix release tools
//!
//! Uploads custom apps and their store listings to the Play publishing API,
//! and waits for CI test runs to finish.

use anyhow::Result;
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use kiwix_cli::output::{format_size, Status};
use kiwix_cli::progress;
use kiwix_core::config::Config;
use kiwix_core::error::exit_codes;
use kiwix_custom::{read_descriptor, ContentFetcher};
use kiwix_publisher::publish::PLAY_STORE;
use kiwix_publisher::{
    await_run, publish_release, update_listing, ClientConfig, HttpRunSource, PlayClient,
    PollSettings, Release, StoreTarget,
};
use kiwix_telemetry::TelemetryConfig;
use serde_json::Map;
use std::path::PathBuf;
use std::time::Duration;

/// Connection timeout for remote descriptors and content
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "kiwix-release")]
#[command(about = "Publish Kiwix custom apps and wait for CI test runs")]
#[command(version)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase output verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload the APK and its content in a single edit
    Upload {
        /// Descriptor path or URL
        json: String,
        /// Store and track, e.g. play_store:beta
        #[arg(long, value_name = "STORE[:TRACK]")]
        store: Option<String>,
        /// APK to upload instead of build/outputs/apk/<package>-<version_name>.apk
        #[arg(long)]
        apk: Option<PathBuf>,
        /// Project directory holding build/outputs/apk
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,
    },

    /// Update the store listing from the descriptor's play_store section
    Listing {
        /// Descriptor path or URL
        json: String,
    },

    /// Wait for a CI test run to finish
    #[command(name = "await-tests")]
    AwaitTests {
        /// Results endpoint returning the run state and success ratio
        #[arg(long)]
        url: String,
        /// Seconds between polls
        #[arg(long)]
        interval: Option<u64>,
        /// Polls before giving up
        #[arg(long)]
        max_attempts: Option<u32>,
    },
}

fn parse_args() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => exit_codes::SUCCESS,
                _ => exit_codes::FAILURE,
            };
            let _ = e.print();
            std::process::exit(code);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = parse_args();

    if cli.no_color {
        owo_colors::set_override(false);
    }
    if let Err(e) = kiwix_telemetry::init_with_config(TelemetryConfig::from_verbosity(
        cli.verbose,
        cli.quiet,
    )) {
        eprintln!("{}", e);
    }

    let exit_code = match run(&cli).await {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            Status::error(&format!("{:#}", e));
            exit_codes::FAILURE
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: &Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    let mut fetcher = ContentFetcher::new(CONNECT_TIMEOUT)?;
    if cli.quiet {
        fetcher = fetcher.quiet();
    }

    match &cli.command {
        Commands::Upload {
            json,
            store,
            apk,
            project_dir,
        } => {
            let target = StoreTarget::parse(store.as_deref().unwrap_or(PLAY_STORE))?;
            let track = target.track_or(&config.schema.publish.default_track);
            let client = PlayClient::with_config(ClientConfig::from_env(&config.schema.publish)?)?;
            let (descriptor, base_dir) = read_descriptor(json, Map::new(), &fetcher).await?;
            let release = Release::from_descriptor(
                &descriptor,
                &base_dir,
                project_dir,
                apk.clone(),
                track,
                &fetcher,
            )
            .await?;
            Status::info(&format!(
                "Uploading {} to {}:{}",
                release.package, target.store, release.track
            ));

            let published = publish_release(&client, &release).await?;
            if let Some(size) = published.companion_size {
                Status::info(&format!("Expansion file: {}", format_size(size)));
            }
            Status::success(&format!(
                "Version {} released on {} (edit {})",
                published.version_code, release.track, published.edit
            ));
        }

        Commands::Listing { json } => {
            let (descriptor, base_dir) = read_descriptor(json, Map::new(), &fetcher).await?;
            let client = PlayClient::with_config(ClientConfig::from_env(&config.schema.publish)?)?;
            let update = update_listing(&client, &descriptor, &base_dir, &fetcher).await?;
            Status::success(&format!(
                "Store listing updated: {} language(s), {} image(s)",
                update.languages, update.images
            ));
        }

        Commands::AwaitTests {
            url,
            interval,
            max_attempts,
        } => {
            let mut settings = PollSettings::from(&config.schema.poll);
            if let Some(secs) = interval {
                settings.interval = Duration::from_secs(*secs);
            }
            if let Some(attempts) = max_attempts {
                settings.max_attempts = *attempts;
            }
            let timeout = Duration::from_secs(config.schema.publish.timeout_secs);
            let source = HttpRunSource::new(url.as_str(), timeout)?;

            let spinner = (!cli.quiet).then(|| progress::spinner("Waiting for the test run"));
            let outcome = await_run(&source, settings).await;
            if let Some(spinner) = &spinner {
                match &outcome {
                    Ok(_) => progress::finish_success(spinner, "Test run finished"),
                    Err(_) => progress::finish_error(spinner, "Test run failed"),
                }
            }
            let status = outcome?;
            Status::success(&format!(
                "All tests passed (success ratio {})",
                status.success_ratio.unwrap_or(1.0)
            ));
        }
    }
    Ok(())
}
