//! Kiwix custom app generator
//!
//! Copies the Kiwix Android project into a work tree, rebrands it from a
//! JSON descriptor and builds the APKs. Descriptor fields can be replaced
//! with `--override-<field>=<value>`.

use anyhow::Result;
use clap::error::ErrorKind;
use clap::{Args, Parser};
use kiwix_cli::output::{format_duration, Status};
use kiwix_core::config::Config;
use kiwix_core::env_overlay::EnvStack;
use kiwix_core::error::exit_codes;
use kiwix_core::pipeline::{describe_plan, Selection, Stage};
use kiwix_core::process::SystemRunner;
use kiwix_custom::descriptor::Override;
use kiwix_custom::stages;
use kiwix_custom::{App, ContentFetcher, CustomBuild, CustomStage, WorkTree};
use kiwix_telemetry::TelemetryConfig;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Connection timeout for remote descriptors and content
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "kiwix-custom-app")]
#[command(about = "Generate a custom Kiwix Android app from a JSON descriptor")]
#[command(after_help = "Descriptor fields can be overridden with --override-<field>=<value>")]
#[command(version)]
struct Cli {
    /// Descriptor path or URL
    json: String,

    #[command(flatten)]
    steps: Steps,

    /// Only build native code for ARCH (armeabi, mips, x86); may be repeated
    #[arg(long = "on", value_name = "ARCH")]
    on: Vec<String>,

    /// Kiwix Android project used as template
    #[arg(long, default_value = ".")]
    template_dir: PathBuf,

    /// Reuse this work tree instead of creating a new one
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the steps that would run and exit
    #[arg(long)]
    plan: bool,

    /// Increase output verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    quiet: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

#[derive(Args)]
struct Steps {
    /// Copy the template into the work tree
    #[arg(long)]
    setup: bool,
    /// Generate launcher icons
    #[arg(long)]
    icons: bool,
    /// Rename the app in branding strings
    #[arg(long)]
    branding: bool,
    /// Write Constants.java from the descriptor
    #[arg(long)]
    constants: bool,
    /// Hide the open-file menu entry
    #[arg(long)]
    menu: bool,
    /// Point custom views at the new package
    #[arg(long)]
    xmlnodes: bool,
    /// Rewrite the manifest and rename the package
    #[arg(long)]
    manifest: bool,
    /// Build the native libraries
    #[arg(long)]
    native: bool,
    /// Embed the content into the APK
    #[arg(long)]
    embed: bool,
    /// Enable the embedded content in build.gradle
    #[arg(long)]
    gradle: bool,
    /// Build the APKs
    #[arg(long)]
    build: bool,
    /// Move the APKs next to the template
    #[arg(long = "move")]
    move_apks: bool,
    /// List the generated APKs
    #[arg(long)]
    list: bool,
    /// Remove the work tree
    #[arg(long)]
    clean: bool,
}

impl Steps {
    fn selected(&self) -> Vec<CustomStage> {
        [
            (self.setup, CustomStage::Setup),
            (self.icons, CustomStage::Icons),
            (self.branding, CustomStage::Branding),
            (self.constants, CustomStage::Constants),
            (self.menu, CustomStage::Menu),
            (self.xmlnodes, CustomStage::XmlNodes),
            (self.manifest, CustomStage::Manifest),
            (self.native, CustomStage::Native),
            (self.embed, CustomStage::Embed),
            (self.gradle, CustomStage::Gradle),
            (self.build, CustomStage::Build),
            (self.move_apks, CustomStage::Move),
            (self.list, CustomStage::List),
            (self.clean, CustomStage::Clean),
        ]
        .into_iter()
        .filter_map(|(on, stage)| on.then_some(stage))
        .collect()
    }
}

fn fail(message: &str) -> ! {
    Status::error(message);
    std::process::exit(exit_codes::FAILURE);
}

/// Split overrides from the arguments clap sees
fn parse_args() -> (Cli, Vec<Override>) {
    let (overrides, args) = match Override::extract(std::env::args()) {
        Ok(split) => split,
        Err(e) => fail(&e.to_string()),
    };
    match Cli::try_parse_from(args) {
        Ok(cli) => (cli, overrides),
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
    let (cli, overrides) = parse_args();

    if cli.no_color {
        owo_colors::set_override(false);
    }
    if let Err(e) = kiwix_telemetry::init_with_config(TelemetryConfig::from_verbosity(
        cli.verbose,
        cli.quiet,
    )) {
        eprintln!("{}", e);
    }

    let exit_code = match run(&cli, &overrides).await {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            Status::error(&format!("{:#}", e));
            exit_codes::FAILURE
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: &Cli, overrides: &[Override]) -> Result<()> {
    let selection = Selection::from_stages(&cli.steps.selected());
    if cli.plan {
        for line in describe_plan(&selection) {
            println!("{}", line);
        }
        return Ok(());
    }

    let config = Config::load(cli.config.as_deref())?;
    let template_dir = std::path::absolute(&cli.template_dir)?;
    let mut fetcher = ContentFetcher::new(CONNECT_TIMEOUT)?;
    if cli.quiet {
        fetcher = fetcher.quiet();
    }

    let app = App::load(&cli.json, overrides, &template_dir, &fetcher).await?;
    Status::info(&format!(
        "{} ({}) version {} [{}]",
        app.app_name, app.package, app.version_name, app.version_code
    ));

    let mut tree = match &cli.work_dir {
        Some(dir) => WorkTree::at(dir)?,
        None => WorkTree::reserve(&template_dir)?,
    };
    tree.set_disposable(selection.is_enabled(CustomStage::Clean));

    let env = EnvStack::capture();
    let runner = SystemRunner::streaming();
    let ctx = CustomBuild {
        app: &app,
        template_dir: &template_dir,
        work_dir: tree.path(),
        settings: &config.schema.custom,
        native: &config.schema.native,
        env: &env,
        archs: &cli.on,
        runner: &runner,
    };

    let quiet = cli.quiet;
    let started = Instant::now();
    let report = stages::run(&ctx, &selection, |index, total, stage| {
        if !quiet {
            Status::step(index, total, stage.description());
        }
    });
    if !tree.is_disposable() {
        Status::info(&format!("Work tree kept at {}", tree.path().display()));
    }
    report?;
    if !quiet {
        Status::success(&format!(
            "{} generated in {}",
            app.package,
            format_duration(started.elapsed())
        ));
    }
    Ok(())
}
