//! Kiwix native build
//!
//! Cross-compiles liblzma, libicu, libzim and libkiwix for each target
//! architecture, then packages the APK. With no step flags every step runs.

use anyhow::Result;
use clap::error::ErrorKind;
use clap::{Args, Parser};
use kiwix_android::gradle;
use kiwix_android::native::{NativeBuild, NativeStage, Progress};
use kiwix_android::BuildConfig;
use kiwix_cli::output::{format_duration, Status};
use kiwix_core::config::Config;
use kiwix_core::env_overlay::EnvStack;
use kiwix_core::error::exit_codes;
use kiwix_core::pipeline::{describe_plan, Selection, Stage};
use kiwix_core::process::SystemRunner;
use kiwix_telemetry::TelemetryConfig;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "kiwix-native")]
#[command(about = "Build the native libraries and the APK of Kiwix Android")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    steps: Steps,

    /// Only build for ARCH (armeabi, mips, x86); may be repeated
    #[arg(long = "on", value_name = "ARCH")]
    on: Vec<String>,

    /// Android project directory
    #[arg(long, default_value = ".")]
    project_dir: PathBuf,

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
    /// Creates the toolchain
    #[arg(long)]
    toolchain: bool,
    /// Compile liblzma
    #[arg(long)]
    lzma: bool,
    /// Compile libicu
    #[arg(long)]
    icu: bool,
    /// Compile libzim
    #[arg(long)]
    zim: bool,
    /// Compile libkiwix
    #[arg(long)]
    kiwix: bool,
    /// Strip libkiwix.so
    #[arg(long)]
    strip: bool,
    /// Create the locales.txt file
    #[arg(long)]
    locales: bool,
    /// Create an APK file
    #[arg(long)]
    apk: bool,
    /// Remove build folder (except apk files)
    #[arg(long)]
    clean: bool,
}

impl Steps {
    fn selected(&self) -> Vec<NativeStage> {
        [
            (self.toolchain, NativeStage::Toolchain),
            (self.lzma, NativeStage::Lzma),
            (self.icu, NativeStage::Icu),
            (self.zim, NativeStage::Zim),
            (self.kiwix, NativeStage::Kiwix),
            (self.strip, NativeStage::Strip),
            (self.locales, NativeStage::Locales),
            (self.apk, NativeStage::Apk),
            (self.clean, NativeStage::Clean),
        ]
        .into_iter()
        .filter_map(|(on, stage)| on.then_some(stage))
        .collect()
    }
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

fn main() {
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

    let exit_code = match run(&cli) {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            Status::error(&format!("{:#}", e));
            exit_codes::FAILURE
        }
    };
    std::process::exit(exit_code);
}

fn run(cli: &Cli) -> Result<()> {
    let selection = Selection::from_stages(&cli.steps.selected());
    if cli.plan {
        for line in describe_plan(&selection) {
            println!("{}", line);
        }
        return Ok(());
    }

    let config = Config::load(cli.config.as_deref())?;
    let env = EnvStack::capture();
    let build_config = BuildConfig::resolve(&cli.project_dir, &config.schema.native, &env, &cli.on)?;
    let runner = SystemRunner::streaming();
    let started = Instant::now();

    let quiet = cli.quiet;
    let mut build = NativeBuild::new(&build_config, &runner, env);
    build.run(&selection, |progress| {
        if quiet {
            return;
        }
        match progress {
            Progress::HostIcu => Status::header("host ICU"),
            Progress::Arch(arch) => Status::header(&format!("architecture {}", arch.short_name())),
            Progress::Project => Status::header("project"),
            Progress::Stage {
                index,
                total,
                stage,
            } => Status::step(index, total, stage.description()),
        }
    })?;

    let outputs = gradle::list_outputs(&build_config.project_dir, &build_config.package)?;
    if outputs.is_empty() {
        Status::warning(&format!("No APK found for {}", build_config.package));
    }
    for (path, size) in outputs {
        Status::artifact(&path, size);
    }
    if !quiet {
        Status::success(&format!("Done in {}", format_duration(started.elapsed())));
    }
    Ok(())
}
