//! Native dependency pipeline
//!
//! For each selected architecture: materialize the standalone toolchain,
//! overlay the compiler environment, build liblzma, libicu and libzim, link
//! `libkiwix.so` and strip it. Architectures run one after the other, each
//! under its own environment scope. Project-wide stages (locale list, APK,
//! cleanup) run once afterwards.

use crate::arch::Arch;
use crate::config::{BuildConfig, LIBZIM_SOURCES};
use crate::gradle;
use crate::toolchain::{self, include_flags, platform_includes};
use kiwix_core::env_overlay::{EnvOverlay, EnvStack};
use kiwix_core::error::{Error, Result};
use kiwix_core::pipeline::{Effect, Pipeline, RunReport, Selection, Stage, Step};
use kiwix_core::process::{local_program, Invocation, Runner};
use kiwix_core::tree::{link_into, remove_path};
use kiwix_telemetry::Timer;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, info_span};

/// Stages of the native pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeStage {
    Toolchain,
    Lzma,
    Icu,
    Zim,
    Kiwix,
    Strip,
    Locales,
    Apk,
    Clean,
}

impl Stage for NativeStage {
    const ORDER: &'static [Self] = &[
        NativeStage::Toolchain,
        NativeStage::Lzma,
        NativeStage::Icu,
        NativeStage::Zim,
        NativeStage::Kiwix,
        NativeStage::Strip,
        NativeStage::Locales,
        NativeStage::Apk,
        NativeStage::Clean,
    ];

    fn name(self) -> &'static str {
        match self {
            NativeStage::Toolchain => "toolchain",
            NativeStage::Lzma => "lzma",
            NativeStage::Icu => "icu",
            NativeStage::Zim => "zim",
            NativeStage::Kiwix => "kiwix",
            NativeStage::Strip => "strip",
            NativeStage::Locales => "locales",
            NativeStage::Apk => "apk",
            NativeStage::Clean => "clean",
        }
    }

    fn description(self) -> &'static str {
        match self {
            NativeStage::Toolchain => "Creates the toolchain",
            NativeStage::Lzma => "Compile liblzma",
            NativeStage::Icu => "Compile libicu",
            NativeStage::Zim => "Compile libzim",
            NativeStage::Kiwix => "Compile libkiwix",
            NativeStage::Strip => "Strip libkiwix.so",
            NativeStage::Locales => "Create the locales.txt file",
            NativeStage::Apk => "Create an APK file",
            NativeStage::Clean => "Remove build folder (except apk files)",
        }
    }

    fn depends_on(self) -> &'static [Self] {
        use NativeStage::*;
        match self {
            Lzma => &[Toolchain],
            Icu => &[Toolchain],
            Zim => &[Toolchain, Lzma],
            Kiwix => &[Toolchain, Lzma, Icu, Zim],
            Strip => &[Toolchain, Kiwix],
            Apk => &[Kiwix],
            Toolchain | Locales | Clean => &[],
        }
    }

    fn effects(self) -> &'static [Effect] {
        use NativeStage::*;
        match self {
            Toolchain | Lzma | Icu | Zim | Kiwix => &[Effect::RunsTools, Effect::WritesFiles],
            Strip => &[Effect::RunsTools],
            Locales => &[Effect::WritesFiles],
            Apk => &[Effect::RunsTools, Effect::WritesFiles, Effect::MovesFiles],
            Clean => &[Effect::MovesFiles],
        }
    }
}

/// Progress notifications emitted while the pipeline runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Building the host ICU tools used by the cross build
    HostIcu,
    /// Starting the stages of one architecture
    Arch(Arch),
    /// Starting project-wide stages
    Project,
    Stage {
        index: usize,
        total: usize,
        stage: NativeStage,
    },
}

/// Context of the stages running for one architecture
pub struct ArchBuild<'a> {
    pub config: &'a BuildConfig,
    pub arch: Arch,
    /// Effective overrides of the architecture's environment scope
    pub env: EnvOverlay,
    pub runner: &'a dyn Runner,
}

impl ArchBuild<'_> {
    fn platform(&self) -> PathBuf {
        self.config.platform_dir(self.arch)
    }

    fn platform_lib(&self, name: &str) -> PathBuf {
        self.platform().join("lib").join(name)
    }

    fn gcc_lib_dir(&self) -> PathBuf {
        self.platform()
            .join("lib")
            .join("gcc")
            .join(self.arch.full_name())
            .join(&self.config.compiler_version)
    }

    fn libkiwix(&self) -> PathBuf {
        self.config.libs_dir(self.arch).join("libkiwix.so")
    }

    /// Invocation in `dir` under the architecture's environment
    fn command(&self, program: impl Into<String>, dir: &Path) -> Invocation {
        Invocation::new(program).current_dir(dir).envs(&self.env)
    }

    fn run(&self, invocation: Invocation) -> Result<()> {
        self.runner.run_logged(&invocation)?;
        Ok(())
    }

    fn require(&self, stage: NativeStage, path: &Path) -> Result<()> {
        if path.exists() {
            Ok(())
        } else {
            Err(Error::artifact_missing(stage.name(), path)
                .with_context(format!("architecture {}", self.arch)))
        }
    }
}

/// Context of the project-wide stages
pub struct ProjectBuild<'a> {
    pub config: &'a BuildConfig,
    pub runner: &'a dyn Runner,
}

fn make_toolchain(ctx: &ArchBuild<'_>) -> Result<()> {
    ctx.run(toolchain::toolchain_invocation(ctx.config, ctx.arch))?;
    let platform = ctx.platform();
    let libexec = platform.join("libexec");
    if libexec.exists() {
        // gcc looks for liblto_plugin.so under the target directory
        link_into(&libexec, &platform.join(ctx.arch.full_name()))?;
    }
    Ok(())
}

fn verify_toolchain(ctx: &ArchBuild<'_>) -> Result<()> {
    for artifact in toolchain::toolchain_artifacts(ctx.config, ctx.arch) {
        ctx.require(NativeStage::Toolchain, &artifact)?;
    }
    Ok(())
}

fn make_lzma(ctx: &ArchBuild<'_>) -> Result<()> {
    let src = &ctx.config.sources.lzma;
    ctx.run(
        ctx.command(local_program(src, "./configure"), src)
            .arg(format!("--host={}", ctx.arch.full_name()))
            .arg(format!("--prefix={}", ctx.platform().display()))
            .args([
                "--disable-assembler",
                "--enable-shared",
                "--enable-static",
                "--enable-largefile",
            ]),
    )?;
    let targets: [&[&str]; 4] = [&["clean"], &[], &["install"], &["clean"]];
    for target in targets {
        ctx.run(ctx.command("make", src).args(target.iter().copied()))?;
    }
    Ok(())
}

fn verify_lzma(ctx: &ArchBuild<'_>) -> Result<()> {
    ctx.require(NativeStage::Lzma, &ctx.platform_lib("liblzma.a"))
}

fn make_icu(ctx: &ArchBuild<'_>) -> Result<()> {
    let (host, target) = ctx.config.icu_build_dirs();
    fs::create_dir_all(&target)?;
    let configure = ctx.config.sources.icu.join("configure");
    ctx.run(
        ctx.command(configure.to_string_lossy(), &target)
            .arg(format!("--host={}", ctx.arch.full_name()))
            .arg("--enable-static")
            .arg(format!("--prefix={}", ctx.platform().display()))
            .arg(format!("--with-cross-build={}", host.display()))
            .args(["--disable-shared", "--with-data-packaging=archive"]),
    )?;
    let make_targets: [&[&str]; 4] = [&["clean"], &["VERBOSE=1"], &["install"], &["clean"]];
    for make_args in make_targets {
        ctx.run(ctx.command("make", &target).args(make_args.iter().copied()))?;
    }
    Ok(())
}

fn verify_icu(ctx: &ArchBuild<'_>) -> Result<()> {
    ctx.require(NativeStage::Icu, &ctx.platform_lib("libicui18n.a"))
}

/// Object file a compiler writes for `source` in its working directory
fn object_name(source: &str) -> String {
    Path::new(source)
        .with_extension("o")
        .to_string_lossy()
        .into_owned()
}

fn dependency_includes(ctx: &ArchBuild<'_>) -> Vec<PathBuf> {
    let sources = &ctx.config.sources;
    let mut includes = sources.lzma_includes();
    includes.extend(sources.icu_includes());
    includes.extend(sources.zim_includes());
    includes.extend(platform_includes(ctx.config, ctx.arch));
    includes
}

fn make_zim(ctx: &ArchBuild<'_>) -> Result<()> {
    let cwd = &ctx.config.project_dir;
    let src_dir = ctx.config.sources.zim.join("src");
    let sysroot = ctx.platform().join("sysroot");

    ctx.run(
        ctx.command("g++", cwd)
            .args([
                "-fPIC",
                "-c",
                "-D_FILE_OFFSET_BITS=64",
                "-DHAVE_LSEEK64",
                "-D_LARGEFILE_SOURCE",
                "-D_LARGEFILE64_SOURCE",
            ])
            .arg(format!("-B{}", sysroot.display()))
            .args(
                LIBZIM_SOURCES
                    .iter()
                    .map(|s| src_dir.join(s).to_string_lossy().into_owned()),
            )
            .args(include_flags(&dependency_includes(ctx))),
    )?;
    ctx.run(
        ctx.command("ar", cwd)
            .args(["rvs", "libzim.a"])
            .args(LIBZIM_SOURCES.iter().map(|s| object_name(s))),
    )?;

    let archive = cwd.join("libzim.a");
    if archive.exists() {
        let dest = ctx.platform_lib("libzim.a");
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&archive, &dest)?;
    }
    remove_path(&archive)?;
    for source in LIBZIM_SOURCES {
        remove_path(&cwd.join(object_name(source)))?;
    }
    Ok(())
}

fn verify_zim(ctx: &ArchBuild<'_>) -> Result<()> {
    ctx.require(NativeStage::Zim, &ctx.platform_lib("libzim.a"))
}

const KIWIX_OBJECTS: [&str; 4] = ["kiwix.o", "reader.o", "stringTools.o", "pathTools.o"];

fn make_kiwix(ctx: &ArchBuild<'_>) -> Result<()> {
    let cfg = ctx.config;
    let cwd = &cfg.project_dir;
    let platform = ctx.platform();
    let sysroot = platform.join("sysroot");
    let kwsrc = &cfg.sources.kiwix;

    // JNI header for the package's JNIKiwix class
    ctx.run(ctx.command("javac", &cfg.package_source_dir()).arg("JNIKiwix.java"))?;
    ctx.run(
        ctx.command("javah", &cwd.join("src"))
            .arg("-jni")
            .arg(format!("{}.JNIKiwix", cfg.package)),
    )?;

    let mut includes = dependency_includes(ctx);
    includes.extend([kwsrc.clone(), cfg.sources.zim.join("include"), cwd.join("src")]);
    ctx.run(
        ctx.command("g++", cwd)
            .args(["-std=c++11", "-std=gnu++11", "-fPIC", "-c"])
            .arg(format!("-B{}", sysroot.display()))
            .args([
                "-DU_HAVE_STD_STRING",
                "-D_FILE_OFFSET_BITS=64",
                "-D_LARGEFILE_SOURCE",
                "-D_LARGEFILE64_SOURCE",
                "-DANDROID_NDK",
                "kiwix.c",
            ])
            .args(
                ["kiwix/reader.cpp", "stringTools.cpp", "pathTools.cpp"]
                    .iter()
                    .map(|f| kwsrc.join(f).to_string_lossy().into_owned()),
            )
            .args(include_flags(&includes)),
    )?;

    let libs_dir = cfg.libs_dir(ctx.arch);
    fs::create_dir_all(&libs_dir)?;
    let gcc = ctx.gcc_lib_dir();
    let stl = cfg
        .ndk_path
        .join("sources/cxx-stl/gnu-libstdc++")
        .join(&cfg.compiler_version)
        .join("libs")
        .join(ctx.arch.short_name())
        .join("libgnustl_static.a");
    let path_arg = |p: PathBuf| p.to_string_lossy().into_owned();
    ctx.run(
        ctx.command("g++", cwd)
            .args(["-fPIC", "-shared"])
            .arg(format!("-B{}", sysroot.display()))
            .arg("--sysroot")
            .arg(path_arg(sysroot.clone()))
            .arg("-nostdlib")
            .args(KIWIX_OBJECTS)
            .arg(path_arg(gcc.join("crtbegin.o")))
            .arg(path_arg(gcc.join("crtend.o")))
            .args(
                ["libzim.a", "liblzma.a", "libicuuc.a", "libicudata.a"]
                    .map(|l| path_arg(ctx.platform_lib(l))),
            )
            .arg(format!(
                "-L{}",
                platform.join(ctx.arch.full_name()).join("lib").display()
            ))
            .arg(path_arg(stl))
            .args(["-llog", "-landroid", "-lstdc++", "-lc", "-lm", "-ldl"])
            .arg(path_arg(gcc.join("libgcc.a")))
            .arg("-o")
            .arg(path_arg(ctx.libkiwix())),
    )?;

    for obj in KIWIX_OBJECTS {
        remove_path(&cwd.join(obj))?;
    }
    let header = format!("{}_JNIKiwix.h", cfg.package.replace('.', "_"));
    remove_path(&cwd.join("src").join(header))?;
    Ok(())
}

fn verify_kiwix(ctx: &ArchBuild<'_>) -> Result<()> {
    ctx.require(NativeStage::Kiwix, &ctx.libkiwix())
}

fn strip_kiwix(ctx: &ArchBuild<'_>) -> Result<()> {
    let strip = ctx
        .platform()
        .join(ctx.arch.full_name())
        .join("bin")
        .join("strip");
    ctx.run(
        ctx.command(strip.to_string_lossy(), &ctx.config.project_dir)
            .arg(ctx.libkiwix().to_string_lossy()),
    )
}

fn write_locales(ctx: &ProjectBuild<'_>) -> Result<()> {
    let project = &ctx.config.project_dir;
    let codes = locale_codes(&project.join("res"))?;
    let assets = project.join("assets");
    fs::create_dir_all(&assets)?;
    fs::write(assets.join("locales.txt"), codes.join(",\n"))?;
    info!(count = codes.len(), "created locales.txt");
    Ok(())
}

/// Language codes of the `values-<code>` folders, then `en`
pub fn locale_codes(res_dir: &Path) -> Result<Vec<String>> {
    let mut codes: Vec<String> = fs::read_dir(res_dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| {
            entry
                .file_name()
                .to_str()
                .and_then(|n| n.strip_prefix("values-"))
                .map(str::to_string)
        })
        .collect();
    codes.sort();
    codes.push("en".to_string());
    Ok(codes)
}

fn build_apk(ctx: &ProjectBuild<'_>) -> Result<()> {
    let cfg = ctx.config;
    gradle::assemble(ctx.runner, &cfg.project_dir, &cfg.package, &cfg.sdk_path)?;
    Ok(())
}

fn clean_build(ctx: &ProjectBuild<'_>) -> Result<()> {
    gradle::clean(&ctx.config.project_dir)?;
    Ok(())
}

/// Host programs the selected stages call from `PATH`
pub fn host_tools(selection: &Selection<NativeStage>) -> Vec<&'static str> {
    let mut tools = Vec::new();
    if selection.is_enabled(NativeStage::Lzma) || selection.is_enabled(NativeStage::Icu) {
        tools.push("make");
    }
    if selection.is_enabled(NativeStage::Kiwix) {
        tools.extend(["javac", "javah"]);
    }
    tools
}

/// Stages executed once per architecture
pub fn arch_pipeline<'a>() -> Pipeline<NativeStage, ArchBuild<'a>> {
    Pipeline::new(vec![
        Step::new(NativeStage::Toolchain, make_toolchain).verified_by(verify_toolchain),
        Step::new(NativeStage::Lzma, make_lzma).verified_by(verify_lzma),
        Step::new(NativeStage::Icu, make_icu).verified_by(verify_icu),
        Step::new(NativeStage::Zim, make_zim).verified_by(verify_zim),
        Step::new(NativeStage::Kiwix, make_kiwix).verified_by(verify_kiwix),
        Step::new(NativeStage::Strip, strip_kiwix),
    ])
}

/// Stages executed once for the project
pub fn project_pipeline<'a>() -> Pipeline<NativeStage, ProjectBuild<'a>> {
    Pipeline::new(vec![
        Step::new(NativeStage::Locales, write_locales),
        Step::new(NativeStage::Apk, build_apk),
        Step::new(NativeStage::Clean, clean_build),
    ])
}

/// What a native build executed
#[derive(Debug, Default)]
pub struct NativeReport {
    pub archs: Vec<(Arch, RunReport<NativeStage>)>,
    pub project: RunReport<NativeStage>,
}

/// Drives the native pipeline over the configured architectures
pub struct NativeBuild<'a> {
    config: &'a BuildConfig,
    runner: &'a dyn Runner,
    env: EnvStack,
}

impl<'a> NativeBuild<'a> {
    pub fn new(config: &'a BuildConfig, runner: &'a dyn Runner, env: EnvStack) -> Self {
        Self {
            config,
            runner,
            env,
        }
    }

    /// Run the selected stages; the first failure aborts the whole build
    pub fn run<F>(&mut self, selection: &Selection<NativeStage>, mut observe: F) -> Result<NativeReport>
    where
        F: FnMut(Progress),
    {
        let config = self.config;
        let runner = self.runner;
        config.prepare()?;
        runner.require_programs(&host_tools(selection))?;
        let mut report = NativeReport::default();

        if selection.is_enabled(NativeStage::Icu) {
            observe(Progress::HostIcu);
            self.build_host_icu()?;
        }

        let per_arch = arch_pipeline();
        let wants_arch_stage = per_arch
            .stages()
            .any(|s| selection.needs_output_of(s));
        if wants_arch_stage {
            for &arch in &config.archs {
                observe(Progress::Arch(arch));
                let span = info_span!("arch", arch = arch.short_name());
                let _entered = span.enter();

                let original_path = self.env.original("PATH").unwrap_or_default().to_string();
                let scope = self
                    .env
                    .push(toolchain::arch_overlay(config, arch, &original_path));
                toolchain::verify_environment(&scope, &config.platform_dir(arch))?;

                let ctx = ArchBuild {
                    config,
                    arch,
                    env: scope.overrides(),
                    runner,
                };
                let timer = Timer::start(arch.short_name());
                let arch_report = per_arch.run_observed(selection, &ctx, |index, total, stage| {
                    observe(Progress::Stage {
                        index,
                        total,
                        stage,
                    })
                })?;
                timer.stop();
                report.archs.push((arch, arch_report));
            }
        }

        let project = project_pipeline();
        if project.stages().any(|s| selection.is_enabled(s)) {
            observe(Progress::Project);
            let ctx = ProjectBuild { config, runner };
            report.project = project.run_observed(selection, &ctx, |index, total, stage| {
                observe(Progress::Stage {
                    index,
                    total,
                    stage,
                })
            })?;
        }

        Ok(report)
    }

    /// Host build of ICU, required by its cross build
    fn build_host_icu(&self) -> Result<()> {
        let (host, target) = self.config.icu_build_dirs();
        fs::create_dir_all(&host)?;
        fs::create_dir_all(&target)?;
        let configure = self.config.sources.icu.join("configure");
        self.runner.run_logged(
            &Invocation::new(configure.to_string_lossy())
                .arg("--with-data-packaging=archive")
                .current_dir(&host),
        )?;
        self.runner
            .run_logged(&Invocation::new("make").current_dir(&host))?;
        Ok(())
    }
}
