//! Custom app pipeline
//!
//! Copies the template tree, brands it for one app, builds the native
//! libraries and APKs in the copy and moves the packages back next to the
//! template's own build outputs.

use crate::app::App;
use crate::embed::{self, CONTENT_JAR};
use crate::icons;
use crate::rename::{package_dir, PackageRename};
use crate::rewrite::{
    edit_file, remove_permissions, remove_view_intent_filters, rename_elements,
    replace_in_strings, set_attributes, substitute_placeholders, uncomment_lines,
};
use kiwix_android::gradle::{self, apk_dir, apk_name, VARIANTS};
use kiwix_android::{BuildConfig, NativeBuild, NativeStage};
use kiwix_cli::output::Status;
use kiwix_core::config::{CustomConfig, NativeConfig};
use kiwix_core::env_overlay::EnvStack;
use kiwix_core::error::{Error, Result};
use kiwix_core::pipeline::{Effect, Pipeline, RunReport, Selection, Stage, Step};
use kiwix_core::process::Runner;
use kiwix_core::tree::{copy_tree, move_file, remove_path};
use kiwix_telemetry::Timer;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Native stages run for a custom app
const NATIVE_STAGES: [NativeStage; 7] = [
    NativeStage::Toolchain,
    NativeStage::Lzma,
    NativeStage::Icu,
    NativeStage::Zim,
    NativeStage::Kiwix,
    NativeStage::Strip,
    NativeStage::Locales,
];

/// Element renames per resource file: (file, class suffix)
const CUSTOM_VIEWS: &[(&str, &str)] = &[
    ("res/xml/preferences.xml", "views.SliderPreference"),
    ("res/xml/preferences.xml", "settings.CustomSwitchPreference"),
    ("res/layout/main.xml", "views.AnimatedProgressBar"),
];

/// Stages of the custom app pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CustomStage {
    Setup,
    Icons,
    Branding,
    Constants,
    Menu,
    XmlNodes,
    Manifest,
    Native,
    Embed,
    Gradle,
    Build,
    Move,
    List,
    Clean,
}

impl Stage for CustomStage {
    const ORDER: &'static [Self] = &[
        CustomStage::Setup,
        CustomStage::Icons,
        CustomStage::Branding,
        CustomStage::Constants,
        CustomStage::Menu,
        CustomStage::XmlNodes,
        CustomStage::Manifest,
        CustomStage::Native,
        CustomStage::Embed,
        CustomStage::Gradle,
        CustomStage::Build,
        CustomStage::Move,
        CustomStage::List,
        CustomStage::Clean,
    ];

    fn name(self) -> &'static str {
        match self {
            CustomStage::Setup => "setup",
            CustomStage::Icons => "icons",
            CustomStage::Branding => "branding",
            CustomStage::Constants => "constants",
            CustomStage::Menu => "menu",
            CustomStage::XmlNodes => "xmlnodes",
            CustomStage::Manifest => "manifest",
            CustomStage::Native => "native",
            CustomStage::Embed => "embed",
            CustomStage::Gradle => "gradle",
            CustomStage::Build => "build",
            CustomStage::Move => "move",
            CustomStage::List => "list",
            CustomStage::Clean => "clean",
        }
    }

    fn description(self) -> &'static str {
        match self {
            CustomStage::Setup => "Copy the template tree into the work directory",
            CustomStage::Icons => "Generate launcher icons",
            CustomStage::Branding => "Rename the app in branding.xml",
            CustomStage::Constants => "Write Constants.java from the template",
            CustomStage::Menu => "Hide the open-file menu entry",
            CustomStage::XmlNodes => "Point custom views at the new package",
            CustomStage::Manifest => "Rewrite the manifest and rename the package",
            CustomStage::Native => "Compile libkiwix for the new package",
            CustomStage::Embed => "Pack the content into content-libs.jar",
            CustomStage::Gradle => "Enable content-libs.jar in build.gradle",
            CustomStage::Build => "Build the APKs",
            CustomStage::Move => "Move the APKs next to the template outputs",
            CustomStage::List => "List the generated APKs",
            CustomStage::Clean => "Remove the work directory",
        }
    }

    fn depends_on(self) -> &'static [Self] {
        use CustomStage::*;
        match self {
            Icons | Branding | Constants | Menu | XmlNodes | Manifest | Native | Gradle
            | Build => &[Setup],
            Embed => &[Setup, Native],
            Move => &[Build],
            Setup | List | Clean => &[],
        }
    }

    fn effects(self) -> &'static [Effect] {
        use CustomStage::*;
        match self {
            Setup => &[Effect::WritesFiles, Effect::MovesFiles],
            Icons | Branding | Constants | Menu | XmlNodes | Embed | Gradle => {
                &[Effect::WritesFiles]
            }
            Manifest => &[Effect::WritesFiles, Effect::MovesFiles],
            Native | Build => &[Effect::RunsTools, Effect::WritesFiles],
            Move | Clean => &[Effect::MovesFiles],
            List => &[],
        }
    }
}

/// Everything the custom stages read
pub struct CustomBuild<'a> {
    pub app: &'a App,
    /// Template Android project the work tree is copied from
    pub template_dir: &'a Path,
    pub work_dir: &'a Path,
    pub settings: &'a CustomConfig,
    pub native: &'a NativeConfig,
    pub env: &'a EnvStack,
    /// Architectures passed with `--on`; empty means the configured ones
    pub archs: &'a [String],
    pub runner: &'a dyn Runner,
}

impl CustomBuild<'_> {
    fn work(&self, relative: &str) -> PathBuf {
        self.work_dir.join(relative)
    }

    fn build_config(&self) -> Result<BuildConfig> {
        BuildConfig::resolve(self.work_dir, self.native, self.env, self.archs)
    }

    /// APKs built inside the work tree
    fn built_apks(&self) -> Vec<PathBuf> {
        let dir = apk_dir(self.work_dir);
        VARIANTS
            .iter()
            .map(|v| dir.join(apk_name(&self.app.package, v)))
            .collect()
    }
}

fn setup(ctx: &CustomBuild) -> Result<()> {
    remove_path(ctx.work_dir)?;
    let copied = copy_tree(ctx.template_dir, ctx.work_dir)?;
    debug!(files = copied, "template copied");
    Ok(())
}

fn verify_setup(ctx: &CustomBuild) -> Result<()> {
    let manifest = ctx.work("AndroidManifest.xml");
    if !manifest.is_file() {
        return Err(Error::artifact_missing("setup", &manifest));
    }
    Ok(())
}

fn make_icons(ctx: &CustomBuild) -> Result<()> {
    let written = icons::generate(&ctx.app.ic_launcher, ctx.work_dir)?;
    debug!(count = written.len(), "icons generated");
    Ok(())
}

fn branding(ctx: &CustomBuild) -> Result<()> {
    let res = ctx.work("res");
    edit_file(&res.join("values").join("branding.xml"), |xml| {
        replace_in_strings(xml, "Kiwix", &ctx.app.app_name)
    })?;

    // Translated app names would override the new one
    let localized = Regex::new(r"^values-[a-z]{2}$")?;
    for entry in fs::read_dir(&res)? {
        let entry = entry?;
        if localized.is_match(&entry.file_name().to_string_lossy()) {
            let branding = entry.path().join("branding.xml");
            if remove_path(&branding)? {
                debug!(path = %branding.display(), "localized branding removed");
            }
        }
    }
    Ok(())
}

fn constants(ctx: &CustomBuild) -> Result<()> {
    let template = ctx.work("templates").join("Constants.java");
    if !template.is_file() {
        return Err(Error::file_not_found(&template));
    }
    let target = package_dir(&ctx.work("src"), &ctx.settings.template_package)
        .join("settings")
        .join("Constants.java");
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let text = fs::read_to_string(&template)?;
    fs::write(&target, substitute_placeholders(&text, ctx.app.fields()))?;
    Ok(())
}

fn menu(ctx: &CustomBuild) -> Result<()> {
    let mut hidden = 0;
    edit_file(&ctx.work("res/menu/menu_main.xml"), |xml| {
        let (xml, count) = set_attributes(
            xml,
            "item",
            Some(("android:id", "@+id/menu_openfile")),
            &[("android:showAsAction", "never"), ("android:visible", "false")],
        )?;
        hidden = count;
        Ok(xml)
    })?;
    if hidden == 0 {
        warn!("open-file menu entry not found");
    }
    Ok(())
}

fn xml_nodes(ctx: &CustomBuild) -> Result<()> {
    let template = &ctx.settings.template_package;
    for (file, suffix) in CUSTOM_VIEWS {
        let path = ctx.work(file);
        let from = format!("{}.{}", template, suffix);
        let to = format!("{}.{}", ctx.app.package, suffix);
        let edited = edit_file(&path, |xml| Ok(rename_elements(xml, &from, &to)?.0));
        match edited {
            Ok(true) => debug!(file, element = %to, "element renamed"),
            Ok(false) => warn!(file, element = %from, "element not found"),
            Err(e) => warn!(file, error = %e, "skipping resource"),
        }
    }
    Ok(())
}

fn manifest(ctx: &CustomBuild) -> Result<()> {
    let app = ctx.app;
    let version_code = app.version_code.to_string();
    edit_file(&ctx.work("AndroidManifest.xml"), |xml| {
        let (xml, _) = set_attributes(
            xml,
            "manifest",
            None,
            &[
                ("package", app.package.as_str()),
                ("android:versionCode", version_code.as_str()),
                ("android:versionName", app.version_name.as_str()),
            ],
        )?;
        let (xml, filters) = remove_view_intent_filters(&xml)?;
        let (xml, permissions) = remove_permissions(&xml, &ctx.settings.useless_permissions)?;
        debug!(filters, permissions, "manifest trimmed");
        Ok(xml)
    })?;

    let mut rename = PackageRename::new(&ctx.settings.template_package, &app.package)?;
    for alias in &ctx.settings.package_aliases {
        rename = rename.alias(&alias.from, &alias.suffix);
    }
    let plan = rename.plan(ctx.work_dir)?;
    rename.apply(ctx.work_dir, &plan)?;
    Ok(())
}

fn native(ctx: &CustomBuild) -> Result<()> {
    let config = ctx.build_config()?;
    let selection = Selection::from_stages(&NATIVE_STAGES);
    let report = NativeBuild::new(&config, ctx.runner, ctx.env.clone())
        .run(&selection, |progress| debug!(?progress, "native build"))?;
    info!(archs = report.archs.len(), "native libraries built");
    Ok(())
}

fn embed_content(ctx: &CustomBuild) -> Result<()> {
    if !ctx.app.embed_zim {
        info!("content is not embedded");
        return Ok(());
    }
    embed::build_content_jar(
        &ctx.work("libs"),
        &ctx.app.zim_file,
        &ctx.app.zim_name,
        &ctx.work(CONTENT_JAR),
    )?;
    Ok(())
}

fn gradle_script(ctx: &CustomBuild) -> Result<()> {
    if !ctx.app.embed_zim {
        return Ok(());
    }
    let mut enabled = 0;
    edit_file(&ctx.work("build.gradle"), |text| {
        let (text, count) = uncomment_lines(text, CONTENT_JAR);
        enabled = count;
        Ok(text)
    })?;
    if enabled == 0 {
        warn!("no {} line in build.gradle", CONTENT_JAR);
    }
    Ok(())
}

fn build(ctx: &CustomBuild) -> Result<()> {
    let config = ctx.build_config()?;
    gradle::assemble(ctx.runner, ctx.work_dir, &ctx.app.package, &config.sdk_path)?;
    Ok(())
}

fn verify_build(ctx: &CustomBuild) -> Result<()> {
    for apk in ctx.built_apks() {
        if !apk.is_file() {
            return Err(Error::artifact_missing("build", &apk));
        }
    }
    Ok(())
}

fn move_apks(ctx: &CustomBuild) -> Result<()> {
    let target = apk_dir(ctx.template_dir);
    for apk in ctx.built_apks() {
        if let Some(name) = apk.file_name() {
            move_file(&apk, &target.join(name))?;
        }
    }
    Ok(())
}

fn list(ctx: &CustomBuild) -> Result<()> {
    let outputs = gradle::list_outputs(ctx.template_dir, &ctx.app.package)?;
    if outputs.is_empty() {
        Status::warning(&format!("No APK found for {}", ctx.app.package));
    }
    for (path, size) in outputs {
        Status::artifact(&path, size);
    }
    Ok(())
}

fn clean(ctx: &CustomBuild) -> Result<()> {
    if remove_path(ctx.work_dir)? {
        info!(path = %ctx.work_dir.display(), "work tree removed");
    }
    Ok(())
}

pub fn pipeline<'a>() -> Pipeline<CustomStage, CustomBuild<'a>> {
    Pipeline::new(vec![
        Step::new(CustomStage::Setup, setup).verified_by(verify_setup),
        Step::new(CustomStage::Icons, make_icons),
        Step::new(CustomStage::Branding, branding),
        Step::new(CustomStage::Constants, constants),
        Step::new(CustomStage::Menu, menu),
        Step::new(CustomStage::XmlNodes, xml_nodes),
        Step::new(CustomStage::Manifest, manifest),
        Step::new(CustomStage::Native, native),
        Step::new(CustomStage::Embed, embed_content),
        Step::new(CustomStage::Gradle, gradle_script),
        Step::new(CustomStage::Build, build).verified_by(verify_build),
        Step::new(CustomStage::Move, move_apks),
        Step::new(CustomStage::List, list),
        Step::new(CustomStage::Clean, clean),
    ])
}

/// Run the selected stages, reporting each one to `observe`
pub fn run<F>(
    ctx: &CustomBuild,
    selection: &Selection<CustomStage>,
    observe: F,
) -> Result<RunReport<CustomStage>>
where
    F: FnMut(usize, usize, CustomStage),
{
    info!(
        package = %ctx.app.package,
        work = %ctx.work_dir.display(),
        "generating custom app"
    );
    let timer = Timer::start(ctx.app.package.as_str());
    let report = pipeline().run_observed(selection, ctx, observe)?;
    timer.stop();
    Ok(report)
}
