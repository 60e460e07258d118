//! Build configuration of the native pipeline
//!
//! Resolved once from defaults, the `[native]` config section, environment
//! variables and the `--on` flags, then passed read-only to every stage.

use crate::arch::Arch;
use crate::manifest;
use kiwix_core::config::{expand_path, NativeConfig};
use kiwix_core::env_overlay::EnvStack;
use kiwix_core::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Source files of libzim compiled into `libzim.a`
pub const LIBZIM_SOURCES: &[&str] = &[
    "article.cpp",
    "articlesearch.cpp",
    "cluster.cpp",
    "dirent.cpp",
    "file.cpp",
    "fileheader.cpp",
    "fileimpl.cpp",
    "indexarticle.cpp",
    "ptrstream.cpp",
    "search.cpp",
    "template.cpp",
    "unicode.cpp",
    "uuid.cpp",
    "zintstream.cpp",
    "envvalue.cpp",
    "lzmastream.cpp",
    "unlzmastream.cpp",
    "fstream.cpp",
    "md5.c",
    "md5stream.cpp",
];

/// Locations of the dependency source trees
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTree {
    pub lzma: PathBuf,
    pub icu: PathBuf,
    pub zim: PathBuf,
    pub kiwix: PathBuf,
}

impl SourceTree {
    /// Layout of `src/dependencies` next to the Android project
    pub fn under(root: &Path) -> Self {
        let deps = root.join("src").join("dependencies");
        Self {
            lzma: deps.join("xz"),
            icu: deps.join("icu").join("source"),
            zim: deps.join("zimlib-1.2"),
            kiwix: root.join("src").join("common"),
        }
    }

    pub fn lzma_includes(&self) -> Vec<PathBuf> {
        vec![self.lzma.join("src").join("liblzma").join("api")]
    }

    pub fn icu_includes(&self) -> Vec<PathBuf> {
        vec![self.icu.join("i18n"), self.icu.join("common")]
    }

    pub fn zim_includes(&self) -> Vec<PathBuf> {
        vec![self.zim.join("include")]
    }
}

/// Immutable configuration for one native build
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Android project directory (manifest, `src`, `res`, `libs`)
    pub project_dir: PathBuf,
    /// Package from the project manifest
    pub package: String,
    pub ndk_path: PathBuf,
    pub sdk_path: PathBuf,
    pub ndk_platform: String,
    /// Holds one standalone toolchain per architecture
    pub platform_prefix: PathBuf,
    pub compiler_version: String,
    pub sources: SourceTree,
    pub archs: Vec<Arch>,
    /// `--system` value for the NDK toolchain script
    pub host_system: String,
}

impl BuildConfig {
    /// Resolve the configuration for `project_dir`
    ///
    /// `on` restricts the architectures; when empty the configured list is used.
    pub fn resolve(
        project_dir: &Path,
        native: &NativeConfig,
        env: &EnvStack,
        on: &[String],
    ) -> Result<Self> {
        let project_dir = std::path::absolute(project_dir)?;
        let root = project_dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| project_dir.clone());
        let deps = root.join("src").join("dependencies");

        let from_env = |key: &str, default: PathBuf| {
            env.get(key).map(expand_path).unwrap_or(default)
        };

        let archs = if on.is_empty() {
            Arch::parse_list(native.archs.as_slice())?
        } else {
            Arch::parse_list(on)?
        };

        Ok(Self {
            package: manifest::find_package(&project_dir)?,
            ndk_path: from_env("NDK_PATH", deps.join("android-ndk-r10e")),
            sdk_path: from_env("ANDROID_HOME", deps.join("android-sdk")),
            ndk_platform: env
                .get("NDK_PLATFORM")
                .map(str::to_string)
                .unwrap_or_else(|| native.platform.clone()),
            platform_prefix: from_env("PLATFORM_PREFIX", root.join("platforms")),
            compiler_version: native.compiler_version.clone(),
            sources: SourceTree::under(&root),
            archs,
            host_system: host_system().to_string(),
            project_dir,
        })
    }

    /// Toolchain install directory for `arch`
    pub fn platform_dir(&self, arch: Arch) -> PathBuf {
        self.platform_prefix.join(arch.toolchain_name())
    }

    /// Working directories of the ICU cross build: (host, target)
    pub fn icu_build_dirs(&self) -> (PathBuf, PathBuf) {
        let tmp = self.platform_prefix.join("tmp");
        (tmp.join("host"), tmp.join("target"))
    }

    /// Path of the package directory under `src`
    pub fn package_source_dir(&self) -> PathBuf {
        self.package
            .split('.')
            .fold(self.project_dir.join("src"), |p, seg| p.join(seg))
    }

    /// Directory receiving `libkiwix.so` for `arch`
    pub fn libs_dir(&self, arch: Arch) -> PathBuf {
        self.project_dir.join("libs").join(arch.short_name())
    }

    /// Create the platform prefix and check every required input exists
    pub fn prepare(&self) -> Result<()> {
        std::fs::create_dir_all(&self.platform_prefix)?;
        for path in self.required_paths() {
            if !path.exists() {
                return Err(Error::missing_prerequisite(path));
            }
        }
        Ok(())
    }

    fn required_paths(&self) -> [&Path; 5] {
        [
            &self.ndk_path,
            &self.platform_prefix,
            &self.sources.lzma,
            &self.sources.zim,
            &self.sources.kiwix,
        ]
    }
}

/// Host identifier understood by `make-standalone-toolchain.sh`
pub fn host_system() -> &'static str {
    match (std::env::consts::OS, std::env::consts::ARCH) {
        ("macos", _) => "darwin-x86_64",
        ("linux", "x86") => "linux-x86",
        _ => "linux-x86_64",
    }
}
