//! Standalone NDK toolchains and the per-architecture compiler environment

use crate::arch::Arch;
use crate::config::BuildConfig;
use kiwix_core::env_overlay::{EnvOverlay, EnvStack};
use kiwix_core::error::{Error, ErrorCode, Result};
use kiwix_core::process::Invocation;
use std::path::{Path, PathBuf};

const CFLAGS: &str = " -fPIC -D_FILE_OFFSET_BITS=64 ";
const CXXFLAGS: &str = " -D__OPTIMIZE__ -fno-strict-aliasing  -DU_HAVE_NL_LANGINFO_CODESET=0 \
                        -DU_STATIC_IMPLEMENTATION -DU_HAVE_STD_STRING -DU_TIMEZONE=0";

/// `make-standalone-toolchain.sh` call installing the toolchain for `arch`
pub fn toolchain_invocation(config: &BuildConfig, arch: Arch) -> Invocation {
    let script = config
        .ndk_path
        .join("build")
        .join("tools")
        .join("make-standalone-toolchain.sh");
    Invocation::new(script.to_string_lossy())
        .arg(format!(
            "--toolchain={}-{}",
            arch.toolchain_name(),
            config.compiler_version
        ))
        .arg(format!("--platform={}", config.ndk_platform))
        .arg(format!(
            "--install-dir={}",
            config.platform_dir(arch).display()
        ))
        .arg(format!("--system={}", config.host_system))
}

/// Files whose presence proves the toolchain was installed
pub fn toolchain_artifacts(config: &BuildConfig, arch: Arch) -> [PathBuf; 2] {
    let target = config.platform_dir(arch).join(arch.full_name());
    [target.join("bin").join("gcc"), target.join("libexec")]
}

/// Variables overlaid while building `arch`
///
/// `PATH` puts the toolchain and SDK tools in front of `original_path`.
pub fn arch_overlay(config: &BuildConfig, arch: Arch, original_path: &str) -> EnvOverlay {
    let platform = config.platform_dir(arch);
    let path = [
        platform.join("bin"),
        platform.join(arch.full_name()).join("bin"),
        platform
            .join("libexec")
            .join("gcc")
            .join(arch.full_name())
            .join(&config.compiler_version),
        config.sdk_path.join("platform-tools"),
        config.sdk_path.join("tools"),
    ]
    .iter()
    .map(|p| p.to_string_lossy().into_owned())
    .chain(std::iter::once(original_path.to_string()))
    .filter(|p| !p.is_empty())
    .collect::<Vec<_>>()
    .join(":");

    EnvOverlay::new()
        .with("PATH", path)
        .with("CFLAGS", CFLAGS)
        .with("CXXFLAGS", CXXFLAGS)
        .with("NDK_DEBUG", "0")
        .with("ANDROID_HOME", config.sdk_path.to_string_lossy())
}

/// Check the active overlay points `PATH` at the platform directory
pub fn verify_environment(env: &EnvStack, platform: &Path) -> Result<()> {
    let platform = platform.to_string_lossy();
    match env.get("PATH") {
        Some(path) if path.contains(platform.as_ref()) => Ok(()),
        _ => Err(Error::new(
            ErrorCode::EnvironmentNotApplied,
            "The PATH environment variable was not set properly",
        )
        .with_context(format!("expected {} in PATH", platform))),
    }
}

/// Header directories shipped with the standalone toolchain
pub fn platform_includes(config: &BuildConfig, arch: Arch) -> Vec<PathBuf> {
    let platform = config.platform_dir(arch);
    let gcc = platform
        .join("lib")
        .join("gcc")
        .join(arch.full_name())
        .join(&config.compiler_version);
    let cxx = platform
        .join("include")
        .join("c++")
        .join(&config.compiler_version);
    vec![
        cxx.clone(),
        cxx.join(arch.full_name()),
        platform.join("sysroot").join("usr").join("include"),
        gcc.join("include"),
        gcc.join("include-fixed"),
    ]
}

/// `-I` flags for a list of include directories
pub fn include_flags(dirs: &[PathBuf]) -> Vec<String> {
    dirs.iter().map(|d| format!("-I{}", d.display())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::{env, project};
    use kiwix_core::config::NativeConfig;

    fn config(root: &Path) -> BuildConfig {
        BuildConfig::resolve(&project(root), &NativeConfig::default(), &env(), &[]).unwrap()
    }

    #[test]
    fn test_toolchain_invocation() {
        let root = tempfile::tempdir().unwrap();
        let cfg = config(root.path());
        let line = toolchain_invocation(&cfg, Arch::Mips).command_line();
        assert!(line.contains("build/tools/make-standalone-toolchain.sh"));
        assert!(line.contains("--toolchain=mipsel-linux-android-4.8"));
        assert!(line.contains("--platform=android-14"));
        assert!(line.contains(&format!(
            "--install-dir={}",
            root.path().join("platforms/mipsel-linux-android").display()
        )));
        assert!(line.contains("--system="));
    }

    #[test]
    fn test_overlay_prepends_toolchain_to_original_path() {
        let root = tempfile::tempdir().unwrap();
        let cfg = config(root.path());
        let overlay = arch_overlay(&cfg, Arch::X86, "/usr/bin");
        let path = overlay.get("PATH").unwrap();

        let platform = cfg.platform_dir(Arch::X86);
        assert!(path.starts_with(&platform.join("bin").to_string_lossy().into_owned()));
        assert!(path.contains("libexec/gcc/i686-linux-android/4.8"));
        assert!(path.ends_with(":/usr/bin"));
        assert_eq!(overlay.get("NDK_DEBUG"), Some("0"));
        assert!(overlay.get("CXXFLAGS").unwrap().contains("-DU_STATIC_IMPLEMENTATION"));
    }

    #[test]
    fn test_verify_environment() {
        let root = tempfile::tempdir().unwrap();
        let cfg = config(root.path());
        let platform = cfg.platform_dir(Arch::Arm);

        let mut stack = env();
        assert_eq!(
            verify_environment(&stack, &platform).unwrap_err().code,
            ErrorCode::EnvironmentNotApplied
        );
        let scope = stack.push(arch_overlay(&cfg, Arch::Arm, "/usr/bin"));
        verify_environment(&scope, &platform).unwrap();
    }

    #[test]
    fn test_platform_includes() {
        let root = tempfile::tempdir().unwrap();
        let cfg = config(root.path());
        let includes = platform_includes(&cfg, Arch::Arm);
        assert_eq!(includes.len(), 5);
        assert!(includes[1].ends_with("include/c++/4.8/arm-linux-androideabi"));
        assert!(include_flags(&includes)[0].starts_with("-I"));
    }
}
