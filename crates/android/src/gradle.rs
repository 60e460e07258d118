//! Gradle package assembly
//!
//! Wraps the `./gradlew` calls producing the APKs and the housekeeping
//! around them: `local.properties`, variant renaming, cleanup and listing.

use kiwix_core::env_overlay::EnvOverlay;
use kiwix_core::error::{Error, Result};
use kiwix_core::file_scanner::{file_size, glob_in};
use kiwix_core::process::{local_program, Invocation, Runner};
use kiwix_core::tree::{move_file, remove_path};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// APK variants produced by a Gradle build, in listing order
pub const VARIANTS: [&str; 3] = ["debug", "debug-unaligned", "release-unsigned"];

/// Build output directories removed by a clean, relative to the project
const CLEAN_DIRS: &[&str] = &[
    "build/generated",
    "build/intermediates",
    "build/native-libs",
    "build/reports",
    "build/test-results",
    "build/tmp",
    "build/outputs/logs",
];

/// Directory Gradle writes APKs into
pub fn apk_dir(project_dir: &Path) -> PathBuf {
    project_dir.join("build").join("outputs").join("apk")
}

/// `<package>-<variant>.apk`
pub fn apk_name(package: &str, variant: &str) -> String {
    format!("{}-{}.apk", package, variant)
}

/// Run a Gradle task in the project
pub fn run_task(
    runner: &dyn Runner,
    project_dir: &Path,
    tasks: &[&str],
    env: &EnvOverlay,
) -> Result<()> {
    let gradle_wrapper = if cfg!(windows) {
        "gradlew.bat"
    } else {
        "./gradlew"
    };
    let invocation = Invocation::new(local_program(project_dir, gradle_wrapper))
        .args(tasks.iter().copied())
        .current_dir(project_dir)
        .envs(env);
    runner.run_logged(&invocation)?;
    Ok(())
}

/// Point `local.properties` at the SDK
pub fn write_local_properties(project_dir: &Path, sdk_path: &Path) -> Result<()> {
    let sdk = std::path::absolute(sdk_path)?;
    let content = format!(
        "# {}\nsdk.dir={}\n",
        chrono::Local::now().format("%a %b %e %H:%M:%S %Z %Y"),
        sdk.display()
    );
    fs::write(project_dir.join("local.properties"), content)?;
    Ok(())
}

/// Build the APKs and rename them after the package
///
/// Gradle names its outputs after the project folder; they are renamed to
/// `<package>-<variant>.apk`. Returns the renamed files.
pub fn assemble(
    runner: &dyn Runner,
    project_dir: &Path,
    package: &str,
    sdk_path: &Path,
) -> Result<Vec<PathBuf>> {
    write_local_properties(project_dir, sdk_path)?;
    let env = EnvOverlay::new().with(
        "ANDROID_HOME",
        std::path::absolute(sdk_path)?.to_string_lossy(),
    );

    let apks = apk_dir(project_dir);
    for old in glob_in(&apks, "*.apk")? {
        debug!(path = %old.display(), "removing previous apk");
        remove_path(&old)?;
    }

    run_task(runner, project_dir, &["clean", "assemble"], &env)?;
    run_task(runner, project_dir, &["build", "--stacktrace"], &env)?;

    let folder = project_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let unaligned = apks.join(apk_name(&folder, "debug-unaligned"));
    if !unaligned.is_file() {
        return Err(Error::artifact_missing("apk", &unaligned));
    }

    let mut renamed = Vec::new();
    for variant in VARIANTS {
        let from = apks.join(apk_name(&folder, variant));
        if !from.is_file() {
            return Err(Error::artifact_missing("apk", &from));
        }
        let to = apks.join(apk_name(package, variant));
        move_file(&from, &to)?;
        renamed.push(to);
    }
    info!(package, count = renamed.len(), "apks assembled");
    Ok(renamed)
}

/// Remove build intermediates, keeping the APKs
pub fn clean(project_dir: &Path) -> Result<usize> {
    let mut removed = 0;
    for dir in CLEAN_DIRS {
        if remove_path(&project_dir.join(dir))? {
            removed += 1;
        }
    }
    for lint in glob_in(&project_dir.join("build").join("outputs"), "lint*")? {
        if remove_path(&lint)? {
            removed += 1;
        }
    }
    Ok(removed)
}

/// `<package>-*` files in the APK directory with their sizes
pub fn list_outputs(project_dir: &Path, package: &str) -> Result<Vec<(PathBuf, u64)>> {
    glob_in(&apk_dir(project_dir), &format!("{}-*", package))?
        .into_iter()
        .map(|p| {
            let size = file_size(&p)?;
            Ok((p, size))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiwix_core::error::ErrorCode;
    use kiwix_core::process::RecordingRunner;

    fn gradle_output(project: &Path, folder: &str) -> RecordingRunner {
        let apks = apk_dir(project);
        VARIANTS.iter().fold(RecordingRunner::new(), |runner, variant| {
            runner.creates("build --stacktrace", apks.join(apk_name(folder, variant)))
        })
    }

    #[test]
    fn test_assemble_renames_variants() {
        let root = tempfile::tempdir().unwrap();
        let project = root.path().join("android");
        fs::create_dir_all(apk_dir(&project)).unwrap();
        fs::write(apk_dir(&project).join("stale.apk"), "old").unwrap();

        let runner = gradle_output(&project, "android");
        let apks = assemble(&runner, &project, "org.demo.app", root.path()).unwrap();

        assert_eq!(
            apks,
            VARIANTS
                .iter()
                .map(|v| apk_dir(&project).join(apk_name("org.demo.app", v)))
                .collect::<Vec<_>>()
        );
        assert!(!apk_dir(&project).join("stale.apk").exists());
        assert!(!apk_dir(&project).join("android-debug.apk").exists());

        let lines = runner.command_lines();
        assert!(lines[0].ends_with("gradlew clean assemble"));
        assert!(lines[1].ends_with("gradlew build --stacktrace"));
        assert!(runner.calls()[0].env.get("ANDROID_HOME").is_some());

        let props = fs::read_to_string(project.join("local.properties")).unwrap();
        assert!(props.starts_with("# "));
        assert!(props.contains(&format!("sdk.dir={}", root.path().display())));
    }

    #[test]
    fn test_assemble_without_output_fails() {
        let root = tempfile::tempdir().unwrap();
        let project = root.path().join("android");
        fs::create_dir_all(&project).unwrap();

        let err = assemble(&RecordingRunner::new(), &project, "org.demo.app", root.path())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ArtifactMissing);
        assert!(err.message.contains("android-debug-unaligned.apk"));
    }

    #[test]
    fn test_clean_keeps_apks() {
        let root = tempfile::tempdir().unwrap();
        let project = root.path();
        for dir in ["build/tmp", "build/intermediates/x", "build/outputs/lint-results"] {
            fs::create_dir_all(project.join(dir)).unwrap();
        }
        fs::write(project.join("build/outputs/lint-results.xml"), "").unwrap();
        fs::create_dir_all(apk_dir(project)).unwrap();
        fs::write(apk_dir(project).join("org.demo.app-debug.apk"), "apk").unwrap();

        assert_eq!(clean(project).unwrap(), 4);
        assert!(!project.join("build/tmp").exists());
        assert!(!project.join("build/outputs/lint-results.xml").exists());

        let listed = list_outputs(project, "org.demo.app").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].1, 3);
    }
}
