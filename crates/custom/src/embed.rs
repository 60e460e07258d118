//! Content embedding
//!
//! The ZIM file is shipped inside the APK as a fake native library, once per
//! architecture directory found under `libs/`. Entries are stored without
//! compression so the file can be mapped directly.

use kiwix_core::error::{Error, ErrorCode, Result};
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::Path;
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Archive name Gradle picks up once uncommented
pub const CONTENT_JAR: &str = "content-libs.jar";

fn zip_error(jar: &Path, err: zip::result::ZipError) -> Error {
    Error::new(
        ErrorCode::BuildError,
        format!("Cannot write {}: {}", jar.display(), err),
    )
    .with_source(err)
}

/// Architecture directories under `libs_dir`, sorted
pub fn arch_dirs(libs_dir: &Path) -> Result<Vec<String>> {
    if !libs_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut archs = Vec::new();
    for entry in fs::read_dir(libs_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            archs.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    archs.sort();
    Ok(archs)
}

/// Write `jar` holding `lib/<arch>/<entry_name>` for every architecture
///
/// Returns the entry names written.
pub fn build_content_jar(
    libs_dir: &Path,
    content: &Path,
    entry_name: &str,
    jar: &Path,
) -> Result<Vec<String>> {
    let archs = arch_dirs(libs_dir)?;
    if archs.is_empty() {
        return Err(Error::artifact_missing("native", libs_dir));
    }
    if !content.is_file() {
        return Err(Error::new(
            ErrorCode::ContentUnavailable,
            format!("Content file not found: {}", content.display()),
        ));
    }

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .large_file(true);
    let mut zip = ZipWriter::new(File::create(jar)?);
    let mut entries = Vec::new();
    for arch in &archs {
        let name = format!("lib/{}/{}", arch, entry_name);
        zip.start_file(name.clone(), options)
            .map_err(|e| zip_error(jar, e))?;
        io::copy(&mut BufReader::new(File::open(content)?), &mut zip)?;
        entries.push(name);
    }
    zip.finish().map_err(|e| zip_error(jar, e))?;

    info!(jar = %jar.display(), archs = archs.len(), "content embedded");
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_jar_has_one_stored_entry_per_arch() {
        let dir = tempfile::tempdir().unwrap();
        let libs = dir.path().join("libs");
        for arch in ["x86", "armeabi"] {
            fs::create_dir_all(libs.join(arch)).unwrap();
        }
        fs::write(libs.join("README"), "not an arch").unwrap();
        let content = dir.path().join("demo.zim");
        fs::write(&content, b"ZIM-CONTENT").unwrap();
        let jar = dir.path().join(CONTENT_JAR);

        let entries = build_content_jar(&libs, &content, "libcontent.so", &jar).unwrap();
        assert_eq!(
            entries,
            vec!["lib/armeabi/libcontent.so", "lib/x86/libcontent.so"]
        );

        let mut archive = zip::ZipArchive::new(File::open(&jar).unwrap()).unwrap();
        let mut entry = archive.by_name("lib/x86/libcontent.so").unwrap();
        assert_eq!(entry.compression(), CompressionMethod::Stored);
        let mut body = String::new();
        entry.read_to_string(&mut body).unwrap();
        assert_eq!(body, "ZIM-CONTENT");
    }

    #[test]
    fn test_no_native_libs() {
        let dir = tempfile::tempdir().unwrap();
        let content = dir.path().join("demo.zim");
        fs::write(&content, b"x").unwrap();
        let err = build_content_jar(
            &dir.path().join("libs"),
            &content,
            "libcontent.so",
            &dir.path().join(CONTENT_JAR),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::ArtifactMissing);
    }
}
