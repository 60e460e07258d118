//! Reading the application package from `AndroidManifest.xml`

use kiwix_core::error::{Error, ErrorCode, Result};
use regex::Regex;
use std::path::Path;

const MANIFEST_PACKAGE: &str = r#"(?s)<manifest\b[^>]*?\bpackage\s*=\s*"([^"]*)""#;

/// Package declared by the last `<manifest>` element of the project
pub fn find_package(project_dir: &Path) -> Result<String> {
    let path = project_dir.join("AndroidManifest.xml");
    if !path.is_file() {
        return Err(Error::file_not_found(&path));
    }
    let content = std::fs::read_to_string(&path)?;
    package_of(&content)?.ok_or_else(|| {
        Error::new(
            ErrorCode::MissingPrerequisite,
            format!("No package declared in {}", path.display()),
        )
    })
}

/// Package attribute of the last `<manifest>` element in `xml`
pub fn package_of(xml: &str) -> Result<Option<String>> {
    let re = Regex::new(MANIFEST_PACKAGE)?;
    Ok(re
        .captures_iter(xml)
        .last()
        .map(|c| c[1].trim().to_string()))
}
