//! Launcher icon generation

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use kiwix_core::error::{Error, ErrorCode, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Launcher icon edge length per density bucket
pub const DENSITIES: [(&str, u32); 5] = [
    ("xxxhdpi", 192),
    ("xxhdpi", 144),
    ("xhdpi", 96),
    ("mdpi", 72),
    ("hdpi", 72),
];

/// Edge length of the titled icon in `res/drawable`
pub const TITLE_ICON_SIZE: u32 = 256;

fn image_error(path: &Path, err: image::ImageError) -> Error {
    Error::new(
        ErrorCode::BuildError,
        format!("Cannot process image {}: {}", path.display(), err),
    )
    .with_source(err)
}

fn save_resized(img: &DynamicImage, size: u32, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    img.resize_exact(size, size, FilterType::Lanczos3)
        .save_with_format(path, ImageFormat::Png)
        .map_err(|e| image_error(path, e))?;
    debug!(path = %path.display(), size, "icon written");
    Ok(())
}

/// Write the launcher, widget and titled icons of `project` from one
/// square source image
///
/// The source is also kept as `<work>/ic_launcher_512.png` for store use.
pub fn generate(source: &Path, project: &Path) -> Result<Vec<PathBuf>> {
    if !source.is_file() {
        return Err(Error::file_not_found(source));
    }
    let img = image::open(source).map_err(|e| image_error(source, e))?;

    let res = project.join("res");
    let mut written = Vec::new();
    for (density, size) in DENSITIES {
        let path = res
            .join(format!("mipmap-{}", density))
            .join("kiwix_icon.png");
        save_resized(&img, size, &path)?;
        written.push(path);

        let widget = res
            .join(format!("drawable-{}", density))
            .join("ic_kiwix_widget.png");
        save_resized(&img, size, &widget)?;
        written.push(widget);
    }

    let titled = res.join("drawable").join("kiwix_icon_with_title.png");
    save_resized(&img, TITLE_ICON_SIZE, &titled)?;
    written.push(titled);

    let kept = project.join("ic_launcher_512.png");
    fs::copy(source, &kept)?;
    written.push(kept);
    Ok(written)
}
