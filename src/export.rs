//! Caption export — verbatim UTF-8 text written to a user-chosen path.

use std::path::Path;

use thiserror::Error;

/// Errors that can occur while exporting a caption.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The destination could not be written.
    #[error("could not write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Write `caption` to `dest` as UTF-8, no transformation, no trailing
/// newline.
pub fn write_caption(dest: &Path, caption: &str) -> Result<(), ExportError> {
    std::fs::write(dest, caption).map_err(|source| ExportError::Write {
        path: dest.display().to_string(),
        source,
    })?;
    log::info!("caption exported to {}", dest.display());
    Ok(())
}

/// Suggested export file name for the image at `image_path`:
/// `<stem>_caption.txt`, or `caption.txt` when no stem is available.
pub fn suggested_file_name(image_path: Option<&Path>) -> String {
    image_path
        .and_then(|p| p.file_stem())
        .and_then(|s| s.to_str())
        .map(|stem| format!("{stem}_caption.txt"))
        .unwrap_or_else(|| "caption.txt".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_caption_verbatim() {
        let dir = tempdir().expect("temp dir");
        let dest = dir.path().join("photo_caption.txt");

        write_caption(&dest, "a red square").expect("export");

        let content = std::fs::read_to_string(&dest).expect("read back");
        assert_eq!(content, "a red square");
    }

    #[test]
    fn preserves_non_ascii_text() {
        let dir = tempdir().expect("temp dir");
        let dest = dir.path().join("caption.txt");

        write_caption(&dest, "ein roter Würfel — 赤い四角").expect("export");

        let content = std::fs::read_to_string(&dest).expect("read back");
        assert_eq!(content, "ein roter Würfel — 赤い四角");
    }

    #[test]
    fn unwritable_destination_is_write_error() {
        let dir = tempdir().expect("temp dir");
        let dest = dir.path().join("missing-subdir").join("caption.txt");

        let err = write_caption(&dest, "text").unwrap_err();
        assert!(err.to_string().contains("missing-subdir"));
    }

    #[test]
    fn suggested_name_uses_image_stem() {
        let name = suggested_file_name(Some(Path::new("/photos/holiday.jpg")));
        assert_eq!(name, "holiday_caption.txt");
    }

    #[test]
    fn suggested_name_falls_back_without_image() {
        assert_eq!(suggested_file_name(None), "caption.txt");
    }
}
