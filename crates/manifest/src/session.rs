//! Session directory layout under the host output root.

use std::io;
use std::path::{Path, PathBuf};

use gridsweep_core::sanitize::sanitize_session_name;

/// Subdirectory of the output root holding all sessions.
const BENCHMARKS_DIR: &str = "benchmarks";

/// Image subdirectory inside a session.
const IMAGES_DIR: &str = "images";

/// A named, persistent output scope.
///
/// Layout:
///
/// ```text
/// <output_root>/benchmarks/<session>/manifest.json
/// <output_root>/benchmarks/<session>/images/img_<ts>.webp
/// ```
#[derive(Debug, Clone)]
pub struct Session {
    name: String,
    base_dir: PathBuf,
    images_dir: PathBuf,
}

impl Session {
    /// Sanitize `raw_name` and create the session directories.
    pub fn open(output_root: &Path, raw_name: &str) -> io::Result<Self> {
        let name = sanitize_session_name(raw_name);
        let base_dir = output_root.join(BENCHMARKS_DIR).join(&name);
        let images_dir = base_dir.join(IMAGES_DIR);
        std::fs::create_dir_all(&images_dir)?;
        Ok(Self {
            name,
            base_dir,
            images_dir,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.base_dir.join("manifest.json")
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    /// Host view-endpoint URL for an image stored in this session.
    ///
    /// The node never serves files itself; `Cell.file` always points at
    /// the host's `/view` route.
    pub fn view_url(&self, filename: &str) -> String {
        format!(
            "/view?filename={filename}&type=output&subfolder={BENCHMARKS_DIR}/{}/{IMAGES_DIR}",
            self.name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_directories() {
        let root = tempfile::tempdir().unwrap();
        let session = Session::open(root.path(), "demo run!").unwrap();
        assert_eq!(session.name(), "demorun");
        assert!(session.images_dir().is_dir());
        assert!(session
            .manifest_path()
            .ends_with("benchmarks/demorun/manifest.json"));
    }

    #[test]
    fn view_url_references_host_endpoint() {
        let root = tempfile::tempdir().unwrap();
        let session = Session::open(root.path(), "s1").unwrap();
        assert_eq!(
            session.view_url("img_42.webp"),
            "/view?filename=img_42.webp&type=output&subfolder=benchmarks/s1/images"
        );
    }
}
