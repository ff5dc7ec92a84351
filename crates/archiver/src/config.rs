//! `ArchiverConfig`: data directory, download
//! concurrency, and the dev-mode flag, built with a `bon` builder.

use std::path::PathBuf;

use archiver_util::is_archiver_dev_mode_set;

pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 8;

#[derive(Debug, Clone)]
pub struct ArchiverConfig {
    pub data_dir: PathBuf,
    pub max_concurrent_downloads: usize,
    pub dev_mode: bool,
}

#[bon::bon]
impl ArchiverConfig {
    #[builder(finish_fn(name = "build"))]
    pub fn new(
        #[builder(start_fn)] data_dir: PathBuf,
        #[builder(default = DEFAULT_MAX_CONCURRENT_DOWNLOADS)] max_concurrent_downloads: usize,
        /// Overrides the `ARCHIVER_DEV_MODE` environment check, mainly for
        /// tests that want deterministic behavior either way.
        dev_mode: Option<bool>,
    ) -> Self {
        Self { data_dir, max_concurrent_downloads, dev_mode: dev_mode.unwrap_or_else(is_archiver_dev_mode_set) }
    }
}

impl ArchiverConfig {
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("archive.db")
    }

    pub fn files_root(&self) -> PathBuf {
        self.data_dir.join("files")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_max_concurrent_downloads_is_eight() {
        let cfg = ArchiverConfig::builder("/tmp/archiver".into()).build();
        assert_eq!(cfg.max_concurrent_downloads, 8);
    }

    #[test]
    fn db_and_files_paths_are_nested_under_data_dir() {
        let cfg = ArchiverConfig::builder(PathBuf::from("/data")).build();
        assert_eq!(cfg.db_path(), PathBuf::from("/data/archive.db"));
        assert_eq!(cfg.files_root(), PathBuf::from("/data/files"));
    }
}
