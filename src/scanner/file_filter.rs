use crate::config::ScanConfig;
use regex::Regex;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct FileFilter {
    extension: String,
    exclude_dirs: Vec<String>,
    exclude_patterns: Vec<Regex>,
}

impl FileFilter {
    pub fn new(config: &ScanConfig) -> Self {
        // Patterns are checked in Config::validate; anything invalid here is dropped
        let exclude_patterns = config
            .exclude_patterns
            .iter()
            .filter_map(|pattern| Regex::new(pattern).ok())
            .collect();

        Self {
            extension: config.extension.trim_start_matches('.').to_lowercase(),
            exclude_dirs: config
                .exclude_dirs
                .iter()
                .map(|d| d.to_lowercase())
                .collect(),
            exclude_patterns,
        }
    }

    /// Base cells only: `US5XX01M.000` matches, update files `.001`+ do not.
    pub fn is_cell_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| ext.to_lowercase() == self.extension)
    }

    pub fn should_traverse_directory(&self, path: &Path) -> bool {
        if let Some(dir_name) = path.file_name().and_then(|s| s.to_str()) {
            let dir_name_lower = dir_name.to_lowercase();
            if self.exclude_dirs.iter().any(|exclude| *exclude == dir_name_lower) {
                return false;
            }
        }

        let path_str = path.to_string_lossy();
        !self
            .exclude_patterns
            .iter()
            .any(|pattern| pattern.is_match(&path_str))
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn create_test_config() -> ScanConfig {
        ScanConfig {
            extension: ".000".to_string(),
            exclude_dirs: vec!["Archive".to_string()],
            exclude_patterns: vec![r".*/superseded/.*".to_string()],
            follow_links: false,
        }
    }

    #[test]
    fn test_cell_extension_match() {
        let filter = FileFilter::new(&create_test_config());

        assert_eq!(filter.extension(), "000");
        assert!(filter.is_cell_file(&PathBuf::from("ENC_ROOT/US5XX01M/US5XX01M.000")));
        assert!(filter.is_cell_file(&PathBuf::from("cells/GB4X0000.000")));
        assert!(!filter.is_cell_file(&PathBuf::from("cells/GB4X0000.001")));
        assert!(!filter.is_cell_file(&PathBuf::from("cells/CATALOG.031")));
        assert!(!filter.is_cell_file(&PathBuf::from("cells/README")));
    }

    #[test]
    fn test_directory_exclusion() {
        let filter = FileFilter::new(&create_test_config());

        assert!(filter.should_traverse_directory(&PathBuf::from("/data/ENC_ROOT")));
        assert!(!filter.should_traverse_directory(&PathBuf::from("/data/archive")));
        assert!(!filter.should_traverse_directory(&PathBuf::from("/data/superseded/2019")));
    }

    #[test]
    fn test_invalid_pattern_ignored() {
        let mut config = create_test_config();
        config.exclude_patterns = vec!["(".to_string()];
        let filter = FileFilter::new(&config);

        assert!(filter.should_traverse_directory(&PathBuf::from("/data/ENC_ROOT")));
    }
}
