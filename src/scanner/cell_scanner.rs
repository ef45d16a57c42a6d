use crate::config::ScanConfig;
use crate::error::{ExtractError, Result};
use crate::scanner::file_filter::FileFilter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

const DEFAULT_LEVEL: char = '0';

/// Navigational purpose digit taken from a cell name (`US5XX01M` -> `5`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelCode(char);

impl LevelCode {
    pub fn new(code: char) -> Self {
        Self(code)
    }

    /// Third character of the file name, or `'0'` for names shorter than three characters.
    pub fn from_file_name(file_name: &str) -> Self {
        Self(file_name.chars().nth(2).unwrap_or(DEFAULT_LEVEL))
    }

    pub fn as_char(&self) -> char {
        self.0
    }
}

impl Default for LevelCode {
    fn default() -> Self {
        Self(DEFAULT_LEVEL)
    }
}

impl fmt::Display for LevelCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct CellFile {
    pub source_path: PathBuf,
    pub relative_path: PathBuf,
    pub filename: String,
    pub level: LevelCode,
}

impl CellFile {
    pub fn new(source_path: PathBuf, relative_path: PathBuf) -> Self {
        let filename = source_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_string();
        let level = LevelCode::from_file_name(&filename);

        Self {
            source_path,
            relative_path,
            filename,
            level,
        }
    }

    pub fn display_path(&self) -> String {
        self.source_path.display().to_string()
    }
}

pub struct CellScanner {
    filter: FileFilter,
    follow_links: bool,
}

impl CellScanner {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            filter: FileFilter::new(config),
            follow_links: config.follow_links,
        }
    }

    /// Starts a fresh traversal. Cells are yielded lazily in file-name order
    /// within each directory; a traversal error is yielded as `Err`.
    pub fn scan<P: AsRef<Path>>(&self, root: P) -> Result<CellFiles> {
        let root_path = root.as_ref();

        if !root_path.exists() {
            return Err(ExtractError::Scan {
                root: root_path.display().to_string(),
                message: "directory does not exist".to_string(),
            });
        }

        if !root_path.is_dir() {
            return Err(ExtractError::Scan {
                root: root_path.display().to_string(),
                message: "not a directory".to_string(),
            });
        }

        let filter = self.filter.clone();
        let predicate: EntryPredicate = Box::new(move |entry: &DirEntry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || filter.should_traverse_directory(entry.path())
        });

        let inner = WalkDir::new(root_path)
            .follow_links(self.follow_links)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(predicate);

        Ok(CellFiles {
            inner,
            filter: self.filter.clone(),
            root: root_path.to_path_buf(),
        })
    }
}

type EntryPredicate = Box<dyn FnMut(&DirEntry) -> bool + Send>;

/// Lazy sequence of cell files under one root.
pub struct CellFiles {
    inner: walkdir::FilterEntry<walkdir::IntoIter, EntryPredicate>,
    filter: FileFilter,
    root: PathBuf,
}

impl CellFiles {
    fn to_cell(&self, entry: &DirEntry) -> CellFile {
        let path = entry.path().to_path_buf();
        let relative_path = path
            .strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.clone());
        CellFile::new(path, relative_path)
    }
}

impl Iterator for CellFiles {
    type Item = Result<CellFile>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    return Some(Err(ExtractError::Scan {
                        root: self.root.display().to_string(),
                        message: err.to_string(),
                    }))
                }
            };

            if entry.file_type().is_file() && self.filter.is_cell_file(entry.path()) {
                return Some(Ok(self.to_cell(&entry)));
            }
        }
    }
}
