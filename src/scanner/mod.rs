pub mod cell_scanner;
pub mod file_filter;

pub use cell_scanner::{CellFile, CellFiles, CellScanner, LevelCode};
pub use file_filter::FileFilter;
