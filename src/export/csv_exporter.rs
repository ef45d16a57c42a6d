use super::{wkt, TabularExporter, WriteMode};
use crate::error::{ExtractError, Result};
use crate::registry::GEOMETRY_COLUMN;
use crate::rowset::RowSet;
use std::fs::{self, File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Writes `<output_dir>/<output_name>.csv`, comma separated with a header row.
pub struct CsvExporter {
    output_dir: PathBuf,
    output_name: String,
    force_2d: bool,
}

impl CsvExporter {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(output_dir: P, output_name: S, force_2d: bool) -> Self {
        Self {
            output_dir: output_dir.into(),
            output_name: output_name.into(),
            force_2d,
        }
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.csv", self.output_name))
    }

    fn open_for_create(&self, path: &Path) -> Result<File> {
        fs::create_dir_all(&self.output_dir)?;
        Ok(File::create(path)?)
    }

    fn open_for_append(&self, path: &Path, columns: &[String]) -> Result<File> {
        if !path.exists() {
            return Err(ExtractError::Export {
                message: format!("cannot append, {} does not exist", path.display()),
            });
        }

        let existing = read_header(path)?;
        if existing != columns {
            return Err(ExtractError::SchemaMismatch {
                expected: existing,
                found: columns.to_vec(),
            });
        }

        Ok(OpenOptions::new().append(true).open(path)?)
    }
}

impl TabularExporter for CsvExporter {
    fn export(&mut self, rows: &RowSet, mode: WriteMode) -> Result<usize> {
        let path = self.output_path();
        let file = match mode {
            WriteMode::Create => self.open_for_create(&path)?,
            WriteMode::Append => self.open_for_append(&path, rows.columns())?,
        };

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(BufWriter::new(file));

        if mode == WriteMode::Create {
            writer.write_record(rows.columns())?;
        }

        let geometry_index = rows.column_index(GEOMETRY_COLUMN);
        for row in rows.rows() {
            let record: Vec<String> = row
                .iter()
                .enumerate()
                .map(|(index, value)| {
                    let text = value.render();
                    if self.force_2d && Some(index) == geometry_index {
                        wkt::flatten_to_2d(&text)
                    } else {
                        text
                    }
                })
                .collect();
            writer.write_record(&record)?;
        }

        writer.flush()?;
        debug!(path = %path.display(), rows = rows.len(), ?mode, "rows exported");
        Ok(rows.len())
    }

    fn output_path(&self) -> PathBuf {
        CsvExporter::output_path(self)
    }
}

fn read_header(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    Ok(reader.headers()?.iter().map(str::to_string).collect())
}
