use crate::pipeline::{FileOutcome, FileRecord, RunReport};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

pub struct ProgressManager {
    multi_progress: MultiProgress,
    enabled: bool,
}

impl ProgressManager {
    pub fn new(enabled: bool) -> Self {
        Self {
            multi_progress: MultiProgress::new(),
            enabled,
        }
    }

    /// The scan is lazy, so cells are counted rather than shown against a total.
    pub fn create_cell_progress(&self) -> ProgressBar {
        if !self.enabled {
            return ProgressBar::hidden();
        }

        let pb = self.multi_progress.add(ProgressBar::new_spinner());
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {pos:>5} cells {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        pb.set_message("Scanning...");
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn clear(&self) {
        if self.enabled {
            self.multi_progress.clear().ok();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

pub fn update_cell_progress(pb: &ProgressBar, record: &FileRecord) {
    pb.inc(1);

    let name = record
        .path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(record.path.as_str());

    match record.outcome {
        FileOutcome::Exported => pb.set_message(format!("{} (+{} rows)", name, record.rows)),
        other => pb.set_message(format!("{} ({})", name, other.label())),
    }
}

pub fn finish_cell_progress(pb: &ProgressBar, report: &RunReport) {
    let final_message = format!(
        "{} rows from {} cells (completed in {})",
        report.rows_written,
        report.files_exported,
        format_duration(report.duration)
    );
    pb.finish_with_message(final_message);
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{}s", secs)
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::CellFile;
    use std::path::PathBuf;

    #[test]
    fn test_progress_manager_creation() {
        let manager = ProgressManager::new(true);
        assert!(manager.is_enabled());

        let disabled_manager = ProgressManager::new(false);
        assert!(!disabled_manager.is_enabled());
    }

    #[test]
    fn test_disabled_progress_bar_is_hidden() {
        let manager = ProgressManager::new(false);
        assert!(manager.create_cell_progress().is_hidden());
    }

    #[test]
    fn test_update_counts_cells() {
        let pb = ProgressBar::hidden();
        let cell = CellFile::new(
            PathBuf::from("enc/US5XX01M.000"),
            PathBuf::from("US5XX01M.000"),
        );

        update_cell_progress(&pb, &FileRecord::new(&cell, FileOutcome::Exported).with_rows(3));
        update_cell_progress(&pb, &FileRecord::new(&cell, FileOutcome::SkippedEmpty));

        assert_eq!(pb.position(), 2);
        assert_eq!(pb.message(), "US5XX01M.000 (no target layers)");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
    }
}
