pub mod archive;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod inspector;
pub mod logging;
pub mod pipeline;
pub mod query;
pub mod registry;
pub mod rowset;
pub mod scanner;
pub mod ui;

// Public API re-exports
pub use cli::{parse_args, Cli, OutputFormat};
pub use config::{CliOverrides, Config, ExtractionConfig, OutputConfig, ScanConfig, SourceConfig};
pub use error::{ExtractError, Result, UserFriendlyError};

// Core functionality re-exports
pub use archive::ArchivePacker;
pub use engine::{create_engine, CellSource, EngineKind, EngineSettings, VectorSourceEngine};
pub use export::{CsvExporter, TabularExporter, WriteMode};
pub use inspector::{CellInspector, CellPlan};
pub use pipeline::{ArchiveStatus, CellPreview, ExtractionPipeline, FileOutcome, FileRecord, RunReport};
pub use query::{CellQuery, QuerySynthesizer};
pub use registry::{ExtractionRule, LayerRegistry, Profile};
pub use rowset::{CellValue, RowSet};
pub use scanner::{CellFile, CellScanner, LevelCode};
pub use ui::{GracefulShutdown, OutputFormatter, OutputMode, ProgressManager};

use std::path::{Path, PathBuf};
use tokio::task;

/// Main library interface: one configured extraction run at a time.
pub struct S57Extract {
    config: Config,
    output_formatter: OutputFormatter,
    progress_manager: ProgressManager,
    shutdown: GracefulShutdown,
}

impl S57Extract {
    pub fn new(config: Config, output_mode: OutputMode, verbose: u8, quiet: bool) -> Result<Self> {
        let output_formatter = OutputFormatter::new(output_mode, verbose, quiet);
        let progress_manager = ProgressManager::new(!quiet && output_mode == OutputMode::Human);
        let shutdown = GracefulShutdown::new()?;

        Ok(Self {
            config,
            output_formatter,
            progress_manager,
            shutdown,
        })
    }

    /// No signal handler registration and no progress bars.
    pub fn new_for_test(config: Config, output_mode: OutputMode, verbose: u8, quiet: bool) -> Self {
        Self {
            config,
            output_formatter: OutputFormatter::new(output_mode, verbose, quiet),
            progress_manager: ProgressManager::new(false),
            shutdown: GracefulShutdown::new_for_test(),
        }
    }

    pub fn from_cli(cli_args: &Cli) -> Result<Self> {
        let config = cli_args.load_config()?;
        let output_mode = match cli_args.output_format {
            OutputFormat::Human => OutputMode::Human,
            OutputFormat::Json => OutputMode::Json,
            OutputFormat::Plain => OutputMode::Plain,
        };

        Self::new(config, output_mode, cli_args.verbose, cli_args.quiet)
    }

    /// Runs the whole pipeline, then the optional archive and report steps.
    pub async fn extract(&self, input_dir: &Path, output_dir: &Path) -> Result<RunReport> {
        self.shutdown.check_shutdown()?;
        cli::validate_paths(input_dir, output_dir)?;

        self.output_formatter.start_operation(&format!(
            "Extracting {} profile from {}",
            profile_name(self.config.extraction.profile),
            input_dir.display()
        ));

        let pipeline = ExtractionPipeline::from_config(&self.config, output_dir)?
            .with_running_flag(self.shutdown.running_flag());

        let cell_progress = self.progress_manager.create_cell_progress();
        let pb = cell_progress.clone();
        let input = input_dir.to_path_buf();

        let mut report = task::spawn_blocking(move || {
            let mut pipeline = pipeline;
            let on_file = |record: &FileRecord| ui::progress::update_cell_progress(&pb, record);
            pipeline.run(&input, Some(&on_file))
        })
        .await
        .map_err(|e| ExtractError::Config {
            message: format!("Extraction task failed: {}", e),
        })??;

        ui::progress::finish_cell_progress(&cell_progress, &report);
        self.progress_manager.clear();

        if self.config.output.archive {
            report.archive = self.archive_output(&report);
        }

        if let Some(ref report_path) = self.config.output.report_path {
            match report.save_json(report_path) {
                Ok(()) => self
                    .output_formatter
                    .info(&format!("Run report written to {}", report_path.display())),
                Err(e) => self
                    .output_formatter
                    .warning(&format!("Could not write run report: {}", e)),
            }
        }

        self.output_formatter.print_run_summary(&report);
        Ok(report)
    }

    /// Zips the CSV next to it. Failures are reported, never propagated.
    fn archive_output(&self, report: &RunReport) -> Option<ArchiveStatus> {
        if !report.output_created() {
            return None;
        }

        let csv_path = &report.output_path;
        let archive_path = csv_path.with_extension("zip");
        let entry_name = csv_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        match ArchivePacker::new().compress(csv_path, &archive_path, &entry_name) {
            Ok(_) => {
                self.output_formatter
                    .success(&format!("Archived to {}", archive_path.display()));
                Some(ArchiveStatus {
                    path: archive_path,
                    success: true,
                    message: None,
                })
            }
            Err(e) => {
                tracing::warn!(archive = %archive_path.display(), error = %e, "archive step failed");
                self.output_formatter.print_user_friendly_error(&e);
                Some(ArchiveStatus {
                    path: archive_path,
                    success: false,
                    message: Some(e.to_string()),
                })
            }
        }
    }

    /// Dry run: plans every cell, writes nothing.
    pub fn preview(&self, input_dir: &Path, output_dir: &Path) -> Result<Vec<CellPreview>> {
        let pipeline = ExtractionPipeline::from_config(&self.config, output_dir)?
            .with_running_flag(self.shutdown.running_flag());
        pipeline.preview(input_dir)
    }

    pub fn generate_sample_config<P: AsRef<Path>>(output_path: P) -> Result<()> {
        let sample_config = Config::create_sample_config();
        std::fs::write(output_path.as_ref(), sample_config)?;
        Ok(())
    }

    pub fn output_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(format!("{}.csv", self.config.extraction.effective_output_name()))
    }

    pub fn output_formatter(&self) -> &OutputFormatter {
        &self.output_formatter
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.is_running()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.request_shutdown();
    }

    pub fn handle_error(&self, error: &ExtractError) {
        self.output_formatter.print_user_friendly_error(error);
    }
}

fn profile_name(profile: Profile) -> &'static str {
    match profile {
        Profile::Depth => "depth",
        Profile::Names => "names",
    }
}

pub fn version_info() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: env!("CARGO_PKG_VERSION"),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown"),
        build_date: option_env!("BUILD_DATE").unwrap_or("unknown"),
        target: std::env::consts::ARCH.to_string(),
        gdal: cfg!(feature = "gdal"),
        parallel: cfg!(feature = "parallel"),
    }
}

#[derive(Debug, Clone)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub build_date: &'static str,
    pub target: String,
    pub gdal: bool,
    pub parallel: bool,
}

impl std::fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "s57-extract {} ({}) built on {} for {} [gdal: {}, parallel: {}]",
            self.version, self.git_hash, self.build_date, self.target, self.gdal, self.parallel
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn snapshot_config() -> Config {
        let mut config = Config::default();
        config.source.engine = EngineKind::Snapshot;
        config
    }

    fn write_land_cell(input: &Path) {
        fs::create_dir_all(input).unwrap();
        let cell = json!({"layers": {"LNDARE": {"features": [
            {"geometry": "POLYGON ((0 0, 1 0, 1 1, 0 0))"}
        ]}}});
        fs::write(input.join("US5XX01M.000"), cell.to_string()).unwrap();
    }

    #[tokio::test]
    async fn test_extract_with_archive_and_report() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("enc");
        let output = temp_dir.path().join("out");
        write_land_cell(&input);

        let mut config = snapshot_config();
        config.output.archive = true;
        config.output.report_path = Some(temp_dir.path().join("run.json"));
        let app = S57Extract::new_for_test(config, OutputMode::Plain, 0, true);

        let report = app.extract(&input, &output).await.unwrap();

        assert_eq!(report.rows_written, 1);
        assert!(output.join("depth.csv").exists());
        assert!(output.join("depth.zip").exists());
        assert!(report.archive.as_ref().unwrap().success);

        let saved: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(temp_dir.path().join("run.json")).unwrap())
                .unwrap();
        assert_eq!(saved["files_exported"], 1);
        assert_eq!(saved["files"][0]["outcome"], "exported");
    }

    #[tokio::test]
    async fn test_cancelled_run() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("enc");
        write_land_cell(&input);

        let app = S57Extract::new_for_test(snapshot_config(), OutputMode::Plain, 0, true);
        app.request_shutdown();

        let result = app.extract(&input, &temp_dir.path().join("out")).await;
        assert!(matches!(result, Err(ExtractError::Cancelled)));
        assert!(!app.is_running());
    }

    #[test]
    fn test_preview_and_output_path() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("enc");
        write_land_cell(&input);

        let app = S57Extract::new_for_test(snapshot_config(), OutputMode::Plain, 0, true);
        let previews = app.preview(&input, &temp_dir.path().join("out")).unwrap();

        assert_eq!(previews.len(), 1);
        assert_eq!(
            app.output_path(Path::new("out")),
            PathBuf::from("out").join("depth.csv")
        );
    }

    #[test]
    fn test_sample_config_generation() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("sample.toml");

        S57Extract::generate_sample_config(&config_path).unwrap();

        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("[extraction]"));
        assert!(content.contains("[scan]"));
        assert!(content.contains("[source]"));
        assert!(content.contains("[output]"));
        assert!(Config::load_from_file(&config_path).is_ok());
    }

    #[test]
    fn test_build_info_display() {
        let build_info = build_info();
        let display_string = build_info.to_string();
        assert!(display_string.contains("s57-extract"));
        assert!(display_string.contains(version_info()));
    }
}
