use super::report::{CellPreview, FileOutcome, FileRecord, RunReport};
use crate::config::Config;
use crate::engine::{create_engine, EngineSettings, VectorSourceEngine};
use crate::error::{ExtractError, Result};
use crate::export::{CsvExporter, TabularExporter, WriteMode};
use crate::inspector::CellInspector;
use crate::query::QuerySynthesizer;
use crate::registry::LayerRegistry;
use crate::rowset::RowSet;
use crate::scanner::{CellFile, CellScanner};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub type FileCallback<'a> = &'a (dyn Fn(&FileRecord) + Sync);

/// Work done for one cell before it reaches the exporter.
enum Stage {
    Ready { rows: RowSet, layers: Vec<String> },
    Done(FileRecord),
}

#[derive(Debug, Default)]
struct RunState {
    /// No export has succeeded yet; the next one creates the output
    first_write: bool,
    processed: usize,
    exported: usize,
    skipped: usize,
    failed: usize,
    rows_written: usize,
    files: Vec<FileRecord>,
}

impl RunState {
    fn new() -> Self {
        Self {
            first_write: true,
            ..Self::default()
        }
    }

    fn record(&mut self, record: &FileRecord) {
        self.processed += 1;
        match record.outcome {
            FileOutcome::Exported => {
                self.exported += 1;
                self.rows_written += record.rows;
            }
            outcome if outcome.is_skipped() => self.skipped += 1,
            _ => self.failed += 1,
        }
        self.files.push(record.clone());
    }
}

/// Drives scan, inspect, synthesize, execute and export for every cell under a root.
pub struct ExtractionPipeline {
    engine: Box<dyn VectorSourceEngine>,
    registry: LayerRegistry,
    scanner: CellScanner,
    exporter: Box<dyn TabularExporter>,
    output_dir: PathBuf,
    inspector: CellInspector,
    synthesizer: QuerySynthesizer,
    jobs: usize,
    running: Option<Arc<AtomicBool>>,
}

impl ExtractionPipeline {
    pub fn new(
        engine: Box<dyn VectorSourceEngine>,
        registry: LayerRegistry,
        scanner: CellScanner,
        exporter: Box<dyn TabularExporter>,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            engine,
            registry,
            scanner,
            exporter,
            output_dir,
            inspector: CellInspector::new(),
            synthesizer: QuerySynthesizer::new(),
            jobs: 1,
            running: None,
        }
    }

    pub fn from_config(config: &Config, output_dir: &Path) -> Result<Self> {
        let profile = config.extraction.profile;
        let settings = EngineSettings {
            open_options: config.source.effective_open_options(profile),
            wkt_precision: config.source.wkt_precision,
        };

        let engine = create_engine(config.source.engine, settings)?;
        let registry = config.extraction.build_registry()?;
        let scanner = CellScanner::new(&config.scan);
        let exporter = CsvExporter::new(
            output_dir,
            config.extraction.effective_output_name(),
            config.extraction.effective_force_2d(),
        );

        Ok(Self::new(
            engine,
            registry,
            scanner,
            Box::new(exporter),
            output_dir.to_path_buf(),
        )
        .with_jobs(config.output.effective_jobs()))
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Stops the run between files once the flag turns false.
    pub fn with_running_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = Some(running);
        self
    }

    pub fn output_path(&self) -> PathBuf {
        self.exporter.output_path()
    }

    pub fn run(&mut self, root: &Path, on_file: Option<FileCallback<'_>>) -> Result<RunReport> {
        let started_at = Utc::now();
        let start = Instant::now();

        let cells = self.scanner.scan(root)?;
        self.reset_output(root)?;

        info!(
            root = %root.display(),
            engine = self.engine.name(),
            layers = %self.registry.layer_names().join(","),
            "extraction started"
        );

        let mut state = RunState::new();
        self.process(cells, &mut state, on_file)?;

        info!(
            processed = state.processed,
            exported = state.exported,
            skipped = state.skipped,
            failed = state.failed,
            rows = state.rows_written,
            "extraction finished"
        );

        Ok(RunReport {
            started_at,
            input_dir: root.to_path_buf(),
            output_path: self.output_path(),
            files_processed: state.processed,
            files_exported: state.exported,
            files_skipped: state.skipped,
            files_failed: state.failed,
            rows_written: state.rows_written,
            duration: start.elapsed(),
            files: state.files,
            archive: None,
        })
    }

    /// Plans every cell without touching the destination.
    pub fn preview(&self, root: &Path) -> Result<Vec<CellPreview>> {
        let mut previews = Vec::new();

        for cell in self.scanner.scan(root)? {
            let cell = cell?;
            self.check_running()?;

            let mut preview = CellPreview {
                path: cell.display_path(),
                level: cell.level,
                layers: Vec::new(),
                missing_fields: Vec::new(),
                sql: None,
                error: None,
            };

            match self.inspector.open(self.engine.as_ref(), &cell.source_path) {
                Ok(source) => {
                    let plan = self.inspector.inspect(source.as_ref(), &self.registry);
                    preview.layers = plan.layers();
                    preview.missing_fields = plan.missing_fields().to_vec();
                    preview.sql = self
                        .synthesizer
                        .synthesize(&plan, cell.level)
                        .map(|query| query.to_sql());
                }
                Err(e) => preview.error = Some(e.to_string()),
            }

            previews.push(preview);
        }

        Ok(previews)
    }

    fn process<I>(
        &mut self,
        cells: I,
        state: &mut RunState,
        on_file: Option<FileCallback<'_>>,
    ) -> Result<()>
    where
        I: Iterator<Item = Result<CellFile>>,
    {
        if self.jobs > 1 {
            return self.process_parallel(cells, state, on_file);
        }

        for cell in cells {
            let cell = cell?;
            self.check_running()?;

            let stage = self.prepare(&cell);
            let record = self.finish(&cell, stage, state);
            if let Some(callback) = on_file {
                callback(&record);
            }
        }

        Ok(())
    }

    #[cfg(not(feature = "parallel"))]
    fn process_parallel<I>(
        &mut self,
        cells: I,
        state: &mut RunState,
        on_file: Option<FileCallback<'_>>,
    ) -> Result<()>
    where
        I: Iterator<Item = Result<CellFile>>,
    {
        warn!(
            jobs = self.jobs,
            "built without the `parallel` feature, processing cells sequentially"
        );
        self.jobs = 1;
        self.process(cells, state, on_file)
    }

    /// Cells are prepared on the pool in batches; exports replay in scan order.
    /// A scan error ends the batch: the cells before it are still exported,
    /// as in a sequential run, then the error is returned.
    #[cfg(feature = "parallel")]
    fn process_parallel<I>(
        &mut self,
        mut cells: I,
        state: &mut RunState,
        on_file: Option<FileCallback<'_>>,
    ) -> Result<()>
    where
        I: Iterator<Item = Result<CellFile>>,
    {
        use rayon::prelude::*;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .build()
            .map_err(|e| ExtractError::Config {
                message: format!("Failed to build worker pool: {}", e),
            })?;
        let batch_size = self.jobs * 4;

        loop {
            self.check_running()?;

            let mut batch = Vec::with_capacity(batch_size);
            let mut scan_error = None;
            for entry in cells.by_ref().take(batch_size) {
                match entry {
                    Ok(cell) => batch.push(cell),
                    Err(e) => {
                        scan_error = Some(e);
                        break;
                    }
                }
            }

            if batch.is_empty() {
                return scan_error.map_or(Ok(()), Err);
            }

            let this = &*self;
            let stages: Vec<Stage> =
                pool.install(|| batch.par_iter().map(|cell| this.prepare(cell)).collect());

            for (cell, stage) in batch.iter().zip(stages) {
                self.check_running()?;
                let record = self.finish(cell, stage, state);
                if let Some(callback) = on_file {
                    callback(&record);
                }
            }

            if let Some(e) = scan_error {
                return Err(e);
            }
        }
    }

    /// Open, inspect, synthesize and execute. Never fails; errors become records.
    fn prepare(&self, cell: &CellFile) -> Stage {
        let path = cell.display_path();
        info!(path = %path, level = %cell.level, "processing cell");

        let source = match self.inspector.open(self.engine.as_ref(), &cell.source_path) {
            Ok(source) => source,
            Err(e) => {
                warn!(path = %path, error = %e, "cannot open cell, skipping");
                return Stage::Done(
                    FileRecord::new(cell, FileOutcome::SkippedOpenFailure).with_message(e.to_string()),
                );
            }
        };

        let plan = self.inspector.inspect(source.as_ref(), &self.registry);
        let Some(query) = self.synthesizer.synthesize(&plan, cell.level) else {
            if plan.missing_fields().is_empty() {
                info!(path = %path, "no target layers, skipping");
                return Stage::Done(FileRecord::new(cell, FileOutcome::SkippedEmpty));
            }

            let missing: Vec<String> = plan
                .missing_fields()
                .iter()
                .map(|m| format!("{}.{}", m.layer, m.field))
                .collect();
            return Stage::Done(
                FileRecord::new(cell, FileOutcome::SkippedFieldMissing)
                    .with_message(format!("missing fields: {}", missing.join(", "))),
            );
        };

        let layers = plan.layers();
        debug!(path = %path, sql = %query.to_sql(), "cell query");

        match source.execute(&query) {
            Ok(rows) => Stage::Ready { rows, layers },
            Err(e) => {
                warn!(path = %path, error = %e, "query failed, skipping");
                Stage::Done(
                    FileRecord::new(cell, FileOutcome::ExportFailed)
                        .with_layers(layers)
                        .with_message(e.to_string()),
                )
            }
        }
    }

    fn finish(&mut self, cell: &CellFile, stage: Stage, state: &mut RunState) -> FileRecord {
        let record = match stage {
            Stage::Done(record) => record,
            Stage::Ready { rows, layers } => {
                let mode = if state.first_write {
                    WriteMode::Create
                } else {
                    WriteMode::Append
                };

                match self.exporter.export(&rows, mode) {
                    Ok(written) => {
                        state.first_write = false;
                        info!(path = %cell.display_path(), rows = written, layers = %layers.join(","), "cell exported");
                        FileRecord::new(cell, FileOutcome::Exported)
                            .with_layers(layers)
                            .with_rows(written)
                    }
                    Err(e) => {
                        warn!(path = %cell.display_path(), error = %e, "export failed, skipping");
                        FileRecord::new(cell, FileOutcome::ExportFailed)
                            .with_layers(layers)
                            .with_message(e.to_string())
                    }
                }
            }
        };

        state.record(&record);
        record
    }

    /// Removes a previous destination. Refuses when it would remove the input.
    fn reset_output(&self, root: &Path) -> Result<()> {
        if !self.output_dir.exists() {
            return Ok(());
        }

        let output = fs::canonicalize(&self.output_dir)?;
        let input = fs::canonicalize(root)?;
        if input.starts_with(&output) {
            return Err(ExtractError::InvalidPath {
                path: format!(
                    "output directory {} contains the input directory",
                    self.output_dir.display()
                ),
            });
        }

        debug!(path = %self.output_dir.display(), "removing previous output directory");
        fs::remove_dir_all(&self.output_dir)?;
        Ok(())
    }

    fn check_running(&self) -> Result<()> {
        match &self.running {
            Some(running) if !running.load(Ordering::SeqCst) => Err(ExtractError::Cancelled),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::registry::Profile;
    use serde_json::json;
    use tempfile::TempDir;

    fn snapshot_config(profile: Profile) -> Config {
        let mut config = Config::default();
        config.source.engine = crate::engine::EngineKind::Snapshot;
        config.extraction.profile = profile;
        config
    }

    fn write_cell(dir: &Path, name: &str, cell: serde_json::Value) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(name), cell.to_string()).unwrap();
    }

    fn polygon(n: u32) -> String {
        format!("POLYGON (({n} 0, {n} 1, {m} 1, {n} 0))", n = n, m = n + 1)
    }

    fn run(config: &Config, input: &Path, output: &Path) -> RunReport {
        ExtractionPipeline::from_config(config, output)
            .unwrap()
            .run(input, None)
            .unwrap()
    }

    #[test]
    fn test_land_only_cell() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("enc");
        let output = temp_dir.path().join("out");
        write_cell(
            &input,
            "US5XX01M.000",
            json!({"layers": {"LNDARE": {"features": [{"geometry": polygon(0)}]}}}),
        );

        let report = run(&snapshot_config(Profile::Depth), &input, &output);

        assert_eq!(report.files_exported, 1);
        assert_eq!(report.rows_written, 1);
        let content = fs::read_to_string(output.join("depth.csv")).unwrap();
        assert_eq!(
            content,
            "WKT,LAYERS,DEPTH\n\"POLYGON ((0 0, 0 1, 1 1, 0 0))\",LNDARE,-1\n"
        );
    }

    #[test]
    fn test_rows_accumulate_across_cells() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("enc");
        let output = temp_dir.path().join("out");
        write_cell(
            &input,
            "US5AA01M.000",
            json!({"layers": {"DEPARE": {"fields": ["DRVAL1", "DRVAL2"], "features": [
                {"geometry": polygon(0), "attributes": {"DRVAL1": 0.0, "DRVAL2": 2.0}},
                {"geometry": polygon(1), "attributes": {"DRVAL1": null, "DRVAL2": 5.0}},
                {"geometry": polygon(2), "attributes": {"DRVAL1": 5.0, "DRVAL2": 10.0}}
            ]}}}),
        );
        write_cell(
            &input,
            "US5BB01M.000",
            json!({"layers": {"DEPARE": {"fields": ["DRVAL1"], "features": [
                {"geometry": polygon(3), "attributes": {"DRVAL1": 10.0}},
                {"geometry": polygon(4), "attributes": {"DRVAL1": 20.0}}
            ]}}}),
        );

        let report = run(&snapshot_config(Profile::Depth), &input, &output);

        assert_eq!(report.files_exported, 2);
        assert_eq!(report.rows_written, 4);
        let content = fs::read_to_string(output.join("depth.csv")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "WKT,LAYERS,DEPTH");
        assert!(lines[1].ends_with(",DEPARE,0"));
        assert!(lines[4].ends_with(",DEPARE,20"));
    }

    #[test]
    fn test_empty_input_creates_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("enc");
        let output = temp_dir.path().join("out");
        fs::create_dir_all(&input).unwrap();
        fs::create_dir_all(&output).unwrap();
        fs::write(output.join("depth.csv"), "stale").unwrap();

        let report = run(&snapshot_config(Profile::Depth), &input, &output);

        assert_eq!(report.files_processed, 0);
        assert!(!report.output_created());
        assert!(!output.exists());
    }

    #[test]
    fn test_skips_are_counted_not_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("enc");
        let output = temp_dir.path().join("out");
        write_cell(&input, "US1BAD01.000", json!("not a cell"));
        write_cell(
            &input,
            "US2EMP01.000",
            json!({"layers": {"COALNE": {"features": [{"geometry": "LINESTRING (0 0, 1 1)"}]}}}),
        );
        write_cell(
            &input,
            "US3FLD01.000",
            json!({"layers": {"DEPARE": {"fields": ["DRVAL2"], "features": []}}}),
        );
        write_cell(
            &input,
            "US4OK001.000",
            json!({"layers": {"WRECKS": {"features": [
                {"geometry": "POINT (1 2)", "attributes": {"VALSOU": 12.5}}
            ]}}}),
        );

        let report = run(&snapshot_config(Profile::Depth), &input, &output);

        let outcomes: Vec<FileOutcome> = report.files.iter().map(|f| f.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                FileOutcome::SkippedOpenFailure,
                FileOutcome::SkippedEmpty,
                FileOutcome::SkippedFieldMissing,
                FileOutcome::Exported,
            ]
        );
        assert_eq!(report.files_skipped, 3);
        assert_eq!(report.files_exported, 1);
        assert_eq!(
            fs::read_to_string(output.join("depth.csv")).unwrap(),
            "WKT,LAYERS,DEPTH\nPOINT (1 2),WRECKS,12.5\n"
        );
    }

    #[test]
    fn test_names_profile_level_column() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("enc");
        let output = temp_dir.path().join("out");
        write_cell(
            &input,
            "FR3NAM01.000",
            json!({"layers": {"SEAARE": {"fields": ["NOBJNM"], "features": [
                {"geometry": "POINT Z (1 2 3)", "attributes": {"NOBJNM": "Rade de Brest"}},
                {"geometry": "POINT (3 4)", "attributes": {"NOBJNM": ""}}
            ]}}}),
        );

        let mut config = snapshot_config(Profile::Names);
        config.extraction.layers = vec!["SEAARE".to_string()];
        let report = run(&config, &input, &output);

        assert_eq!(report.rows_written, 1);
        assert_eq!(
            fs::read_to_string(output.join("nobjnm.csv")).unwrap(),
            "WKT,LEVEL,LAYERS,NOBJNM\nPOINT Z (1 2 3),3,SEAARE,Rade de Brest\n"
        );
    }

    #[test]
    fn test_schema_mismatch_is_per_file_failure() {
        struct FixedColumns;

        impl crate::engine::VectorSourceEngine for FixedColumns {
            fn name(&self) -> &'static str {
                "fixed"
            }

            fn open(&self, path: &Path) -> Result<Box<dyn crate::engine::CellSource>> {
                let text = fs::read_to_string(path)?;
                let snapshot = crate::engine::CellSnapshot::from_json(&text).map_err(|e| {
                    ExtractError::CellOpen {
                        path: path.display().to_string(),
                        message: e.to_string(),
                    }
                })?;
                Ok(Box::new(snapshot))
            }
        }

        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("enc");
        let output = temp_dir.path().join("out");
        write_cell(
            &input,
            "US5AA01M.000",
            json!({"layers": {"SEAARE": {"features": [
                {"geometry": "POINT (0 0)", "attributes": {"NOBJNM": "A"}}
            ]}}}),
        );
        write_cell(
            &input,
            "US5BB01M.000",
            json!({"layers": {"LNDARE": {"features": [
                {"geometry": "POINT (1 1)", "attributes": {"NOBJNM": "B"}}
            ]}}}),
        );

        // Mixed rule shapes; `ExtractionPipeline::new` does not validate the registry
        let mut registry = LayerRegistry::new();
        registry
            .insert("SEAARE", crate::registry::ExtractionRule::FieldFilter("NOBJNM".to_string()))
            .unwrap();
        registry
            .insert("LNDARE", crate::registry::ExtractionRule::Constant(-1.0))
            .unwrap();

        let mut pipeline = ExtractionPipeline::new(
            Box::new(FixedColumns),
            registry,
            CellScanner::new(&Config::default().scan),
            Box::new(CsvExporter::new(&output, "mixed", false)),
            output.clone(),
        );
        let report = pipeline.run(&input, None).unwrap();

        assert_eq!(report.files_exported, 1);
        assert_eq!(report.files_failed, 1);
        let failed = &report.files[1];
        assert_eq!(failed.outcome, FileOutcome::ExportFailed);
        assert!(failed.message.as_deref().unwrap().contains("schema mismatch"));
        assert_eq!(
            fs::read_to_string(output.join("mixed.csv")).unwrap(),
            "WKT,LEVEL,LAYERS,NOBJNM\nPOINT (0 0),5,SEAARE,A\n"
        );
    }

    #[test]
    fn test_rerun_is_byte_identical() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("enc");
        let output = temp_dir.path().join("out");
        for (dir, name, depth) in [("b", "US5BB01M.000", 4.0), ("a", "US5AA01M.000", 2.5)] {
            write_cell(
                &input.join(dir),
                name,
                json!({"layers": {
                    "LNDARE": {"features": [{"geometry": polygon(0)}]},
                    "OBSTRN": {"features": [{"geometry": "POINT (1 1)", "attributes": {"VALSOU": depth}}]}
                }}),
            );
        }

        let config = snapshot_config(Profile::Depth);
        run(&config, &input, &output);
        let first = fs::read(output.join("depth.csv")).unwrap();
        run(&config, &input, &output);
        let second = fs::read(output.join("depth.csv")).unwrap();

        assert_eq!(first, second);
        let text = String::from_utf8(first).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[2], "POINT (1 1),OBSTRN,2.5");
        assert_eq!(lines[4], "POINT (1 1),OBSTRN,4");
    }

    #[test]
    fn test_land_rows_ignore_feature_attributes() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("enc");
        let output = temp_dir.path().join("out");
        write_cell(
            &input,
            "US5LND01.000",
            json!({"layers": {"LNDARE": {"features": [
                {"geometry": "POINT (0 0)", "attributes": {"DEPTH": 42, "DRVAL1": 7}},
                {"geometry": "POINT (1 1)", "attributes": {"DEPTH": null}}
            ]}}}),
        );

        let report = run(&snapshot_config(Profile::Depth), &input, &output);

        assert_eq!(report.rows_written, 2);
        assert_eq!(
            fs::read_to_string(output.join("depth.csv")).unwrap(),
            "WKT,LAYERS,DEPTH\nPOINT (0 0),LNDARE,-1\nPOINT (1 1),LNDARE,-1\n"
        );
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_run_matches_sequential() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("enc");
        for n in 0..37u32 {
            let name = format!("US5C{:04}.000", n);
            if n % 5 == 0 {
                fs::create_dir_all(&input).unwrap();
                fs::write(input.join(&name), "{ truncated").unwrap();
                continue;
            }
            write_cell(
                &input,
                &name,
                json!({"layers": {
                    "LNDARE": {"features": [{"geometry": polygon(n)}]},
                    "DEPARE": {"features": [
                        {"geometry": polygon(n + 1), "attributes": {"DRVAL1": f64::from(n) / 2.0}},
                        {"geometry": polygon(n + 2), "attributes": {"DRVAL1": null}}
                    ]}
                }}),
            );
        }

        let config = snapshot_config(Profile::Depth);
        let sequential_out = temp_dir.path().join("seq");
        let sequential = run(&config, &input, &sequential_out);

        let parallel_out = temp_dir.path().join("par");
        let parallel = ExtractionPipeline::from_config(&config, &parallel_out)
            .unwrap()
            .with_jobs(4)
            .run(&input, None)
            .unwrap();

        assert_eq!(
            fs::read(sequential_out.join("depth.csv")).unwrap(),
            fs::read(parallel_out.join("depth.csv")).unwrap()
        );
        assert_eq!(parallel.files_processed, 37);
        assert_eq!(parallel.files_skipped, 8);
        assert_eq!(parallel.files_processed, sequential.files_processed);
        assert_eq!(parallel.files_exported, sequential.files_exported);
        assert_eq!(parallel.files_skipped, sequential.files_skipped);
        assert_eq!(parallel.files_failed, sequential.files_failed);
        assert_eq!(parallel.rows_written, sequential.rows_written);
        let paths = |report: &RunReport| -> Vec<String> {
            report.files.iter().map(|f| f.path.clone()).collect()
        };
        assert_eq!(paths(&parallel), paths(&sequential));
    }

    #[test]
    fn test_scan_error_keeps_earlier_exports() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("enc");
        for name in ["US5AA01M.000", "US5BB01M.000"] {
            write_cell(
                &input,
                name,
                json!({"layers": {"LNDARE": {"features": [{"geometry": "POINT (0 0)"}]}}}),
            );
        }
        let cell = |name: &str| CellFile::new(input.join(name), PathBuf::from(name));

        for jobs in [1, 4] {
            let output = temp_dir.path().join(format!("out{}", jobs));
            let mut pipeline =
                ExtractionPipeline::from_config(&snapshot_config(Profile::Depth), &output)
                    .unwrap()
                    .with_jobs(jobs);
            let cells = vec![
                Ok(cell("US5AA01M.000")),
                Err(ExtractError::Scan {
                    root: input.display().to_string(),
                    message: "permission denied".to_string(),
                }),
                Ok(cell("US5BB01M.000")),
            ];

            let mut state = RunState::new();
            let result = pipeline.process(cells.into_iter(), &mut state, None);

            assert!(matches!(result, Err(ExtractError::Scan { .. })));
            assert_eq!(state.processed, 1);
            assert_eq!(state.exported, 1);
            assert_eq!(
                fs::read_to_string(output.join("depth.csv")).unwrap(),
                "WKT,LAYERS,DEPTH\nPOINT (0 0),LNDARE,-1\n"
            );
        }
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let mut pipeline =
            ExtractionPipeline::from_config(&snapshot_config(Profile::Depth), temp_dir.path())
                .unwrap();
        let result = pipeline.run(&temp_dir.path().join("missing"), None);
        assert!(matches!(result, Err(ExtractError::Scan { .. })));
    }

    #[test]
    fn test_output_containing_input_is_refused() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("enc");
        fs::create_dir_all(&input).unwrap();

        let mut pipeline =
            ExtractionPipeline::from_config(&snapshot_config(Profile::Depth), temp_dir.path())
                .unwrap();
        let result = pipeline.run(&input, None);

        assert!(matches!(result, Err(ExtractError::InvalidPath { .. })));
        assert!(input.exists());
    }

    #[test]
    fn test_cancelled_before_first_file() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("enc");
        write_cell(
            &input,
            "US5XX01M.000",
            json!({"layers": {"LNDARE": {"features": [{"geometry": polygon(0)}]}}}),
        );

        let running = Arc::new(AtomicBool::new(false));
        let mut pipeline = ExtractionPipeline::from_config(
            &snapshot_config(Profile::Depth),
            &temp_dir.path().join("out"),
        )
        .unwrap()
        .with_running_flag(running);

        let result = pipeline.run(&input, None);
        assert!(matches!(result, Err(ExtractError::Cancelled)));
    }

    #[test]
    fn test_callback_sees_every_file() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("enc");
        write_cell(&input, "US5AA01M.000", json!({}));
        write_cell(&input, "US5BB01M.000", json!({}));

        let seen = std::sync::Mutex::new(Vec::new());
        let callback = |record: &FileRecord| seen.lock().unwrap().push(record.path.clone());

        let mut pipeline = ExtractionPipeline::from_config(
            &snapshot_config(Profile::Depth),
            &temp_dir.path().join("out"),
        )
        .unwrap();
        pipeline.run(&input, Some(&callback)).unwrap();

        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_preview_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("enc");
        let output = temp_dir.path().join("out");
        write_cell(
            &input,
            "US5XX01M.000",
            json!({"layers": {"LNDARE": {"features": [{"geometry": polygon(0)}]}}}),
        );
        fs::create_dir_all(&output).unwrap();

        let pipeline =
            ExtractionPipeline::from_config(&snapshot_config(Profile::Depth), &output).unwrap();
        let previews = pipeline.preview(&input).unwrap();

        assert_eq!(previews.len(), 1);
        assert_eq!(previews[0].layers, vec!["LNDARE"]);
        assert!(previews[0].sql.as_deref().unwrap().contains("FROM \"LNDARE\""));
        assert!(output.exists());
    }
}
