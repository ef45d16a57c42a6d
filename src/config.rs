use crate::engine::EngineKind;
use crate::error::{ExtractError, Result};
use crate::registry::{LayerRegistry, Profile, DEFAULT_NAME_FIELD, DEFAULT_NAME_LAYERS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub extraction: ExtractionConfig,
    pub scan: ScanConfig,
    pub source: SourceConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub profile: Profile,
    /// Layers targeted by the names profile
    pub layers: Vec<String>,
    /// Text field filtered by the names profile
    pub field: String,
    pub output_name: Option<String>,
    /// Flatten output geometry to XY; unset means the profile default
    pub force_2d: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScanConfig {
    pub extension: String,
    pub exclude_dirs: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub follow_links: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceConfig {
    pub engine: EngineKind,
    /// Driver open options; unset means the profile default
    pub open_options: Option<Vec<String>>,
    pub wkt_precision: u8,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub archive: bool,
    /// Worker threads; 0 means one per logical CPU
    pub jobs: usize,
    pub report_path: Option<PathBuf>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            profile: Profile::Depth,
            layers: DEFAULT_NAME_LAYERS.iter().map(|l| l.to_string()).collect(),
            field: DEFAULT_NAME_FIELD.to_string(),
            output_name: None,
            force_2d: None,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extension: "000".to_string(),
            exclude_dirs: Vec::new(),
            exclude_patterns: Vec::new(),
            follow_links: false,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            engine: EngineKind::default(),
            open_options: None,
            wkt_precision: 8,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            archive: false,
            jobs: 1,
            report_path: None,
        }
    }
}

impl OutputConfig {
    pub fn effective_jobs(&self) -> usize {
        match self.jobs {
            0 => num_cpus::get(),
            n => n,
        }
    }
}

impl ExtractionConfig {
    pub fn effective_output_name(&self) -> String {
        self.output_name
            .clone()
            .unwrap_or_else(|| self.profile.default_output_name().to_string())
    }

    pub fn effective_force_2d(&self) -> bool {
        self.force_2d
            .unwrap_or_else(|| self.profile.default_force_2d())
    }

    pub fn build_registry(&self) -> Result<LayerRegistry> {
        LayerRegistry::for_profile(self.profile, &self.layers, &self.field)
    }
}

impl SourceConfig {
    pub fn effective_open_options(&self, profile: Profile) -> Vec<String> {
        if let Some(ref options) = self.open_options {
            return options.clone();
        }

        match profile {
            // Multipoint soundings become one row each, with Z exposed as DEPTH
            Profile::Depth => vec![
                "SPLIT_MULTIPOINT=ON".to_string(),
                "ADD_SOUNDG_DEPTH=ON".to_string(),
            ],
            Profile::Names => Vec::new(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ExtractError::Config {
                message: format!("Configuration file not found: {}", path.display()),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| ExtractError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ExtractError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })?;

        Ok(config)
    }

    pub fn load_with_defaults<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_file(path),
            None => {
                let default_paths = ["s57-extract.toml", ".s57-extract.toml"];

                for default_path in &default_paths {
                    if Path::new(default_path).exists() {
                        return Self::load_from_file(default_path);
                    }
                }

                Ok(Self::default())
            }
        }
    }

    pub fn merge_with_cli_args(&mut self, cli_args: &CliOverrides) {
        if let Some(profile) = cli_args.profile {
            self.extraction.profile = profile;
        }

        if let Some(ref layers) = cli_args.layers {
            self.extraction.layers = layers
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Some(ref field) = cli_args.field {
            self.extraction.field = field.trim().to_string();
        }

        if let Some(ref output_name) = cli_args.output_name {
            self.extraction.output_name = Some(output_name.clone());
        }

        if let Some(force_2d) = cli_args.force_2d {
            self.extraction.force_2d = Some(force_2d);
        }

        if let Some(engine) = cli_args.engine {
            self.source.engine = engine;
        }

        if let Some(jobs) = cli_args.jobs {
            self.output.jobs = jobs;
        }

        if cli_args.archive {
            self.output.archive = true;
        }

        if let Some(ref report_path) = cli_args.report_path {
            self.output.report_path = Some(report_path.clone());
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(|e| ExtractError::Config {
            message: format!("Failed to serialize config: {}", e),
        })?;

        std::fs::write(path, content).map_err(|e| ExtractError::Config {
            message: format!("Failed to write config file {}: {}", path.display(), e),
        })?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.extraction.build_registry()?;

        let output_name = self.extraction.effective_output_name();
        if output_name.trim().is_empty() {
            return Err(ExtractError::Config {
                message: "Output name cannot be empty".to_string(),
            });
        }

        if output_name.contains('/') || output_name.contains('\\') {
            return Err(ExtractError::Config {
                message: format!("Output name must not contain path separators: {}", output_name),
            });
        }

        if self.scan.extension.trim_start_matches('.').is_empty() {
            return Err(ExtractError::Config {
                message: "Scan extension cannot be empty".to_string(),
            });
        }

        for pattern in &self.scan.exclude_patterns {
            regex::Regex::new(pattern).map_err(|e| ExtractError::Config {
                message: format!("Invalid exclude pattern '{}': {}", pattern, e),
            })?;
        }

        let max_jobs = num_cpus::get() * 4;
        if self.output.jobs > max_jobs {
            return Err(ExtractError::Config {
                message: format!(
                    "Job count {} exceeds the limit of {} for this machine",
                    self.output.jobs, max_jobs
                ),
            });
        }

        Ok(())
    }

    pub fn create_sample_config() -> String {
        let mut sample_config = Self::default();
        sample_config.extraction.output_name = Some("depth".to_string());
        sample_config.extraction.force_2d = Some(true);
        toml::to_string_pretty(&sample_config).unwrap_or_else(|_| String::new())
    }
}

#[derive(Debug, Default)]
pub struct CliOverrides {
    pub profile: Option<Profile>,
    pub layers: Option<Vec<String>>,
    pub field: Option<String>,
    pub output_name: Option<String>,
    pub force_2d: Option<bool>,
    pub engine: Option<EngineKind>,
    pub jobs: Option<usize>,
    pub archive: bool,
    pub report_path: Option<PathBuf>,
}

impl CliOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(mut self, profile: Option<Profile>) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_layers(mut self, layers: Option<Vec<String>>) -> Self {
        self.layers = layers;
        self
    }

    pub fn with_field(mut self, field: Option<String>) -> Self {
        self.field = field;
        self
    }

    pub fn with_output_name(mut self, output_name: Option<String>) -> Self {
        self.output_name = output_name;
        self
    }

    pub fn with_force_2d(mut self, force_2d: Option<bool>) -> Self {
        self.force_2d = force_2d;
        self
    }

    pub fn with_engine(mut self, engine: Option<EngineKind>) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_jobs(mut self, jobs: Option<usize>) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn with_archive(mut self, archive: bool) -> Self {
        self.archive = archive;
        self
    }

    pub fn with_report_path(mut self, report_path: Option<PathBuf>) -> Self {
        self.report_path = report_path;
        self
    }
}
