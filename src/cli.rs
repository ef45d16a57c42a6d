use crate::config::{CliOverrides, Config};
use crate::engine::EngineKind;
use crate::error::{ExtractError, Result};
use crate::registry::Profile;
use clap::{Parser, ValueEnum};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "s57-extract")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Extract depth and object-name attributes from S-57 chart cells into one CSV")]
#[command(
    long_about = "s57-extract walks a directory tree of S-57 base cells (*.000), pulls the \
                  target layers of each cell through one UNION ALL query and appends the rows \
                  to a single cumulative CSV file."
)]
#[command(after_help = "EXAMPLES:\n  \
    s57-extract -i ENC_ROOT -o out\n  \
    s57-extract -i ENC_ROOT -o out --profile names --layers LNDARE,SEAARE --field NOBJNM\n  \
    s57-extract -i ENC_ROOT -o out -n soundings --archive --report run.json\n  \
    s57-extract -i ENC_ROOT -o out --dry-run -v")]
pub struct Cli {
    /// Directory searched recursively for cell files
    #[arg(short, long, required_unless_present = "generate_config")]
    pub input_dir: Option<PathBuf>,

    /// Destination directory; removed and recreated on every run
    #[arg(short, long, required_unless_present = "generate_config")]
    pub output_dir: Option<PathBuf>,

    /// Output file stem (defaults to depth or nobjnm per profile)
    #[arg(short = 'n', long)]
    pub output_name: Option<String>,

    /// Layer registry to use
    #[arg(short, long, value_enum)]
    pub profile: Option<Profile>,

    /// Layers for the names profile (comma-separated or repeated)
    #[arg(short, long, value_delimiter = ',', num_args = 1..)]
    pub layers: Option<Vec<String>>,

    /// Text field for the names profile
    #[arg(short, long)]
    pub field: Option<String>,

    /// Flatten output geometry to XY
    #[arg(long, value_name = "BOOL")]
    pub force_2d: Option<bool>,

    /// Source engine used to open cells
    #[arg(long, value_enum)]
    pub engine: Option<EngineKind>,

    /// Worker threads for open/query (needs the `parallel` feature)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Zip the finished CSV next to it
    #[arg(long)]
    pub archive: bool,

    /// Write the run report as JSON to this path
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long, help = "Path to TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Output format for results
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Verbose output level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-essential output)
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Print the per-cell plan and SQL without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Generate sample configuration file
    #[arg(long, help = "Generate a sample configuration file")]
    pub generate_config: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON formatted output
    Json,
    /// Plain text output
    Plain,
}

/// Parses arguments without exiting, so the binary decides the exit code.
pub fn parse_args<I, T>(args: I) -> std::result::Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Cli::try_parse_from(args)
}

impl Cli {
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load_with_defaults(self.config.as_ref())?;

        let overrides = self.create_cli_overrides();
        config.merge_with_cli_args(&overrides);
        config.validate()?;

        Ok(config)
    }

    /// `--layers` or `--field` without `--profile` selects the names profile.
    pub fn effective_profile(&self) -> Option<Profile> {
        self.profile.or_else(|| {
            (self.layers.is_some() || self.field.is_some()).then_some(Profile::Names)
        })
    }

    pub fn create_cli_overrides(&self) -> CliOverrides {
        CliOverrides::new()
            .with_profile(self.effective_profile())
            .with_layers(self.layers.clone())
            .with_field(self.field.clone())
            .with_output_name(self.output_name.clone())
            .with_force_2d(self.force_2d)
            .with_engine(self.engine)
            .with_jobs(self.jobs)
            .with_archive(self.archive)
            .with_report_path(self.report.clone())
    }

    /// Both directories, once `--generate-config` is ruled out.
    pub fn directories(&self) -> Result<(&Path, &Path)> {
        match (self.input_dir.as_deref(), self.output_dir.as_deref()) {
            (Some(input), Some(output)) => {
                validate_paths(input, output)?;
                Ok((input, output))
            }
            _ => Err(ExtractError::Config {
                message: "--input-dir and --output-dir are required".to_string(),
            }),
        }
    }
}

/// The output directory is deleted at the start of a run, so it must not
/// be the input directory or one of its ancestors.
pub fn validate_paths(input: &Path, output: &Path) -> Result<()> {
    let absolute = |path: &Path| -> PathBuf {
        std::fs::canonicalize(path).unwrap_or_else(|_| {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        })
    };

    let input_abs = absolute(input);
    let output_abs = absolute(output);

    if input_abs.starts_with(&output_abs) {
        return Err(ExtractError::InvalidPath {
            path: format!(
                "output directory {} is or contains the input directory {}",
                output.display(),
                input.display()
            ),
        });
    }

    Ok(())
}
