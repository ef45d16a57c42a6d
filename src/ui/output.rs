use crate::error::{ExtractError, UserFriendlyError};
use crate::pipeline::{CellPreview, FileOutcome, RunReport};
use console::{style, Emoji, Term};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputMode {
    Human,
    Json,
    Plain,
}

// Emojis with text fallbacks
static CHECKMARK: Emoji = Emoji("✅ ", "✓ ");
static CROSS: Emoji = Emoji("❌ ", "✗ ");
static INFO: Emoji = Emoji("ℹ️  ", "i ");
static WARNING: Emoji = Emoji("⚠️  ", "! ");
static ANCHOR: Emoji = Emoji("⚓ ", "> ");
static SPARKLES: Emoji = Emoji("✨ ", "* ");

pub struct OutputFormatter {
    mode: OutputMode,
    use_colors: bool,
    verbose_level: u8,
    quiet: bool,
}

impl OutputFormatter {
    pub fn new(mode: OutputMode, verbose: u8, quiet: bool) -> Self {
        let use_colors = match mode {
            OutputMode::Human => Term::stdout().features().colors_supported() && !quiet,
            _ => false,
        };

        Self {
            mode,
            use_colors,
            verbose_level: if quiet { 0 } else { verbose },
            quiet,
        }
    }

    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }

        match self.mode {
            OutputMode::Human => self.print_human_message(MessageType::Success, message),
            OutputMode::Json => self.print_json_message("success", message),
            OutputMode::Plain => println!("SUCCESS: {}", message),
        }
    }

    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Human => self.print_human_message(MessageType::Error, message),
            OutputMode::Json => self.print_json_message("error", message),
            OutputMode::Plain => eprintln!("ERROR: {}", message),
        }
    }

    /// Shown unless quiet; warnings here do not change the exit code.
    pub fn warning(&self, message: &str) {
        if self.should_show_message(0) {
            match self.mode {
                OutputMode::Human => self.print_human_message(MessageType::Warning, message),
                OutputMode::Json => self.print_json_message("warning", message),
                OutputMode::Plain => println!("WARNING: {}", message),
            }
        }
    }

    pub fn info(&self, message: &str) {
        if self.should_show_message(1) {
            match self.mode {
                OutputMode::Human => self.print_human_message(MessageType::Info, message),
                OutputMode::Json => self.print_json_message("info", message),
                OutputMode::Plain => println!("INFO: {}", message),
            }
        }
    }

    pub fn start_operation(&self, operation: &str) {
        if self.should_show_message(0) {
            match self.mode {
                OutputMode::Human => {
                    if self.use_colors {
                        println!("{}{}", ANCHOR, style(operation).bold());
                    } else {
                        println!("> {}", operation);
                    }
                }
                OutputMode::Json => self.print_json_message("operation_start", operation),
                OutputMode::Plain => println!("STARTING: {}", operation),
            }
        }
    }

    pub fn print_user_friendly_error(&self, error: &ExtractError) {
        let user_message = error.user_message();
        self.error(&user_message);

        if let Some(suggestion) = error.suggestion() {
            match self.mode {
                OutputMode::Human => {
                    eprintln!();
                    if self.use_colors {
                        eprintln!(
                            "{}{}",
                            INFO,
                            style(&format!("Suggestion: {}", suggestion)).cyan()
                        );
                    } else {
                        eprintln!("Suggestion: {}", suggestion);
                    }
                }
                OutputMode::Json => {
                    self.print_json_object(&serde_json::json!({
                        "type": "suggestion",
                        "message": suggestion
                    }));
                }
                OutputMode::Plain => {
                    eprintln!("SUGGESTION: {}", suggestion);
                }
            }
        }
    }

    pub fn print_run_summary(&self, report: &RunReport) {
        if self.quiet {
            return;
        }

        match self.mode {
            OutputMode::Human => self.print_human_summary(report),
            OutputMode::Json => self.print_json_summary(report),
            OutputMode::Plain => self.print_plain_summary(report),
        }
    }

    /// Per-file listing, shown with `-v` in human and plain modes.
    pub fn print_run_report(&self, report: &RunReport) {
        match self.mode {
            OutputMode::Human | OutputMode::Plain => {
                if !self.should_show_message(1) {
                    return;
                }
                self.print_header("Files");
                for file in &report.files {
                    let detail = match &file.message {
                        Some(message) => format!(" ({})", message),
                        None => String::new(),
                    };
                    println!(
                        "  {} [{}] {} rows {}{}",
                        file.path,
                        file.outcome.label(),
                        file.rows,
                        file.layers.join(","),
                        detail
                    );
                }
            }
            OutputMode::Json => {
                let json_output =
                    serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string());
                println!("{}", json_output);
            }
        }
    }

    pub fn print_preview(&self, previews: &[CellPreview]) {
        match self.mode {
            OutputMode::Json => {
                let json_output =
                    serde_json::to_string_pretty(previews).unwrap_or_else(|_| "[]".to_string());
                println!("{}", json_output);
            }
            OutputMode::Human | OutputMode::Plain => {
                self.print_header("Dry run");
                for preview in previews {
                    println!("{} (level {})", preview.path, preview.level);
                    if let Some(ref error) = preview.error {
                        println!("  open failed: {}", error);
                        continue;
                    }
                    for missing in &preview.missing_fields {
                        println!("  {} lacks field {}", missing.layer, missing.field);
                    }
                    match preview.sql {
                        Some(ref sql) => println!("  {}", sql),
                        None => println!("  no target layers"),
                    }
                }
                println!("{} cell file(s) planned, nothing written", previews.len());
            }
        }
    }

    pub fn print_header(&self, title: &str) {
        if self.quiet {
            return;
        }

        match self.mode {
            OutputMode::Human => {
                println!();
                if self.use_colors {
                    println!("{} {}", SPARKLES, style(title).bold().cyan());
                } else {
                    println!("=== {} ===", title);
                }
                println!();
            }
            OutputMode::Json => {
                self.print_json_object(&serde_json::json!({
                    "type": "header",
                    "title": title
                }));
            }
            OutputMode::Plain => {
                println!("=== {} ===", title);
            }
        }
    }

    pub fn print_separator(&self) {
        if self.quiet {
            return;
        }

        match self.mode {
            OutputMode::Human => {
                if self.use_colors {
                    println!("{}", style("─".repeat(60)).dim());
                } else {
                    println!("{}", "-".repeat(60));
                }
            }
            OutputMode::Plain => {
                println!("{}", "-".repeat(60));
            }
            OutputMode::Json => {}
        }
    }

    fn should_show_message(&self, min_verbose_level: u8) -> bool {
        !self.quiet && self.verbose_level >= min_verbose_level
    }

    fn print_human_message(&self, msg_type: MessageType, message: &str) {
        #[allow(clippy::type_complexity)]
        let (emoji, color_fn): (Emoji, Box<dyn Fn(&str) -> console::StyledObject<&str>>) =
            match msg_type {
                MessageType::Success => (CHECKMARK, Box::new(|msg| style(msg).green().bold())),
                MessageType::Error => (CROSS, Box::new(|msg| style(msg).red().bold())),
                MessageType::Warning => (WARNING, Box::new(|msg| style(msg).yellow().bold())),
                MessageType::Info => (INFO, Box::new(|msg| style(msg).cyan())),
            };

        if self.use_colors {
            match msg_type {
                MessageType::Error => eprintln!("{}{}", emoji, color_fn(message)),
                _ => println!("{}{}", emoji, color_fn(message)),
            }
        } else {
            let prefix = match msg_type {
                MessageType::Success => "✓",
                MessageType::Error => "✗",
                MessageType::Warning => "!",
                MessageType::Info => "i",
            };

            match msg_type {
                MessageType::Error => eprintln!("{} {}", prefix, message),
                _ => println!("{} {}", prefix, message),
            }
        }
    }

    fn print_json_message(&self, level: &str, message: &str) {
        self.print_json_object(&serde_json::json!({
            "type": "message",
            "level": level,
            "message": message,
            "timestamp": chrono::Utc::now().to_rfc3339()
        }));
    }

    fn print_json_object(&self, obj: &serde_json::Value) {
        println!(
            "{}",
            serde_json::to_string(obj).unwrap_or_else(|_| "{}".to_string())
        );
    }

    fn highlight<T: ToString>(&self, value: T) -> String {
        if self.use_colors {
            style(value.to_string()).cyan().bold().to_string()
        } else {
            value.to_string()
        }
    }

    fn print_human_summary(&self, report: &RunReport) {
        println!();
        self.print_separator();

        if self.use_colors {
            println!("{} {}", style("Extraction completed!").green().bold(), CHECKMARK);
        } else {
            println!("✓ Extraction completed!");
        }

        println!();
        println!("  Cells processed: {}", self.highlight(report.files_processed));
        println!("  Cells exported:  {}", self.highlight(report.files_exported));
        println!("  Rows written:    {}", self.highlight(report.rows_written));
        if report.files_skipped > 0 {
            println!("  Cells skipped:   {}", report.files_skipped);
        }
        if report.files_failed > 0 {
            println!("  Cells failed:    {}", report.files_failed);
        }
        println!("  Time taken:      {}", self.highlight(format_duration(report.duration)));

        if report.output_created() {
            println!("  Output:          {}", report.output_path.display());
        } else {
            println!("  Output:          none (no rows exported)");
        }

        if let Some(ref archive) = report.archive {
            if archive.success {
                println!("  Archive:         {}", archive.path.display());
            }
        }

        self.print_separator();
    }

    fn print_json_summary(&self, report: &RunReport) {
        let summary = serde_json::json!({
            "type": "summary",
            "files_processed": report.files_processed,
            "files_exported": report.files_exported,
            "files_skipped": report.files_skipped,
            "files_failed": report.files_failed,
            "rows_written": report.rows_written,
            "output_path": report.output_created().then(|| report.output_path.display().to_string()),
            "duration_ms": report.duration.as_millis(),
            "timestamp": chrono::Utc::now().to_rfc3339()
        });

        println!(
            "{}",
            serde_json::to_string_pretty(&summary).unwrap_or_else(|_| "{}".to_string())
        );
    }

    fn print_plain_summary(&self, report: &RunReport) {
        println!("COMPLETED: Extraction");
        println!("Cells processed: {}", report.files_processed);
        println!("Cells exported: {}", report.files_exported);
        println!("Rows written: {}", report.rows_written);
        println!(
            "Skipped: {} (open failed: {}, field missing: {})",
            report.files_skipped,
            report.files_with(FileOutcome::SkippedOpenFailure).count(),
            report.files_with(FileOutcome::SkippedFieldMissing).count()
        );
        println!("Failed: {}", report.files_failed);
        println!("Duration: {:?}", report.duration);
    }
}

#[derive(Debug, Clone, Copy)]
enum MessageType {
    Success,
    Error,
    Warning,
    Info,
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
