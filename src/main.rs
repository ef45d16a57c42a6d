use clap::error::ErrorKind;
use s57_extract::{
    logging, parse_args, Cli, ExtractError, OutputFormatter, OutputMode, S57Extract,
    UserFriendlyError,
};
use std::process;

#[tokio::main]
async fn main() {
    let exit_code = run().await;
    process::exit(exit_code);
}

async fn run() -> i32 {
    let cli = match parse_args(std::env::args_os()) {
        Ok(cli) => cli,
        Err(e) => return handle_parse_error(e),
    };

    if let Err(e) = logging::init_logging(cli.verbose, cli.quiet) {
        eprintln!("{}", e);
    }

    if cli.generate_config {
        return handle_generate_config(&cli);
    }

    let app = match S57Extract::from_cli(&cli) {
        Ok(app) => app,
        Err(e) => {
            print_startup_error(&e);
            return 1;
        }
    };

    let (input_dir, output_dir) = match cli.directories() {
        Ok(dirs) => dirs,
        Err(e) => {
            app.handle_error(&e);
            return 1;
        }
    };

    if cli.dry_run {
        return match app.preview(input_dir, output_dir) {
            Ok(previews) => {
                app.output_formatter().print_preview(&previews);
                0
            }
            Err(e) => {
                app.handle_error(&e);
                exit_code_for(&e)
            }
        };
    }

    match app.extract(input_dir, output_dir).await {
        Ok(report) => {
            app.output_formatter().print_run_report(&report);
            // Per-file skips and failures never change the exit code
            0
        }
        Err(e) => {
            app.handle_error(&e);
            exit_code_for(&e)
        }
    }
}

fn exit_code_for(error: &ExtractError) -> i32 {
    match error {
        ExtractError::Cancelled => 130,
        _ => 1,
    }
}

fn handle_parse_error(error: clap::Error) -> i32 {
    match error.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            let _ = error.print();
            0
        }
        _ => {
            let _ = error.print();
            1
        }
    }
}

fn handle_generate_config(cli: &Cli) -> i32 {
    let config_path = cli
        .config
        .as_ref()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| "s57-extract.toml".to_string());

    match S57Extract::generate_sample_config(&config_path) {
        Ok(()) => {
            println!("Generated sample configuration file: {}", config_path);
            println!("\nTo use this configuration:");
            println!("  s57-extract -i <input-dir> -o <output-dir> --config {}", config_path);
            0
        }
        Err(e) => {
            eprintln!("Failed to generate configuration file: {}", e.user_message());
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Suggestion: {}", suggestion);
            }
            1
        }
    }
}

fn print_startup_error(error: &ExtractError) {
    let formatter = OutputFormatter::new(OutputMode::Human, 0, false);
    formatter.print_user_friendly_error(error);
}
