use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use convert_core::config::{ConvertConfig, DefaultsStore, StoredDefaults};
use convert_core::formats::{TargetFormat, DEFAULT_FORMAT};
use convert_core::logging::{init_logging, LogConfig};
use convert_core::progress::presenter_for;
use convert_core::report::print_summary_report;
use convert_core::tools::ToolPaths;
use convert_core::{convert_folder, BatchResult};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "convert-audio")]
#[command(
    version,
    about = "Batch-convert media files in a folder with ffmpeg and archive the originals",
    long_about = None
)]
struct Cli {
    /// Folder with the files to convert (default: stored config, then "input_folder")
    #[arg(short, long, value_name = "DIR")]
    input_folder: Option<PathBuf>,

    /// Folder for converted files (default: stored config, then "output_folder/odpovedi")
    #[arg(short, long, value_name = "DIR")]
    output_folder: Option<PathBuf>,

    /// Output format / extension, e.g. wav, mp3, flac
    #[arg(short, long, default_value = DEFAULT_FORMAT, value_parser = TargetFormat::parse)]
    format: TargetFormat,

    /// Folder to move originals to after conversion (default: stored config, then "archived")
    #[arg(long, value_name = "DIR")]
    archive: Option<PathBuf>,

    /// Do not move original files to an archive
    #[arg(long)]
    no_archive: bool,

    /// Also convert files in subfolders
    #[arg(short, long)]
    recursive: bool,

    /// Re-convert files whose output already exists
    #[arg(long)]
    overwrite: bool,

    /// No progress bars and no per-file output; failures are still printed
    #[arg(short, long)]
    quiet: bool,

    /// Store the current input, output and archive folders as new defaults
    #[arg(long)]
    save_defaults: bool,

    /// Print the effective defaults and the config file path, then exit
    #[arg(long)]
    show_defaults: bool,

    /// Debug logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

/// Folders after applying command line, stored defaults and built-ins, in
/// that order.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Folders {
    input: PathBuf,
    output: PathBuf,
    /// Before `--no-archive` is applied.
    archive: PathBuf,
}

impl Folders {
    fn resolve(cli: &Cli, stored: &StoredDefaults) -> Self {
        Self {
            input: cli
                .input_folder
                .clone()
                .unwrap_or_else(|| PathBuf::from(stored.input_folder_or_default())),
            output: cli
                .output_folder
                .clone()
                .unwrap_or_else(|| PathBuf::from(stored.output_folder_or_default())),
            archive: cli
                .archive
                .clone()
                .unwrap_or_else(|| PathBuf::from(stored.archive_or_default())),
        }
    }

    fn effective_archive(&self, no_archive: bool) -> Option<PathBuf> {
        (!no_archive).then(|| self.archive.clone())
    }

    fn to_stored(&self, no_archive: bool) -> StoredDefaults {
        StoredDefaults {
            input_folder: Some(self.input.display().to_string()),
            output_folder: Some(self.output.display().to_string()),
            archive: self
                .effective_archive(no_archive)
                .map(|p| p.display().to_string()),
        }
    }
}

fn show_defaults(folders: &Folders, no_archive: bool, store: &DefaultsStore) {
    println!("Current defaults (including config + built-in):");
    println!("  input-folder:  {}", folders.input.display());
    println!("  output-folder: {}", folders.output.display());
    match folders.effective_archive(no_archive) {
        Some(archive) => println!("  archive:       {}", archive.display()),
        None => println!("  archive:       disabled (no archive)"),
    }
    println!("Config file: {}", store.path().display());
}

fn run(cli: Cli) -> Result<BatchResult> {
    let store = DefaultsStore::in_home_dir();
    let folders = Folders::resolve(&cli, &store.load());

    if cli.show_defaults {
        show_defaults(&folders, cli.no_archive, &store);
        return Ok(BatchResult::new());
    }

    if cli.save_defaults {
        store
            .save(&folders.to_stored(cli.no_archive))
            .with_context(|| format!("Failed to save defaults to {}", store.path().display()))?;
        if !cli.quiet {
            println!("Saved defaults to {}", store.path().display());
        }
    }

    let tools = ToolPaths::discover()?;
    let config = ConvertConfig {
        archive_folder: folders.effective_archive(cli.no_archive),
        input_folder: folders.input,
        output_folder: folders.output,
        format: cli.format,
        recursive: cli.recursive,
        overwrite: cli.overwrite,
        quiet: cli.quiet,
        tools,
    };

    info!(config = ?config, "Resolved configuration");

    let mut presenter = presenter_for(config.quiet);
    let result = convert_folder(&config, presenter.as_mut())?;

    if !config.quiet {
        print_summary_report(&result, config.format.extension());
    }
    Ok(result)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::default().verbose()
    } else {
        LogConfig::default()
    };
    let _ = init_logging("convert_audio", log_config);

    match run(cli) {
        Ok(result) if result.has_failures() => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Batch aborted");
            eprintln!("{} {:#}", style("❌ Error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
