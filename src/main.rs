use anyhow::{anyhow, Result};
use chrono::Utc;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::thread;

use snapsweep::cleanup::{delete_photos, format_bytes};
use snapsweep::config::{Config, Sensitivity};
use snapsweep::export::{export_result, ExportFormat};
use snapsweep::logging;
use snapsweep::scanner::{ScanPhase, ScanProgress, ScanResult, Scanner};
use snapsweep::store::FsAssetStore;
use snapsweep::trash::TrashManager;

enum Command {
    Scan(ScanArgs),
    PurgeTrash,
}

#[derive(Default)]
struct ScanArgs {
    directory: PathBuf,
    deep_scan: Option<bool>,
    no_visual: bool,
    batch_size: Option<usize>,
    sensitivity: Option<Sensitivity>,
    export: Option<PathBuf>,
    trash_duplicates: bool,
}

struct Args {
    command: Command,
    config_path: Option<PathBuf>,
}

fn fail(message: &str) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}

fn next_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> &'a str {
    if *i + 1 < args.len() {
        *i += 1;
        &args[*i]
    } else {
        fail(&format!("{} requires an argument", flag))
    }
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;
    let mut command_name: Option<String> = None;
    let mut scan = ScanArgs::default();
    let mut directory = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("snapsweep {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                config_path = Some(PathBuf::from(next_value(&args, &mut i, "--config")));
            }
            "--fast" => scan.deep_scan = Some(false),
            "--deep" => scan.deep_scan = Some(true),
            "--no-visual" => scan.no_visual = true,
            "--trash-duplicates" => scan.trash_duplicates = true,
            "--batch-size" => {
                let value = next_value(&args, &mut i, "--batch-size");
                match value.parse::<usize>() {
                    Ok(n) if n > 0 => scan.batch_size = Some(n),
                    _ => fail("--batch-size must be a positive integer"),
                }
            }
            "--sensitivity" => {
                let value = next_value(&args, &mut i, "--sensitivity");
                scan.sensitivity = Some(Sensitivity::parse(value).unwrap_or_else(|| {
                    fail("--sensitivity must be conservative, balanced or aggressive")
                }));
            }
            "--export" => {
                scan.export = Some(PathBuf::from(next_value(&args, &mut i, "--export")));
            }
            arg if arg.starts_with('-') => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
            arg if command_name.is_none() => command_name = Some(arg.to_string()),
            arg if directory.is_none() => directory = Some(PathBuf::from(arg)),
            arg => fail(&format!("Unexpected argument: {}", arg)),
        }
        i += 1;
    }

    let command = match command_name.as_deref() {
        Some("scan") => {
            scan.directory = directory.unwrap_or_else(|| fail("scan requires a directory"));
            Command::Scan(scan)
        }
        Some("purge-trash") => Command::PurgeTrash,
        Some(other) => fail(&format!("Unknown command: {}", other)),
        None => {
            print_help();
            std::process::exit(1);
        }
    };

    Args {
        command,
        config_path,
    }
}

fn print_help() {
    println!(
        r#"snapsweep - find screenshots, duplicates and blurry photos

USAGE:
    snapsweep scan DIR [OPTIONS]
    snapsweep purge-trash

SCAN OPTIONS:
    --fast                  Bytes-per-pixel blur check only
    --deep                  Also resample images for blur (default)
    --no-visual             Skip visual-similarity duplicates
    --batch-size N          Blur batch size (default 50)
    --sensitivity P         conservative, balanced or aggressive
    --export PATH           Write findings to PATH (.json or .csv)
    --trash-duplicates      Move flagged duplicates to the trash

OPTIONS:
    --config, -c PATH       Path to config file
    --version, -V           Show version
    --help, -h              Show this help message

ENVIRONMENT:
    SNAPSWEEP_CONFIG        Path to config file (overrides default location)
    SNAPSWEEP_LOG           Log level (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/snapsweep/config.toml"#
    );
}

fn main() -> Result<()> {
    let args = parse_args();

    if let Err(e) = logging::init(Some(Config::config_dir().join("logs"))) {
        eprintln!("Warning: logging disabled: {:#}", e);
    }

    let config = match args.config_path {
        Some(path) => Config::load_from(&path)?,
        None => Config::load()?,
    };

    match args.command {
        Command::Scan(scan) => run_scan(config, scan),
        Command::PurgeTrash => {
            let trash = TrashManager::new(config.trash);
            let result = trash.purge(Utc::now())?;
            println!(
                "Purged {} files, freed {}",
                result.files_deleted,
                format_bytes(result.bytes_freed)
            );
            Ok(())
        }
    }
}

fn run_scan(mut config: Config, scan: ScanArgs) -> Result<()> {
    if let Some(deep) = scan.deep_scan {
        config.scanner.deep_scan = deep;
    }
    if scan.no_visual {
        config.scanner.include_visual_similarity = false;
    }
    if let Some(batch_size) = scan.batch_size {
        config.scanner.batch_size = batch_size;
    }
    if scan.sensitivity.is_some() {
        config.scanner.sensitivity = scan.sensitivity;
    }

    let options = config.scanner.scan_options();
    let store = Arc::new(FsAssetStore::new(
        &scan.directory,
        &config.scanner,
        TrashManager::new(config.trash.clone()),
    ));

    let (tx, rx) = mpsc::channel();
    let worker = {
        let store = Arc::clone(&store);
        thread::spawn(move || Scanner::new().run_scan(store.as_ref(), &options, Some(tx), None))
    };

    for event in rx {
        match event {
            ScanProgress::Phase { phase, current, total } => {
                let label = match phase {
                    ScanPhase::Screenshots => "screenshots",
                    ScanPhase::Duplicates => "duplicates",
                    ScanPhase::Blur => "blur",
                };
                eprint!("\r{:<12} {}/{}    ", label, current, total);
                let _ = std::io::stderr().flush();
            }
            ScanProgress::Completed { .. } => eprintln!(),
            ScanProgress::Failed { reason } => eprintln!("\nScan failed: {}", reason),
        }
    }

    let result = worker
        .join()
        .map_err(|_| anyhow!("Scan thread panicked"))??;

    print_summary(&result);

    if let Some(path) = scan.export {
        let count = export_result(&result, &path, ExportFormat::from_path(&path)?)?;
        println!("Exported {} findings to {}", count, path.display());
    }

    if scan.trash_duplicates {
        let ids: Vec<String> = result
            .details
            .duplicates
            .iter()
            .map(|f| f.asset.id.clone())
            .collect();
        let outcome = delete_photos(store.as_ref(), &ids)?;
        println!(
            "Moved {} duplicates to {}",
            outcome.deleted_count,
            config.trash.path.display()
        );
    }

    Ok(())
}

fn print_summary(result: &ScanResult) {
    println!("Scanned {} photos", result.scanned_count);
    println!("  Screenshots: {}", result.screenshots);
    println!("  Duplicates:  {}", result.duplicates);
    println!("  Blurry:      {}", result.blurry);
    println!("  Reclaimable: {}", format_bytes(result.total_space_bytes));

    let groups = result.duplicate_groups(Utc::now());
    if !groups.is_empty() {
        println!("  Duplicate groups with a suggested keeper: {}", groups.len());
    }
    if result.cancelled {
        println!("(scan was cancelled; results are partial)");
    }
}
