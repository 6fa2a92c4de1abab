use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use memclass::config::{validate_config, Config, ConfigLoader};
use memclass::formula::normalize_legacy;
use memclass::{
    import_file, Address, CancellationToken, EvaluatedNode, Evaluator, Formula, MemoryError,
    MemoryValue, ProcessHandle, ProcessId, ScanCompareType, ScanSettings, Scanner, ValueType,
};

/// Results printed after a scan
const SCAN_PREVIEW: usize = 20;

#[derive(Debug, Parser)]
#[command(name = "memclass", version, about = "Inspect process memory through typed class overlays")]
struct Cli {
    /// Target process id
    #[arg(long, global = true)]
    pid: Option<ProcessId>,

    /// Configuration file, `memclass.toml` when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List committed memory regions
    Regions,
    /// List loaded modules
    Modules,
    /// Evaluate an address formula
    Eval { formula: String },
    /// Hex dump of the bytes at a formula address
    Dump {
        formula: String,
        #[arg(long, default_value_t = 0x100)]
        size: usize,
    },
    /// Import a legacy class file and overlay one of its classes
    Inspect {
        file: PathBuf,
        #[arg(long)]
        class: String,
        /// Overrides the class's own address formula
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// First-pass exact value scan
    Scan {
        #[arg(long = "type", default_value = "i32")]
        value_type: ValueType,
        #[arg(long)]
        value: String,
    },
}

fn load_configuration(path: Option<&PathBuf>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            let loader = ConfigLoader::new(path);
            loader
                .load()
                .with_context(|| format!("failed to load {}", loader.path().display()))?
        }
        None => ConfigLoader::new("memclass.toml").load_or_default(),
    };
    validate_config(&config).context("invalid configuration")?;
    Ok(config)
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Accepts both the normalised syntax and the older quoted-module form
fn parse_formula(text: &str) -> Result<Formula> {
    match text.parse::<Formula>() {
        Ok(formula) => Ok(formula),
        Err(first) => normalize_legacy(text)
            .parse::<Formula>()
            .map_err(|_| first)
            .with_context(|| format!("invalid address formula '{}'", text)),
    }
}

fn attach(pid: Option<ProcessId>, config: &Config) -> Result<ProcessHandle> {
    let pid = pid.context("--pid is required")?;
    ProcessHandle::attach_with_mode(pid, config.access.mode)
        .with_context(|| format!("failed to attach to process {}", pid))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_configuration(cli.config.as_ref())?;
    init_logging(&config);

    info!("memclass v{}", env!("CARGO_PKG_VERSION"));

    let handle = Arc::new(attach(cli.pid, &config)?);
    let outcome = run(cli.command, &handle, &config).await;
    if let Err(e) = handle.detach() {
        warn!("Detach failed: {}", e);
    }
    outcome
}

async fn run(command: Command, handle: &Arc<ProcessHandle>, config: &Config) -> Result<()> {
    match command {
        Command::Regions => {
            for region in handle.regions()? {
                println!(
                    "{}  {:>12X}  {}  {:?}",
                    region.base_address, region.size, region.protection, region.region_type
                );
            }
        }
        Command::Modules => {
            for module in handle.modules()? {
                println!(
                    "{}  {:>10X}  {}",
                    module.base_address, module.size, module.name
                );
            }
        }
        Command::Eval { formula } => {
            let formula = parse_formula(&formula)?;
            let address = formula.evaluate(handle.as_ref())?;
            let modules = handle.modules().unwrap_or_default();
            match modules.iter().find(|m| m.contains_address(address)) {
                Some(module) => println!(
                    "{} = {} ({}+{:X})",
                    formula,
                    address,
                    module.name,
                    address.as_u64() - module.base_address.as_u64()
                ),
                None => println!("{} = {}", formula, address),
            }
        }
        Command::Dump { formula, size } => {
            let formula = parse_formula(&formula)?;
            let address = formula.evaluate(handle.as_ref())?;
            let bytes = handle
                .read_bytes(address, size)
                .with_context(|| format!("failed to read {} bytes at {}", size, address))?;
            print_hex_dump(address, &bytes);
        }
        Command::Inspect {
            file,
            class,
            address,
            json,
        } => {
            let (mut project, report) = import_file(&file, handle.pointer_size())
                .with_context(|| format!("failed to import {}", file.display()))?;
            for entry in report.entries() {
                eprintln!("{}", entry);
            }

            let id = project
                .find_class(&class)
                .ok_or_else(|| MemoryError::ClassNotFound(class.clone()))?;
            if let Some(address) = address {
                project.class_mut(id)?.address = parse_formula(&address)?;
            }

            let mut evaluator = Evaluator::from_config(handle.as_ref(), &project, &config.memory);
            let root = evaluator.evaluate(id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&root)?);
            } else {
                print_tree(&root, 0);
            }
        }
        Command::Scan { value_type, value } => {
            let value = MemoryValue::parse(&value, value_type)?;
            scan(handle, config, value_type, value).await?;
        }
    }
    Ok(())
}

async fn scan(
    handle: &Arc<ProcessHandle>,
    config: &Config,
    value_type: ValueType,
    value: MemoryValue,
) -> Result<()> {
    let mut scanner = Scanner::from_config(&config.scanner)?;
    let settings = ScanSettings {
        value_type,
        fast_scan_alignment: config.scanner.fast_scan_alignment,
        ..ScanSettings::for_architecture(handle.architecture())
    };
    let compare = ScanCompareType::Equal(value);
    let cancel = CancellationToken::new();

    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Cancelling scan");
                cancel.cancel();
            }
        })
    };

    let target = Arc::clone(handle);
    let token = cancel.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        scanner
            .first_scan(&target, &settings, &compare, &token)
            .map(|results| {
                let preview: Vec<_> = results.iter().take(SCAN_PREVIEW).cloned().collect();
                (results.len(), preview)
            })
    })
    .await
    .context("scan worker panicked")?;
    watcher.abort();

    match outcome {
        Ok((count, preview)) => {
            println!("{} results", count);
            for result in preview {
                println!("{}  {}", result.address, result.value);
            }
            Ok(())
        }
        Err(MemoryError::Cancelled) => {
            println!("scan cancelled");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn print_hex_dump(base: Address, bytes: &[u8]) {
    for (line, chunk) in bytes.chunks(16).enumerate() {
        let address = base + (line * 16) as u64;
        let hex: Vec<String> = chunk.iter().map(|b| hex::encode_upper([*b])).collect();
        let ascii: String = chunk
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        println!("{}  {:<47}  {}", address, hex.join(" "), ascii);
    }
}

fn print_tree(node: &EvaluatedNode, depth: usize) {
    if node.hidden {
        return;
    }
    let indent = "  ".repeat(depth);
    let mut line = format!(
        "{}{:04X} {} {} ({})",
        indent, node.offset, node.address, node.name, node.type_name
    );
    if let Some(value) = &node.value {
        line.push_str(&format!(" = {}", value));
    }
    if let Some(text) = &node.text {
        line.push_str(&format!(" -> {:?}", text));
    }
    if let Some(note) = &node.note {
        line.push_str(&format!(" [{}]", note));
    }
    if let Some(error) = &node.error {
        line.push_str(&format!(" <{}>", error));
    }
    println!("{}", line);
    for child in &node.children {
        print_tree(child, depth + 1);
    }
}
