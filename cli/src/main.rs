use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use std::io::Write;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use sqlwarden_core::service::render_scan_output;
use sqlwarden_core::utils::validate_target;
use sqlwarden_core::{EngineCommand, EngineConfig, ScanOptions, SqlmapService, TaskStatus};

#[derive(Parser, Debug)]
#[command(
    name = "sqlwarden",
    version,
    about = "Run and track sqlmap scans",
    after_help = "\x1b[1;36mEXAMPLES:\x1b[0m
  One-shot report:                sqlwarden scan \"http://target.com/item.php?id=1\"
  Extra sqlmap arguments:         sqlwarden scan \"http://target.com/?id=1\" --arg=--level=3 --arg=--risk=2
  Tracked task with options:      sqlwarden start \"http://target.com/?id=1\" -o level=3 -o dbms=mysql -o random-agent
  Preview the command:            sqlwarden options level=3 dbms=mysql
  Custom sqlmap checkout:         sqlwarden --sqlmap-path /opt/sqlmap/sqlmap.py --python python3 scan http://target.com/?id=1"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "JSON config file (scriptPath, interpreter, timeoutSecs, tailLines)")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Path to sqlmap.py")]
    pub sqlmap_path: Option<PathBuf>,

    #[arg(long, global = true, help = "Interpreter used to run sqlmap (empty runs the script directly)")]
    pub python: Option<String>,

    #[arg(long, global = true, help = "Scan timeout in seconds")]
    pub timeout: Option<u64>,

    #[arg(short = 'v', long, global = true, default_value_t = false, help = "Debug logging")]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run sqlmap to completion and print a report
    Scan {
        url: String,

        #[arg(long = "arg", allow_hyphen_values = true, help = "Extra argument passed to sqlmap (repeatable)")]
        args: Vec<String>,
    },
    /// Submit a tracked scan and poll it until it finishes
    Start {
        url: String,

        #[arg(short = 'o', long = "option", help = "sqlmap option as key=value, or a bare flag name (repeatable)")]
        options: Vec<String>,

        #[arg(long, default_value_t = 2, help = "Seconds between status polls")]
        interval: u64,
    },
    /// Print the sqlmap command a set of options would produce
    Options {
        pairs: Vec<String>,

        #[arg(short = 'u', long, default_value = "http://target/", help = "Target URL shown in the command")]
        url: String,
    },
}

#[tokio::main]
async fn main() {
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = match build_config(&args) {
        Ok(c) => c,
        Err(e) => {
            eprint!("{}\r\n", format!("[!] {:#}", e).red());
            process::exit(1);
        }
    };
    debug!("engine config: {:?}", config);

    let code = match args.command {
        Commands::Scan { ref url, ref args } => run_scan(config, url, args).await,
        Commands::Start { ref url, ref options, interval } => run_start(config, url, options, interval).await,
        Commands::Options { ref pairs, ref url } => print_options(&config, url, pairs),
    };
    process::exit(code);
}

/// Config file (or defaults), then environment, then flags.
fn build_config(args: &Args) -> anyhow::Result<EngineConfig> {
    let mut config = match args.config {
        Some(ref path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    }
    .with_env_overrides();

    if let Some(ref path) = args.sqlmap_path {
        config.script_path = path.clone();
    }
    if let Some(ref python) = args.python {
        config.interpreter = if python.is_empty() { None } else { Some(python.clone()) };
    }
    if let Some(secs) = args.timeout {
        config.timeout_secs = secs;
    }
    Ok(config)
}

fn check_target(url: &str) -> bool {
    match validate_target(url) {
        Ok(_) => true,
        Err(e) => {
            eprint!("{}\r\n", format!("[!] Invalid target '{}': {}", url, e).red());
            false
        }
    }
}

async fn run_scan(config: EngineConfig, url: &str, extra: &[String]) -> i32 {
    if !check_target(url) {
        return 1;
    }
    print!("{}\r\n", format!("[+] Target:  {}", url).green().bold());
    print!("{}\r\n", format!("[+] Timeout: {}s", config.timeout_secs).blue());
    std::io::stdout().flush().ok();

    let service = SqlmapService::new(config);
    let outcome = service.scan_outcome(url, extra).await;
    let succeeded = outcome.is_success();
    print!("{}\r\n", render_scan_output(outcome.to_string()));
    std::io::stdout().flush().ok();

    if succeeded {
        0
    } else {
        eprint!("{}\r\n", "[!] Scan did not complete.".red().bold());
        1
    }
}

async fn run_start(config: EngineConfig, url: &str, pairs: &[String], interval: u64) -> i32 {
    if !check_target(url) {
        return 1;
    }
    let options = match ScanOptions::from_pairs(pairs) {
        Ok(o) => o,
        Err(e) => {
            eprint!("{}\r\n", format!("[!] {}", e).red());
            return 1;
        }
    };

    let service = SqlmapService::new(config);
    let receipt = service.start_scan(url, options).await;
    print!("{}\r\n", format!("[+] Task {} queued: {}", receipt.task_id, receipt.message).green().bold());
    std::io::stdout().flush().ok();

    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} [{elapsed_precise}] {msg}") {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(120));

    let view = loop {
        match service.manager().status(&receipt.task_id).await {
            Ok(view) if view.status.is_active() => {
                let last = view
                    .partial_output
                    .as_deref()
                    .and_then(|p| p.lines().last())
                    .unwrap_or("")
                    .to_string();
                spinner.set_message(format!("{} {}", view.status, last));
            }
            Ok(view) => break view,
            Err(e) => {
                spinner.finish_and_clear();
                eprint!("{}\r\n", format!("[!] {}", e).red());
                return 1;
            }
        }
        tokio::time::sleep(Duration::from_secs(interval.max(1))).await;
    };
    spinner.finish_and_clear();

    match serde_json::to_string_pretty(&view) {
        Ok(json) => print!("{}\r\n", json),
        Err(e) => eprint!("{}\r\n", format!("[!] {}", e).red()),
    }

    if view.status == TaskStatus::Completed {
        let found = view.results.as_ref().map(|r| r.len()).unwrap_or(0);
        print!("{}\r\n", format!("[+] Scan completed with {} finding(s).", found).green().bold());
        0
    } else {
        print!("{}\r\n", "[!] Scan failed.".red().bold());
        1
    }
}

fn print_options(config: &EngineConfig, url: &str, pairs: &[String]) -> i32 {
    match ScanOptions::from_pairs(pairs) {
        Ok(options) => {
            let command = EngineCommand::with_options(config, url, &options);
            print!("[DRY RUN] {}\r\n", command.display());
            0
        }
        Err(e) => {
            eprint!("{}\r\n", format!("[!] {}", e).red());
            1
        }
    }
}
