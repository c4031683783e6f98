//! Proctor Sentinel CLI
//!
//! Session integrity monitor for proctored coding tests.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use proctor_sentinel::{
    audit::create_shared_log_with_persistence,
    config::{Config, DetectorConfig},
    core::{Dialog, Notice, NoticeLevel, ProblemContext, RunOutcome, Runner, SessionHost},
    detect::evaluate,
    replay::{load_script, Replayer},
    source::{DisplayGeometry, Relay, Sample, Signal, SignalEnvelope},
    SessionMonitor, RULES_DECLARATION, VERSION,
};
use serde::Deserialize;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "judge")]
use proctor_sentinel::judge::{BlockingJudgeClient, ExecutionRequest, JudgeConfig, TestCase};

#[derive(Parser)]
#[command(name = "proctor-sentinel")]
#[command(version = VERSION)]
#[command(about = "Session integrity monitor for proctored coding tests", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded JSON-lines session script
    Replay {
        /// Script file
        script: PathBuf,

        /// Detectors to run (fullscreen, tabs, keys, devtools, display, face, noise, or all)
        #[arg(long)]
        detectors: Option<String>,

        /// Simulated time step between script lines, in milliseconds
        #[arg(long, default_value = "50")]
        step_ms: u64,

        /// Print the full outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Monitor a live session fed as JSON lines on stdin
    Live {
        /// Problem identifier
        problem_id: String,

        /// Problem title
        #[arg(long, default_value = "")]
        title: String,

        /// Detectors to run
        #[arg(long)]
        detectors: Option<String>,
    },

    /// Run the external display heuristics on a geometry sample
    CheckDisplay {
        /// Geometry as JSON, or a path to a JSON file (omit for a single 1920x1080 display)
        geometry: Option<String>,
    },

    /// Show monitoring status and cumulative statistics
    Status,

    /// Display the test rules
    Rules,

    /// Show configuration
    Config,

    /// Serve the HTTP relay for a browser shim
    #[cfg(feature = "server")]
    Serve {
        #[arg(long, default_value = "8787")]
        port: u16,
    },

    /// Run a solution on the code-execution service
    #[cfg(feature = "judge")]
    Run {
        /// Service base URL
        #[arg(long, default_value = "http://127.0.0.1:2358")]
        url: String,

        /// Language id on the service
        #[arg(long, default_value = "71")]
        language: u32,

        /// Source file
        file: PathBuf,

        /// Command-line arguments passed to the program
        #[arg(long)]
        args: Option<String>,

        /// Expected output; prints pass/fail when given
        #[arg(long)]
        expect: Option<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            script,
            detectors,
            step_ms,
            json,
        } => {
            cmd_replay(script, detectors, step_ms, json);
        }
        Commands::Live {
            problem_id,
            title,
            detectors,
        } => {
            cmd_live(problem_id, title, detectors);
        }
        Commands::CheckDisplay { geometry } => {
            cmd_check_display(geometry);
        }
        Commands::Status => {
            cmd_status();
        }
        Commands::Rules => {
            cmd_rules();
        }
        Commands::Config => {
            cmd_config();
        }
        #[cfg(feature = "server")]
        Commands::Serve { port } => {
            cmd_serve(port);
        }
        #[cfg(feature = "judge")]
        Commands::Run {
            url,
            language,
            file,
            args,
            expect,
        } => {
            cmd_run(url, language, file, args, expect);
        }
    }
}

fn load_config(detectors: Option<String>) -> Config {
    let mut config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: {e}; using defaults");
            Config::default()
        }
    };
    if let Some(list) = detectors {
        config.detectors = DetectorConfig::from_csv(&list);
        if !config.detectors.any_enabled() {
            eprintln!("Error: At least one detector must be enabled");
            std::process::exit(1);
        }
    }
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }
    config
}

fn cmd_replay(script: PathBuf, detectors: Option<String>, step_ms: u64, json: bool) {
    let config = load_config(detectors);
    let lines = match load_script(&script) {
        Ok(lines) => lines,
        Err(e) => {
            eprintln!("Error reading {script:?}: {e}");
            std::process::exit(1);
        }
    };

    let audit = create_shared_log_with_persistence(config.data_path.join("audit.json"));
    let export_path = config.export_path.clone();
    let mut replayer = Replayer::new(config, audit.clone(), Utc::now()).with_step_ms(step_ms);
    ctrlc_handler(replayer.running_flag());

    let outcome = replayer.run(&lines);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome).unwrap_or_else(|_| "Error".to_string())
        );
    } else {
        println!("Replayed {} step(s) from {:?}", outcome.steps, script);
        if outcome.interrupted {
            println!("(interrupted)");
        }
        println!();
        for dialog in &outcome.host.dialogs {
            println!("  dialog  {}", describe_dialog(dialog));
        }
        for notice in &outcome.host.notices {
            println!("  notice  {}", describe_notice(notice));
        }
        for (at_ms, error) in &outcome.rejected {
            println!("  refused at {at_ms}ms: {error}");
        }
        println!();
        println!("Final state: {}", outcome.final_state.name());
        println!("Blocked signals: {}", outcome.blocked_signals);
    }

    if let Some(ref report) = outcome.report {
        match report.save_to(&export_path) {
            Ok(path) => println!("Report written to {path:?}"),
            Err(e) => eprintln!("Error writing report: {e}"),
        }
    }
    if let Err(e) = audit.save() {
        eprintln!("Warning: Could not save audit log: {e}");
    }
}

/// One line of live input.
#[derive(Deserialize)]
#[serde(untagged)]
enum LiveInput {
    Signal {
        signal: Signal,
        #[serde(default)]
        at: Option<DateTime<Utc>>,
    },
    Sample {
        sample: Sample,
    },
}

/// Prints host callbacks to the terminal.
struct ConsoleHost;

impl SessionHost for ConsoleHost {
    fn on_dialog(&mut self, dialog: Dialog) {
        println!("[dialog] {}", describe_dialog(&dialog));
    }

    fn on_notice(&mut self, notice: Notice) {
        println!("[notice] {}", describe_notice(&notice));
    }

    fn on_terminate(&mut self, reason: &str) {
        println!("[terminated] {reason}");
    }
}

fn cmd_live(problem_id: String, title: String, detectors: Option<String>) {
    let config = load_config(detectors);
    let export_path = config.export_path.clone();
    let audit = create_shared_log_with_persistence(config.data_path.join("audit.json"));
    let relay = Relay::new();
    let mut monitor = SessionMonitor::new(
        config,
        relay.platform(),
        Box::new(ConsoleHost),
        audit.clone(),
    );

    println!("Proctor Sentinel v{VERSION}");
    println!("Reading signals and samples from stdin. Press Ctrl+C to stop.");
    println!();

    if let Err(e) = monitor.start(ProblemContext::new(problem_id, title), Utc::now()) {
        eprintln!("Error starting session: {e}");
        std::process::exit(1);
    }

    let sender = monitor.signal_sender();
    let feed = relay.clone();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LiveInput>(&line) {
                Ok(LiveInput::Signal { signal, at }) => {
                    if let Signal::FullscreenChanged { active } = signal {
                        feed.set_fullscreen_active(active);
                    }
                    let envelope = match at {
                        Some(at) => SignalEnvelope::at(at, signal),
                        None => SignalEnvelope::new(signal),
                    };
                    if sender.send(envelope).is_err() {
                        break;
                    }
                }
                Ok(LiveInput::Sample { sample }) => feed.push(sample),
                Err(e) => eprintln!("Skipping line: {e}"),
            }
        }
    });

    let runner = Runner::new();
    ctrlc_handler(runner.running_flag());
    let outcome = runner.run(&mut monitor);

    if outcome == RunOutcome::Stopped {
        println!();
        println!("Stopping session...");
        monitor.stop(Utc::now());
    }

    if let Some(report) = monitor.last_report() {
        match report.save_to(&export_path) {
            Ok(path) => println!("Report written to {path:?}"),
            Err(e) => eprintln!("Error writing report: {e}"),
        }
    }
    if let Err(e) = audit.save() {
        eprintln!("Warning: Could not save audit log: {e}");
    }

    println!();
    println!("{}", audit.summary());
}

fn cmd_check_display(geometry: Option<String>) {
    let geometry = match geometry {
        None => DisplayGeometry::default(),
        Some(arg) => {
            let text = if arg.trim_start().starts_with('{') {
                arg
            } else {
                match std::fs::read_to_string(&arg) {
                    Ok(text) => text,
                    Err(e) => {
                        eprintln!("Error reading {arg}: {e}");
                        std::process::exit(1);
                    }
                }
            };
            match serde_json::from_str::<DisplayGeometry>(&text) {
                Ok(geometry) => geometry,
                Err(e) => {
                    eprintln!("Invalid geometry: {e}");
                    std::process::exit(1);
                }
            }
        }
    };

    let config = Config::load().unwrap_or_default();
    match evaluate(&geometry, &config.detectors.display) {
        Ok(assessment) => {
            println!("External Display Check");
            println!("======================");
            println!();
            for line in assessment.debug_lines() {
                println!("  {line}");
            }
            println!();
            println!(
                "Result: {}",
                if assessment.detected {
                    "external display detected ✗"
                } else {
                    "single display ✓"
                }
            );
        }
        Err(e) => {
            eprintln!("Check inconclusive: {e}");
            std::process::exit(2);
        }
    }
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();

    println!("Proctor Sentinel Status");
    println!("=======================");
    println!();

    let d = &config.detectors;
    let flag = |on: bool| if on { "enabled" } else { "disabled" };
    println!("Detectors:");
    println!("  Fullscreen: {}", flag(d.fullscreen));
    println!("  Tab switching: {}", flag(d.tab_switch));
    println!("  Restricted keys: {}", flag(d.keys));
    println!("  Developer tools: {}", flag(d.devtools.enabled));
    println!("  External display: {}", flag(d.display.enabled));
    println!("  Face presence: {}", flag(d.face.enabled));
    println!("  Ambient noise: {}", flag(d.noise.enabled));
    println!();

    let p = &config.policy;
    println!("Policy:");
    println!("  Warning after {} scored violations", p.violation_limit);
    println!("  Terminate after {} warnings", p.popup_limit);
    println!("  Terminate after {} fullscreen exits", p.fullscreen_exit_limit);
    println!();

    let stats_path = config.data_path.join("audit.json");
    if stats_path.exists() {
        let audit = create_shared_log_with_persistence(stats_path);
        println!("{}", audit.summary());
    } else {
        println!("No previous session data found.");
    }
}

fn cmd_rules() {
    println!("{RULES_DECLARATION}");
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

#[cfg(feature = "server")]
fn cmd_serve(port: u16) {
    use proctor_sentinel::server::{run, ServerConfig};

    let config = load_config(None);
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error creating runtime: {e}");
            std::process::exit(1);
        }
    };

    runtime.block_on(async move {
        let (addr, shutdown_tx) = match run(ServerConfig::new(port, config)).await {
            Ok(started) => started,
            Err(e) => {
                eprintln!("Error starting server: {e}");
                std::process::exit(1);
            }
        };
        println!("Relay listening on http://{addr}");
        println!("Press Ctrl+C to stop");

        let _ = tokio::signal::ctrl_c().await;
        let _ = shutdown_tx.send(());
    });
}

#[cfg(feature = "judge")]
fn cmd_run(
    url: String,
    language: u32,
    file: PathBuf,
    args: Option<String>,
    expect: Option<String>,
) {
    let source = match std::fs::read_to_string(&file) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error reading {file:?}: {e}");
            std::process::exit(1);
        }
    };
    let client = match BlockingJudgeClient::new(JudgeConfig::new(url)) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    match expect {
        Some(expected_output) => {
            let case = TestCase {
                arguments: args.unwrap_or_default(),
                expected_output,
            };
            match client.run_test_case(&source, language, &case) {
                Ok(outcome) => {
                    println!("{}", outcome.output);
                    println!();
                    if outcome.passed {
                        println!("✓ Output matches expected result.");
                    } else {
                        println!("✗ Expected: {}", case.expected_output.trim());
                        std::process::exit(1);
                    }
                }
                Err(e) => {
                    eprintln!("Error: {e}");
                    std::process::exit(1);
                }
            }
        }
        None => {
            let mut request = ExecutionRequest::new(source, language);
            if let Some(args) = args {
                request = request.with_arguments(args);
            }
            match client.execute(&request) {
                Ok(result) => println!("{}", result.display_output()),
                Err(e) => {
                    eprintln!("Error: {e}");
                    std::process::exit(1);
                }
            }
        }
    }
}

fn describe_dialog(dialog: &Dialog) -> String {
    match dialog {
        Dialog::DisplayCheckInProgress => "Checking for external displays...".to_string(),
        Dialog::ExternalDisplayBlocked { can_override, .. } => format!(
            "External display detected{}",
            if *can_override {
                " (continue anyway is available)"
            } else {
                ""
            }
        ),
        Dialog::PermissionDenied {
            capability,
            message,
        } => format!("{capability} unavailable: {message}"),
        Dialog::ReadyToStart => "Ready to start".to_string(),
        Dialog::FullscreenRequired { attempt, limit } => {
            format!("Full screen required (attempt {attempt} of {limit})")
        }
        Dialog::Warning {
            attempt,
            limit,
            message,
        } => format!("Warning {attempt} of {limit}: {message}"),
        Dialog::Terminated { reason, notice } => format!("Test ended: {reason} {notice}"),
    }
}

fn describe_notice(notice: &Notice) -> String {
    let level = match notice.level {
        NoticeLevel::Info => "info",
        NoticeLevel::Warning => "warning",
        NoticeLevel::Error => "error",
    };
    format!("{level}: {} - {}", notice.title, notice.description)
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Warning: Could not set Ctrl+C handler: {e}");
    }
}
