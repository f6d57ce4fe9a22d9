use std::fs;
use std::future::Future;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use archai::config::Config;
use archai::orchestration::{WorkflowEvent, DEFAULT_SESSION};
use archai::{alog, alog_error, CompiledOutput, Orchestrator, PlanRequest, Result};

/// ArchAI - multi-agent architectural design assistant
#[derive(Parser, Debug)]
#[command(name = "archai")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    ARCHAI_DEBUG=1            Enable debug logging (alternative to --debug)\n    ARCHAI_LOG=<level>        Log level: error, warn, info, debug, trace\n    AZURE_OPENAI_ENDPOINT     Azure OpenAI resource endpoint\n    AZURE_OPENAI_API_KEY      Azure OpenAI API key")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.archai/archai.log)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run one design request through the agent workflow
    Run {
        /// The request in natural language
        message: String,

        /// Reference image to analyze (repeatable)
        #[arg(long = "image", short = 'i')]
        images: Vec<PathBuf>,

        /// Session id for carrying context between requests
        #[arg(long, short = 's', default_value = DEFAULT_SESSION)]
        session: String,

        /// Preferred architectural style
        #[arg(long)]
        style: Option<String>,

        /// Preferred view (e.g. aerial, street level)
        #[arg(long)]
        view: Option<String>,

        /// Print the compiled output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Interactive session: one workflow per line read from stdin
    Chat {
        /// Session id for carrying context between requests
        #[arg(long, short = 's', default_value = DEFAULT_SESSION)]
        session: String,
    },

    /// Show the effective configuration
    Config {
        /// Write a default config file if none exists
        #[arg(long)]
        init: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    archai::log::init_with_debug(cli.debug);

    let result = match cli.command {
        Command::Run {
            message,
            images,
            session,
            style,
            view,
            json,
        } => {
            let mut request = PlanRequest::new(&message).with_images(read_images(&images)?);
            if let Some(style) = style {
                request = request.with_style(&style);
            }
            if let Some(view) = view {
                request = request.with_view(&view);
            }
            run_once(request, &session, json)
        }
        Command::Chat { session } => run_chat(&session),
        Command::Config { init } => run_config(init),
    };
    if let Err(e) = &result {
        alog_error!("Command failed: {}", e);
    }
    result
}

fn read_images(paths: &[PathBuf]) -> Result<Vec<Vec<u8>>> {
    paths
        .iter()
        .map(|p| fs::read(p).map_err(Into::into))
        .collect()
}

/// Orchestrator with progress printed to stderr.
async fn build_orchestrator(config: &Config, progress: bool) -> Result<Orchestrator> {
    let orchestrator = Orchestrator::from_config(config).await?;
    if !progress {
        return Ok(orchestrator);
    }
    let (tx, mut rx) = mpsc::channel(100);
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_event(&event);
        }
    });
    Ok(orchestrator.with_events(tx))
}

/// Run one request, cancelling it if `interrupt` resolves first.
///
/// The interrupt future is dropped when the request finishes, so nothing
/// outlives the request.
async fn run_interruptible<F>(
    orchestrator: &Orchestrator,
    request: &PlanRequest,
    session: &str,
    interrupt: F,
) -> Result<CompiledOutput>
where
    F: Future,
{
    let cancel = CancellationToken::new();
    let work = orchestrator.process_request_with_cancel(request, session, &cancel);
    tokio::pin!(work);
    tokio::select! {
        output = &mut work => output,
        _ = interrupt => {
            alog!("Interrupt received, cancelling workflow");
            cancel.cancel();
            work.await
        }
    }
}

fn run_once(request: PlanRequest, session: &str, json: bool) -> Result<()> {
    let config = Config::load()?;
    let rt = tokio::runtime::Runtime::new()?;

    let output = rt.block_on(async {
        let orchestrator = build_orchestrator(&config, !json).await?;
        run_interruptible(&orchestrator, &request, session, tokio::signal::ctrl_c()).await
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_report(&output);
    }
    Ok(())
}

fn run_chat(session: &str) -> Result<()> {
    let config = Config::load()?;
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let orchestrator = build_orchestrator(&config, true).await?;
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        println!("ArchAI chat (session {}). Type 'exit' to quit.", session);
        while let Some(line) = lines.next_line().await? {
            let message = line.trim();
            if message.is_empty() {
                continue;
            }
            if matches!(message, "exit" | "quit") {
                break;
            }
            let request = PlanRequest::new(message);
            let output =
                run_interruptible(&orchestrator, &request, session, tokio::signal::ctrl_c())
                    .await?;
            print_report(&output);
        }
        Ok::<(), archai::Error>(())
    })
}

fn run_config(init: bool) -> Result<()> {
    let path = Config::config_path()?;
    if init {
        if path.exists() {
            println!("Config already exists: {}", path.display());
        } else {
            Config::default().save()?;
            println!("Wrote default config: {}", path.display());
        }
        return Ok(());
    }

    let config = Config::load()?;
    println!("# {}", path.display());
    println!("{}", toml::to_string_pretty(&config.redacted())?);
    Ok(())
}

fn print_event(event: &WorkflowEvent) {
    match event {
        WorkflowEvent::TaskStarted { kind } => eprintln!("  ... {}", kind),
        WorkflowEvent::TaskFinished {
            kind,
            success,
            elapsed,
        } => {
            let mark = if *success { "ok" } else { "FAILED" };
            eprintln!("  {} {} ({:.1}s)", mark, kind, elapsed.as_secs_f64());
        }
        WorkflowEvent::TaskInjected { kind, by } => eprintln!("  + {} (requested by {})", kind, by),
        WorkflowEvent::TaskDropped { kind, reason } => eprintln!("  - {} dropped: {}", kind, reason),
        WorkflowEvent::WorkflowComplete { .. } => {}
    }
}

fn print_report(output: &CompiledOutput) {
    println!();
    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║                    Design Consultation                     ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    println!();
    println!("  Workflow:    {}", output.workflow_id.short());
    println!(
        "  Agents:      {}",
        output
            .workflow_executed
            .iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>()
            .join(" → ")
    );
    println!("  Confidence:  {:.2}", output.confidence_score);
    if output.dynamic_routing {
        println!("  Routing:     specialists added during the run");
    }
    println!();

    let sections = [
        ("Image Analysis", &output.architectural_analysis),
        ("Expert Consultation", &output.expert_consultation),
        ("Style Analysis", &output.style_analysis),
        ("Technical Review", &output.technical_review),
        ("Optimized Prompt", &output.optimized_prompt),
        ("Quality Review", &output.quality_review),
    ];
    for (title, text) in sections.iter().filter(|(_, text)| !text.is_empty()) {
        println!("─────────────────────────────────────────────────────────────");
        println!("{}", title);
        println!();
        println!("{}", text);
        println!();
    }

    if !output.degraded.is_empty() {
        let kinds: Vec<&str> = output.degraded.iter().map(|k| k.as_str()).collect();
        println!("Warning: failed agents: {}", kinds.join(", "));
    }
    for dropped in &output.dropped {
        println!("Warning: {} did not run ({})", dropped.kind, dropped.reason);
    }
}
