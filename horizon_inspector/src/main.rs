use std::path::PathBuf;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use horizon_client::{
    load_client_config_from_env, load_or_builtin, ClientConfig, HttpGateway, Orchestrator,
    OrchestratorView, Phase, SimulationGateway,
};
use tracing::{info, warn};

mod app;
mod ui;

use app::{pump_commands, InspectorApp, InspectorCommand};

#[derive(Clone)]
struct ChannelWriter {
    sender: Sender<String>,
}

impl std::io::Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Ok(text) = String::from_utf8(buf.to_vec()) {
            let _ = self.sender.send(text);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Terminal control panel for the creature race engine", long_about = None)]
struct Cli {
    /// Base URL of the simulation API, e.g. http://localhost:8080/api/simulacao.
    #[arg(long)]
    base_url: Option<String>,
    /// Number of creatures for new runs (2..=10).
    #[arg(long)]
    creatures: Option<u32>,
    /// Initial auto-loop interval in milliseconds.
    #[arg(long)]
    cadence_ms: Option<u64>,
    /// Client config file; defaults to HORIZON_CLIENT_CONFIG_PATH or the builtin copy.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Run without a terminal UI: start, auto-step until the run ends, print standings.
    #[arg(long)]
    headless: bool,
    /// Stop a headless run after this many iterations.
    #[arg(long)]
    max_iterations: Option<u64>,
}

impl Cli {
    fn client_config(&self) -> ClientConfig {
        let mut config = match &self.config {
            Some(path) => {
                let mut config = load_or_builtin(path);
                config.apply_overrides(|key| std::env::var(key).ok());
                config
            }
            None => load_client_config_from_env(),
        };
        if let Some(url) = &self.base_url {
            config.base_url = url.clone();
        }
        if let Some(count) = self.creatures {
            config.default_creature_count = count;
        }
        if let Some(ms) = self.cadence_ms {
            config.initial_cadence_ms = ms;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let log_rx = if cli.headless {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .compact()
            .with_writer(std::io::stderr)
            .init();
        None
    } else {
        let (log_tx, log_rx) = mpsc::channel::<String>();
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .compact()
            .with_ansi(false)
            .with_writer(move || ChannelWriter {
                sender: log_tx.clone(),
            })
            .init();
        Some(log_rx)
    };

    let config = cli.client_config();
    let creature_count = config.default_creature_count;
    let gateway = HttpGateway::new(&config)?;
    info!(target: "horizon::inspector", base_url = gateway.base_url(), "inspector.connecting");
    let orchestrator = Arc::new(Orchestrator::from_config(gateway, &config)?);

    match log_rx {
        None => run_headless(orchestrator, creature_count, cli.max_iterations).await,
        Some(log_rx) => run_interactive(orchestrator, creature_count, log_rx).await,
    }
}

async fn run_interactive<G: SimulationGateway + 'static>(
    orchestrator: Arc<Orchestrator<G>>,
    creature_count: u32,
    log_rx: mpsc::Receiver<String>,
) -> Result<()> {
    let (command_tx, command_rx) = tokio::sync::mpsc::unbounded_channel::<InspectorCommand>();
    let views = orchestrator.subscribe();
    let ui_commands = command_tx.clone();

    let ui_handle = std::thread::spawn(move || -> Result<()> {
        let app = InspectorApp::new(views, ui_commands, log_rx, creature_count)?;
        app.run()
    });

    // Open with a fresh run so the first screen has something to show.
    command_tx
        .send(InspectorCommand::Start(creature_count))
        .map_err(|err| eyre!("command channel closed: {err}"))?;
    drop(command_tx);

    pump_commands(Arc::clone(&orchestrator), command_rx).await;

    orchestrator.set_auto(false);
    info!(target: "horizon::inspector", "inspector.shutdown");
    ui_handle
        .join()
        .map_err(|_| eyre!("inspector UI thread panicked"))?
}

async fn run_headless<G: SimulationGateway + 'static>(
    orchestrator: Arc<Orchestrator<G>>,
    creature_count: u32,
    max_iterations: Option<u64>,
) -> Result<()> {
    let mut views = orchestrator.subscribe();
    orchestrator.initialize(creature_count).await?;
    if !orchestrator.set_auto(true) {
        warn!(target: "horizon::inspector", "auto_loop.not_started");
    }

    let view = loop {
        let view = views.borrow_and_update().clone();
        let capped = max_iterations
            .zip(view.iteration_count())
            .is_some_and(|(cap, iteration)| iteration >= cap);
        if view.phase != Phase::Running || !view.auto_running || capped {
            break view;
        }
        if views.changed().await.is_err() {
            break orchestrator.view();
        }
    };
    orchestrator.set_auto(false);

    print_standings(&view);
    if view.phase == Phase::Running && !view.auto_running {
        if let Some(message) = &view.last_error {
            return Err(eyre!("run stopped early: {message}"));
        }
    }
    Ok(())
}

fn print_standings(view: &OrchestratorView) {
    println!("{}", ui::summary_line(view));
    let Some(snapshot) = &view.snapshot else {
        return;
    };
    for (rank, creature) in ui::standings(snapshot).into_iter().enumerate() {
        println!(
            "{:>2}. #{:<3} x={:>12.0} gold={:>14.2}",
            rank + 1,
            creature.id,
            creature.x,
            creature.gold
        );
    }
    for creature in &snapshot.inactive_creatures {
        println!("  - #{:<3} inactive at x={:.0}", creature.id, creature.x);
    }
}
