use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};

use color_eyre::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use horizon_client::{
    ClientError, ControlOutcome, Orchestrator, OrchestratorView, SimulationGateway,
};
use ratatui::backend::CrosstermBackend;
use ratatui::prelude::*;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::ui::{draw_ui, UiState};

const REDRAW_INTERVAL: Duration = Duration::from_millis(100);
const INPUT_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InspectorCommand {
    Start(u32),
    Step,
    Reset,
    Finish,
    ToggleAuto,
    SpeedUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Quit,
    Command(InspectorCommand),
}

pub fn action_for_key(code: KeyCode, creature_count: u32) -> Option<KeyAction> {
    let command = match code {
        KeyCode::Char('q') | KeyCode::Esc => return Some(KeyAction::Quit),
        KeyCode::Char('.') | KeyCode::Char('s') => InspectorCommand::Step,
        KeyCode::Char('r') => InspectorCommand::Reset,
        KeyCode::Char('f') => InspectorCommand::Finish,
        KeyCode::Char('p') | KeyCode::Char('P') => InspectorCommand::ToggleAuto,
        KeyCode::Char(']') | KeyCode::Char('}') => InspectorCommand::SpeedUp,
        KeyCode::Char('n') => InspectorCommand::Start(creature_count),
        _ => return None,
    };
    Some(KeyAction::Command(command))
}

pub struct InspectorApp {
    terminal: Terminal<CrosstermBackend<std::io::Stdout>>,
    ui_state: UiState,
    views: watch::Receiver<OrchestratorView>,
    command_sender: UnboundedSender<InspectorCommand>,
    log_receiver: Receiver<String>,
}

impl InspectorApp {
    pub fn new(
        views: watch::Receiver<OrchestratorView>,
        command_sender: UnboundedSender<InspectorCommand>,
        log_receiver: Receiver<String>,
        creature_count: u32,
    ) -> Result<Self> {
        let stdout = std::io::stdout();
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        crossterm::terminal::enable_raw_mode()?;
        terminal.clear()?;
        terminal.hide_cursor()?;
        Ok(Self {
            terminal,
            ui_state: UiState::new(creature_count),
            views,
            command_sender,
            log_receiver,
        })
    }

    pub fn run(mut self) -> Result<()> {
        let mut last_draw: Option<Instant> = None;

        loop {
            if self.views.has_changed().unwrap_or(false) {
                let view = self.views.borrow_and_update().clone();
                self.ui_state.set_view(view);
            }

            while let Ok(line) = self.log_receiver.try_recv() {
                self.ui_state.push_log(line);
            }

            if last_draw.map_or(true, |at| at.elapsed() >= REDRAW_INTERVAL) {
                self.terminal.draw(|frame| draw_ui(frame, &self.ui_state))?;
                last_draw = Some(Instant::now());
            }

            if event::poll(INPUT_POLL)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    match action_for_key(key.code, self.ui_state.creature_count) {
                        Some(KeyAction::Quit) => break,
                        Some(KeyAction::Command(command)) => self.send(command),
                        None => {}
                    }
                }
            }
        }

        self.terminal.show_cursor()?;
        crossterm::terminal::disable_raw_mode()?;
        Ok(())
    }

    fn send(&mut self, command: InspectorCommand) {
        if let Err(err) = self.command_sender.send(command) {
            error!(target: "horizon::inspector", ?command, "command.send_failed: {}", err);
            self.ui_state
                .push_log("Command channel closed; restart the inspector");
        }
    }
}

/// Drains user commands in the order they were pressed. Steps run on their
/// own task so a step pressed while another request is outstanding comes
/// back as ignored instead of queueing; every other command finishes before
/// the next one is read.
pub async fn pump_commands<G: SimulationGateway + 'static>(
    orchestrator: Arc<Orchestrator<G>>,
    mut commands: UnboundedReceiver<InspectorCommand>,
) {
    while let Some(command) = commands.recv().await {
        if command == InspectorCommand::Step {
            tokio::spawn(execute(Arc::clone(&orchestrator), command));
        } else {
            execute(Arc::clone(&orchestrator), command).await;
        }
    }
}

/// Runs one user command against the orchestrator and logs what happened.
pub async fn execute<G: SimulationGateway + 'static>(
    orchestrator: Arc<Orchestrator<G>>,
    command: InspectorCommand,
) {
    match command {
        InspectorCommand::Start(count) => match orchestrator.initialize(count).await {
            Ok(view) => info!(
                target: "horizon::inspector",
                creatures = count,
                iteration = view.iteration_count(),
                "command.start"
            ),
            Err(err) => warn!(target: "horizon::inspector", "start failed: {}", err.display_message()),
        },
        InspectorCommand::Reset => match orchestrator.reset().await {
            Ok(_) => info!(target: "horizon::inspector", "command.reset"),
            Err(err) => warn!(target: "horizon::inspector", "reset failed: {}", err.display_message()),
        },
        InspectorCommand::Step => {
            report("step", orchestrator.step_once().await);
        }
        InspectorCommand::Finish => {
            report("finish", orchestrator.force_finish().await);
        }
        InspectorCommand::ToggleAuto => {
            let running = orchestrator.toggle_auto();
            info!(target: "horizon::inspector", running, "command.toggle_auto");
        }
        InspectorCommand::SpeedUp => {
            let cadence = orchestrator.speed_up();
            info!(target: "horizon::inspector", "Speed set to {}", cadence);
        }
    }
}

fn report(
    label: &'static str,
    result: std::result::Result<ControlOutcome, ClientError>,
) {
    match result {
        Ok(ControlOutcome::Applied(view)) => {
            info!(
                target: "horizon::inspector",
                command = label,
                iteration = view.iteration_count(),
                phase = view.phase.as_str(),
                "command.applied"
            );
        }
        Ok(ControlOutcome::Ignored(reason)) => {
            info!(
                target: "horizon::inspector",
                command = label,
                reason = reason.as_str(),
                "command.ignored"
            );
        }
        Err(err) => {
            warn!(target: "horizon::inspector", "{} failed: {}", label, err.display_message());
        }
    }
}
