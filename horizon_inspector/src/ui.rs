use std::collections::VecDeque;

use horizon_client::{goal_progress, OrchestratorView, Phase};
use horizon_schema::{Creature, Snapshot};
use ratatui::layout::{Constraint, Direction, Layout, Margin};
use ratatui::prelude::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, Wrap};
use ratatui::Frame;

pub struct UiState {
    pub view: Option<OrchestratorView>,
    pub logs: VecDeque<String>,
    pub max_logs: usize,
    pub creature_count: u32,
}

impl UiState {
    pub fn new(creature_count: u32) -> Self {
        Self {
            view: None,
            logs: VecDeque::new(),
            max_logs: 8,
            creature_count,
        }
    }

    pub fn set_view(&mut self, view: OrchestratorView) {
        self.view = Some(view);
    }

    pub fn push_log<S: Into<String>>(&mut self, line: S) {
        let mut text: String = line.into();
        while text.ends_with('\n') || text.ends_with('\r') {
            text.pop();
        }
        if text.is_empty() {
            return;
        }
        self.logs.push_front(text);
        while self.logs.len() > self.max_logs {
            self.logs.pop_back();
        }
    }
}

/// Active creatures ordered by distance covered, furthest first.
pub fn standings(snapshot: &Snapshot) -> Vec<&Creature> {
    let mut creatures: Vec<&Creature> = snapshot.status_creatures.iter().collect();
    creatures.sort_by(|a, b| b.x.total_cmp(&a.x).then(a.id.0.cmp(&b.id.0)));
    creatures
}

/// Single-line run summary printed at the end of a headless run.
pub fn summary_line(view: &OrchestratorView) -> String {
    let leader = view
        .snapshot
        .as_ref()
        .and_then(Snapshot::leader)
        .map(|creature| creature.id.to_string())
        .unwrap_or_else(|| "-".to_string());
    let winner = view
        .winner
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "phase={} iterations={} leader={} winner={}",
        view.phase.as_str(),
        view.iteration_count().unwrap_or(0),
        leader,
        winner
    )
}

pub fn progress_bar(creature: &Creature, width: usize) -> String {
    let filled = (goal_progress(creature) * width as f64).round() as usize;
    let filled = filled.min(width);
    format!("{}{}", "#".repeat(filled), ".".repeat(width - filled))
}

pub fn draw_ui(frame: &mut Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(6),
            Constraint::Length(10),
            Constraint::Length(5),
        ])
        .split(frame.size());

    draw_header(frame, chunks[0], state);
    draw_active(frame, chunks[1], state);
    draw_inactive(frame, chunks[2], state);
    draw_logs(frame, chunks[3], state);
    draw_commands(frame, chunks[4]);
}

fn phase_style(phase: Phase) -> Style {
    match phase {
        Phase::Idle => Style::default().fg(Color::DarkGray),
        Phase::Running => Style::default().fg(Color::Green),
        Phase::Finished => Style::default().fg(Color::Magenta),
    }
}

fn draw_header(frame: &mut Frame, area: Rect, state: &UiState) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Horizon Race Inspector");
    let line = match &state.view {
        None => Line::from(Span::styled(
            "Waiting for the first run",
            Style::default().fg(Color::DarkGray),
        )),
        Some(view) => {
            let iteration = view
                .iteration_count()
                .map(|count| count.to_string())
                .unwrap_or_else(|| "-".to_string());
            let mut spans = vec![
                Span::styled(view.phase.as_str(), phase_style(view.phase)),
                Span::raw(" | iteration "),
                Span::styled(iteration, Style::default().fg(Color::Yellow)),
                Span::raw(" | speed "),
                Span::styled(
                    format!("{}x", view.speed_multiplier()),
                    Style::default().fg(Color::Cyan),
                ),
                Span::raw(" | auto "),
                Span::raw(if view.auto_running { "on" } else { "off" }),
            ];
            if let Some(winner) = view.winner {
                spans.push(Span::raw(" | winner "));
                spans.push(Span::styled(
                    format!("#{winner}"),
                    Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
                ));
            } else if let Some(leader) = view.snapshot.as_ref().and_then(Snapshot::leader) {
                spans.push(Span::raw(" | leader "));
                spans.push(Span::styled(
                    format!("#{}", leader.id),
                    Style::default().fg(Color::Green),
                ));
            }
            Line::from(spans)
        }
    };
    let text = Paragraph::new(line).wrap(Wrap { trim: true });
    frame.render_widget(block, area);
    frame.render_widget(
        text,
        area.inner(&Margin {
            vertical: 1,
            horizontal: 1,
        }),
    );
}

fn draw_active(frame: &mut Frame, area: Rect, state: &UiState) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Active Creatures");
    let selected = state.view.as_ref().and_then(|view| view.selected_actor);
    let snapshot = state.view.as_ref().and_then(|view| view.snapshot.as_ref());

    let rows: Vec<Row> = snapshot
        .map(standings)
        .unwrap_or_default()
        .into_iter()
        .map(|creature| {
            let style = if Some(creature.id) == selected {
                Style::default().fg(Color::Black).bg(Color::Yellow)
            } else {
                Style::default()
            };
            Row::new(vec![
                Cell::from(format!("#{}", creature.id)),
                Cell::from(format!("{:>14.0}", creature.x)),
                Cell::from(format!("{:>14.2}", creature.gold)),
                Cell::from(progress_bar(creature, 20)),
            ])
            .style(style)
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(16),
            Constraint::Length(16),
            Constraint::Min(22),
        ],
    )
    .header(
        Row::new(vec!["id", "position", "gold", "progress"])
            .style(Style::default().fg(Color::Yellow)),
    )
    .block(block);
    frame.render_widget(table, area);
}

fn draw_inactive(frame: &mut Frame, area: Rect, state: &UiState) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Inactive Creatures");
    let lines: Vec<Line> = state
        .view
        .as_ref()
        .and_then(|view| view.snapshot.as_ref())
        .map(|snapshot| {
            snapshot
                .inactive_creatures
                .iter()
                .map(|creature| {
                    Line::from(vec![
                        Span::styled(
                            format!("#{:<4}", creature.id),
                            Style::default().fg(Color::DarkGray),
                        ),
                        Span::raw(format!(" stopped at {:.0}", creature.x)),
                    ])
                })
                .collect()
        })
        .unwrap_or_default();
    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false });
    frame.render_widget(block, area);
    frame.render_widget(
        paragraph,
        area.inner(&Margin {
            vertical: 1,
            horizontal: 1,
        }),
    );
}

fn draw_logs(frame: &mut Frame, area: Rect, state: &UiState) {
    let block = Block::default().borders(Borders::ALL).title("Logs");
    let mut lines: Vec<Line> = Vec::new();
    if let Some(message) = state.view.as_ref().and_then(|view| view.last_error.as_ref()) {
        lines.push(Line::from(Span::styled(
            format!("last error: {message}"),
            Style::default().fg(Color::Red),
        )));
    }
    lines.extend(state.logs.iter().map(|entry| Line::from(Span::raw(entry))));
    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false });
    frame.render_widget(block, area);
    frame.render_widget(
        paragraph,
        area.inner(&Margin {
            vertical: 1,
            horizontal: 1,
        }),
    );
}

fn draw_commands(frame: &mut Frame, area: Rect) {
    let key = |label: &'static str| Span::styled(label, Style::default().fg(Color::Yellow));
    let lines = vec![
        Line::from(vec![
            key(". / s"),
            Span::raw(" step   "),
            key("p"),
            Span::raw(" auto   "),
            key("]"),
            Span::raw(" speed up"),
        ]),
        Line::from(vec![
            key("r"),
            Span::raw(" reset   "),
            key("f"),
            Span::raw(" finish   "),
            key("n"),
            Span::raw(" new run   "),
            key("q"),
            Span::raw(" exit inspector"),
        ]),
    ];
    let block = Block::default().borders(Borders::ALL).title("Commands");
    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false });
    frame.render_widget(block, area);
    frame.render_widget(
        paragraph,
        area.inner(&Margin {
            vertical: 1,
            horizontal: 1,
        }),
    );
}
