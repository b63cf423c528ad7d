use std::collections::VecDeque;
use std::io;
use std::any::Any;
use std::sync::mpsc::TryRecvError;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8Path;
use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use miette::IntoDiagnostic;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use crate::app::{ProgressEvent, ProgressSink, ProgressSinkKind};
use crate::error::IngestError;

const EVENTS_MAX: usize = 8;
const LOGS_MAX: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Resolve,
    Download,
    Verify,
    Store,
    Extract,
    Transform,
    Postprocess,
    Done,
}

impl Phase {
    const ALL: [Phase; 8] = [
        Phase::Resolve,
        Phase::Download,
        Phase::Verify,
        Phase::Store,
        Phase::Extract,
        Phase::Transform,
        Phase::Postprocess,
        Phase::Done,
    ];

    fn label(self) -> &'static str {
        match self {
            Phase::Resolve => "Resolve",
            Phase::Download => "Download",
            Phase::Verify => "Verify",
            Phase::Store => "Store",
            Phase::Extract => "Extract",
            Phase::Transform => "Transform",
            Phase::Postprocess => "Postprocess",
            Phase::Done => "Done",
        }
    }

    fn index(self) -> usize {
        Phase::ALL.iter().position(|p| *p == self).unwrap_or(0)
    }
}

#[derive(Debug)]
struct TuiState {
    status: String,
    phase: Phase,
    events: VecDeque<String>,
    logs: VecDeque<String>,
    show_logs: bool,
    log_scroll: u16,
    last_elapsed: Option<Duration>,
    started: Instant,
    active: bool,
}

pub struct Tui {
    kind: ProgressSinkKind,
    cache_label: String,
    state: Arc<Mutex<TuiState>>,
}

struct TuiProgress {
    state: Arc<Mutex<TuiState>>,
}

impl ProgressSink for TuiProgress {
    fn event(&self, event: ProgressEvent) {
        if let Ok(mut state) = self.state.lock() {
            let message = event.message.trim().to_string();
            if let Some((phase, payload)) = parse_phase(&message) {
                state.phase = phase;
                state.status = payload.to_string();
            } else {
                state.status = message.clone();
            }
            if event.elapsed.is_some() {
                state.last_elapsed = event.elapsed;
            }
            push_bounded(&mut state.events, message.clone(), EVENTS_MAX);
            push_bounded(
                &mut state.logs,
                format!("[{}] {message}", chrono::Local::now().format("%H:%M:%S")),
                LOGS_MAX,
            );
        }
    }
}

impl Tui {
    pub fn new(kind: ProgressSinkKind, cache_root: &Utf8Path) -> Self {
        let cache_label = match dir_size(cache_root.as_std_path()) {
            Some(bytes) => format!("Cache: {cache_root} · {}", bytes_to_human(bytes)),
            None => format!("Cache: {cache_root} · empty"),
        };
        Self {
            kind,
            cache_label,
            state: Arc::new(Mutex::new(TuiState {
                status: "starting".to_string(),
                phase: Phase::Resolve,
                events: VecDeque::new(),
                logs: VecDeque::new(),
                show_logs: false,
                log_scroll: 0,
                last_elapsed: None,
                started: Instant::now(),
                active: false,
            })),
        }
    }

    pub fn run<F, R>(&mut self, f: F) -> miette::Result<R>
    where
        F: FnOnce(&dyn ProgressSink) -> Result<R, IngestError> + Send + 'static,
        R: Send + 'static,
    {
        self.set_active(true);

        let mut stdout = io::stdout();
        enable_raw_mode().into_diagnostic()?;
        stdout.execute(EnterAlternateScreen).into_diagnostic()?;

        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).into_diagnostic()?;
        terminal.clear().into_diagnostic()?;

        let (tx, rx) = std::sync::mpsc::channel();
        let sink = TuiProgress {
            state: self.state.clone(),
        };
        let handle = thread::spawn(move || tx.send(f(&sink)));

        let mut tick = 0usize;
        loop {
            if let Ok(state) = self.state.lock() {
                terminal
                    .draw(|frame| draw_ui(frame, self, &state, tick))
                    .into_diagnostic()?;
            }

            match rx.try_recv() {
                Ok(result) => {
                    self.set_active(false);
                    leave_screen()?;
                    handle.join().ok();
                    return result.map_err(miette::Report::new);
                }
                Err(TryRecvError::Disconnected) => {
                    self.set_active(false);
                    leave_screen()?;
                    let message = handle
                        .join()
                        .err()
                        .map(|payload| panic_message(payload.as_ref()))
                        .unwrap_or_else(|| "worker exited without a result".to_string());
                    return Err(worker_failure(&message));
                }
                Err(TryRecvError::Empty) => {}
            }

            if event::poll(Duration::from_millis(120)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    if self.handle_key(key) {
                        break;
                    }
                }
            }

            tick = tick.wrapping_add(1);
        }

        self.set_active(false);
        leave_screen()?;
        Err(miette::Report::msg("aborted"))
    }

    fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        match key.code {
            KeyCode::Esc => return true,
            KeyCode::F(4) | KeyCode::Char('l') => state.show_logs = !state.show_logs,
            KeyCode::PageUp => state.log_scroll = state.log_scroll.saturating_sub(5),
            KeyCode::PageDown => state.log_scroll = state.log_scroll.saturating_add(5),
            _ => {}
        }
        false
    }

    fn set_active(&self, active: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.active = active;
            if active {
                state.started = Instant::now();
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn worker_failure(message: &str) -> miette::Report {
    miette::Report::msg(format!("worker failed: {message}"))
}

fn leave_screen() -> miette::Result<()> {
    disable_raw_mode().into_diagnostic()?;
    io::stdout()
        .execute(LeaveAlternateScreen)
        .into_diagnostic()?;
    Ok(())
}

fn draw_ui(frame: &mut ratatui::Frame, tui: &Tui, state: &TuiState, tick: usize) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(1),
        ])
        .split(frame.area());

    frame.render_widget(draw_header(tui, tick), chunks[0]);
    if state.show_logs {
        frame.render_widget(draw_logs(state), chunks[1]);
    } else {
        frame.render_widget(draw_status(state), chunks[1]);
    }
    let footer = Paragraph::new("Esc abort · l/F4 logs · PgUp/PgDn scroll")
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(footer, chunks[2]);
}

fn draw_header(tui: &Tui, tick: usize) -> Paragraph<'static> {
    let hb = if tick % 2 == 0 { "*" } else { " " };
    let op_label = match tui.kind {
        ProgressSinkKind::Download => "Download",
        ProgressSinkKind::Extract => "Extract",
        ProgressSinkKind::Transform => "Transform",
        ProgressSinkKind::Postprocess => "Postprocess",
        ProgressSinkKind::Pipeline => "Pipeline",
    };
    let title = Line::from(vec![
        Span::styled(
            "PHENOPACKET-INGEST",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(env!("CARGO_PKG_VERSION"), Style::default().fg(Color::Gray)),
        Span::raw("   Op: "),
        Span::styled(op_label, Style::default().fg(Color::Cyan)),
        Span::raw("   "),
        Span::styled(hb, Style::default().fg(Color::Green)),
    ]);
    let cache = Line::from(Span::styled(
        tui.cache_label.clone(),
        Style::default().fg(Color::Gray),
    ));
    Paragraph::new(vec![title, cache])
        .alignment(Alignment::Left)
        .block(Block::default().borders(Borders::BOTTOM))
}

fn draw_status(state: &TuiState) -> Paragraph<'static> {
    let phase_color = if state.active {
        Color::Cyan
    } else {
        Color::Green
    };
    let steps: Vec<Span> = Phase::ALL
        .iter()
        .flat_map(|phase| {
            let style = if *phase == state.phase {
                Style::default().fg(phase_color).add_modifier(Modifier::BOLD)
            } else if phase.index() < state.phase.index() {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            [Span::styled(phase.label(), style), Span::raw(" > ")]
        })
        .collect();

    let elapsed = state.started.elapsed().as_secs();
    let mut lines = vec![
        Line::from(Span::styled(
            "STATUS / PROGRESS",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(steps),
        Line::from(vec![
            Span::styled("Phase: ", Style::default().fg(Color::Gray)),
            Span::raw(progress_bar(state.phase)),
            Span::raw(format!("   elapsed {elapsed}s")),
        ]),
        Line::from(vec![
            Span::styled("Status: ", Style::default().fg(Color::Gray)),
            Span::raw(state.status.clone()),
        ]),
    ];
    if let Some(last) = state.last_elapsed {
        lines.push(Line::from(format!("Last step took {} ms", last.as_millis())));
    }
    lines.push(Line::from(Span::styled(
        "Recent events:",
        Style::default().fg(Color::Gray),
    )));
    for event in state.events.iter().rev() {
        lines.push(Line::from(format!("- {event}")));
    }

    Paragraph::new(lines).wrap(Wrap { trim: true })
}

fn draw_logs(state: &TuiState) -> Paragraph<'static> {
    let lines: Vec<Line> = state
        .logs
        .iter()
        .map(|line| Line::from(line.clone()))
        .collect();
    Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Logs"))
        .scroll((state.log_scroll, 0))
}

fn progress_bar(phase: Phase) -> String {
    let total = Phase::ALL.len();
    let filled = phase.index() + 1;
    let mut out = String::from("[");
    for i in 0..total {
        out.push(if i < filled { '#' } else { '.' });
    }
    out.push(']');
    out
}

fn parse_phase(message: &str) -> Option<(Phase, &str)> {
    let (name, rest) = message.strip_prefix("phase=")?.split_once(';')?;
    let phase = Phase::ALL.into_iter().find(|p| p.label() == name.trim())?;
    Some((phase, rest.trim()))
}

fn push_bounded(buffer: &mut VecDeque<String>, item: String, max: usize) {
    buffer.push_back(item);
    while buffer.len() > max {
        buffer.pop_front();
    }
}

fn dir_size(path: &std::path::Path) -> Option<u64> {
    let mut total = 0u64;
    let mut stack = vec![path.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries = std::fs::read_dir(&path).ok()?;
        for entry in entries.flatten() {
            let p = entry.path();
            if p.is_dir() {
                stack.push(p);
            } else if let Ok(meta) = entry.metadata() {
                total = total.saturating_add(meta.len());
            }
        }
    }
    Some(total)
}

fn bytes_to_human(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    let value = bytes as f64;
    if value >= GB {
        format!("{:.1} GB", value / GB)
    } else if value >= MB {
        format!("{:.1} MB", value / MB)
    } else if value >= KB {
        format!("{:.1} KB", value / KB)
    } else {
        format!("{bytes} B")
    }
}
