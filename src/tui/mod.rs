mod export;
mod help;
mod state;

use crate::cli::{build_config, build_workflow, load_files, Cli};
use crate::model::{AnalysisOption, ViewState, WorkflowEvent, WorkflowSnapshot};
use crate::orchestrator::{self, UiCommand};
use anyhow::{Context, Result};
use crossterm::{
    event::{
        self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode, KeyEventKind,
        KeyModifiers,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Tabs, Wrap},
    Terminal,
};
use state::{parse_paths, UiState};
use std::sync::Arc;
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub async fn run(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    let log_path = crate::logging::init_file(&cfg.data_dir).ok();

    // Unbounded channels keep the UI thread from ever blocking on the controller.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<WorkflowEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    let workflow = Arc::new(build_workflow(&args, &cfg)?.with_notifier(event_tx));
    let initial = workflow.snapshot();
    let analyze_on_launch = args.analyze_on_launch && !initial.files.is_empty();

    let mut ui_state = UiState::new(initial, cfg.endpoint.clone());
    ui_state.log_path = log_path;

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_handle = std::thread::spawn(move || run_threaded(ui_state, event_rx, cmd_tx));

    let res = orchestrator::run_controller(workflow, analyze_on_launch, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    mut state: UiState,
    mut event_rx: UnboundedReceiver<WorkflowEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now() - tick_rate;

    let res = loop {
        while let Ok(ev) = event_rx.try_recv() {
            state.apply_event(ev);
        }

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if !event::poll(Duration::from_millis(10)).unwrap_or(false) {
            continue;
        }
        match event::read() {
            Ok(Event::Paste(text)) => {
                if let Some(input) = state.input.as_mut() {
                    input.push_str(&text);
                } else {
                    select_paths(&mut state, &cmd_tx, &text);
                }
            }
            Ok(Event::Key(k)) => {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                if k.modifiers == KeyModifiers::CONTROL && k.code == KeyCode::Char('c') {
                    let _ = cmd_tx.send(UiCommand::Quit);
                    break Ok(());
                }
                if state.input.is_some() {
                    handle_input_key(&mut state, &cmd_tx, k.code);
                    continue;
                }
                match k.code {
                    KeyCode::Char('q') => {
                        let _ = cmd_tx.send(UiCommand::Quit);
                        break Ok(());
                    }
                    KeyCode::Char('o') => {
                        state.tab = 0;
                        state.input = Some(String::new());
                    }
                    KeyCode::Char(c @ '1'..='3') => {
                        let idx = (c as usize) - ('1' as usize);
                        let _ = cmd_tx.send(UiCommand::Toggle(AnalysisOption::ALL[idx]));
                    }
                    KeyCode::Char('a') | KeyCode::Enter => {
                        if state.has_files() {
                            let _ = cmd_tx.send(UiCommand::Analyze);
                        } else {
                            state.info = "Select a file first (press 'o' or drop files)".into();
                        }
                    }
                    KeyCode::Char('y') => match state.snapshot.rendering.as_deref() {
                        Some(text) => match export::copy_to_clipboard(text) {
                            Ok(_) => state.info = "✓ Copied results to clipboard".into(),
                            Err(e) => state.info = format!("Clipboard copy failed: {e:#}"),
                        },
                        None => state.info = "No results to copy yet.".into(),
                    },
                    KeyCode::Char('s') => match state.snapshot.rendering.clone() {
                        Some(text) => match export::export_rendering(&text) {
                            Ok(p) => state.info = format!("Exported: {}", p.display()),
                            Err(e) => state.info = format!("Export failed: {e:#}"),
                        },
                        None => state.info = "No results to export yet.".into(),
                    },
                    KeyCode::Tab => state.tab = (state.tab + 1) % 2,
                    KeyCode::Char('?') => state.tab = 1,
                    _ => {}
                }
            }
            _ => {}
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, DisableBracketedPaste, LeaveAlternateScreen).ok();
    res
}

fn handle_input_key(state: &mut UiState, cmd_tx: &UnboundedSender<UiCommand>, code: KeyCode) {
    match code {
        KeyCode::Esc => {
            state.input = None;
            state.info = "Selection cancelled".into();
        }
        KeyCode::Enter => {
            let text = state.input.take().unwrap_or_default();
            select_paths(state, cmd_tx, &text);
        }
        KeyCode::Backspace => {
            if let Some(input) = state.input.as_mut() {
                input.pop();
            }
        }
        KeyCode::Char(c) => {
            if let Some(input) = state.input.as_mut() {
                input.push(c);
            }
        }
        _ => {}
    }
}

/// Read the given paths and replace the selection. An empty list clears it.
fn select_paths(state: &mut UiState, cmd_tx: &UnboundedSender<UiCommand>, text: &str) {
    let paths = parse_paths(text);
    match load_files(&paths) {
        Ok(handles) => {
            state.info = match handles.len() {
                0 => "Selection cleared".into(),
                1 => format!("Selected {}", handles[0].name()),
                n => format!("Selected {n} files (only the first is uploaded)"),
            };
            let _ = cmd_tx.send(UiCommand::Select(handles));
        }
        Err(e) => state.info = format!("Could not read selection: {e:#}"),
    }
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0), Constraint::Length(3)].as_ref())
        .split(area);

    let tabs = Tabs::new(vec![Line::from("Workflow"), Line::from("Help")])
        .select(state.tab)
        .block(Block::default().borders(Borders::ALL).title("PAPERS PLEASE"))
        .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match state.tab {
        0 => draw_workflow(chunks[1], f, state),
        _ => help::draw_help(chunks[1], f),
    }

    draw_footer(chunks[2], f, state);
}

fn draw_workflow(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let snap = &state.snapshot;
    let main = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length((snap.files.len().clamp(1, 6) + 2) as u16),
                Constraint::Length(7),
                Constraint::Min(0),
            ]
            .as_ref(),
        )
        .split(area);

    let top = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)].as_ref())
        .split(main[0]);
    f.render_widget(files_panel(snap), top[0]);
    f.render_widget(options_panel(snap), top[1]);

    f.render_widget(status_panel(state), main[1]);

    let results: Vec<Line> = match snap.rendering.as_deref() {
        Some(text) if !text.is_empty() => text.lines().map(|l| Line::from(l.to_string())).collect(),
        Some(_) => vec![Line::from("The last analysis returned no records.")],
        None => vec![Line::from(Span::styled(
            "No analysis results available.",
            Style::default().fg(Color::DarkGray),
        ))],
    };
    let p = Paragraph::new(results)
        .wrap(Wrap { trim: false })
        .style(Style::default().fg(Color::Cyan))
        .block(Block::default().borders(Borders::ALL).title("Analysis Results"));
    f.render_widget(p, main[2]);
}

fn files_panel(snap: &WorkflowSnapshot) -> Paragraph<'static> {
    let lines: Vec<Line> = if snap.files.is_empty() {
        vec![Line::from(Span::styled(
            "Drop files here or press 'o' to select",
            Style::default().fg(Color::DarkGray),
        ))]
    } else {
        snap.files
            .iter()
            .enumerate()
            .map(|(i, file)| {
                let marker = if i == 0 { "▶ " } else { "  " };
                Line::from(vec![
                    Span::styled(marker, Style::default().fg(Color::Cyan)),
                    Span::raw(file.name().to_string()),
                    Span::styled(
                        format!("  ({} bytes)", file.len()),
                        Style::default().fg(Color::DarkGray),
                    ),
                ])
            })
            .collect()
    };
    Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Selected Files"))
}

fn options_panel(snap: &WorkflowSnapshot) -> Paragraph<'static> {
    let lines: Vec<Line> = AnalysisOption::ALL
        .iter()
        .enumerate()
        .map(|(i, option)| {
            let checked = snap.options.contains(*option);
            let (mark, style) = if checked {
                ("[x]", Style::default().fg(Color::Green))
            } else {
                ("[ ]", Style::default())
            };
            Line::from(vec![
                Span::styled(format!("{} ", i + 1), Style::default().fg(Color::Magenta)),
                Span::styled(format!("{mark} {option}"), style),
            ])
        })
        .collect();
    Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Select EIPs"))
}

fn status_panel(state: &UiState) -> Paragraph<'static> {
    let snap = &state.snapshot;
    let mut lines = Vec::new();

    let (label, style) = match &snap.view {
        ViewState::Analyzing => (
            "ANALYZING...".to_string(),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::SLOW_BLINK),
        ),
        ViewState::Error(_) => ("Error".to_string(), Style::default().fg(Color::Red)),
        ViewState::Success(_) => ("Success".to_string(), Style::default().fg(Color::Green)),
        other => (other.label().to_string(), Style::default()),
    };
    lines.push(Line::from(vec![
        Span::styled("State: ", Style::default().fg(Color::Gray)),
        Span::styled(label, style),
    ]));

    if let ViewState::Error(msg) = &snap.view {
        lines.push(Line::from(Span::styled(
            msg.clone(),
            Style::default().fg(Color::Red),
        )));
    }
    if let ViewState::Success(resp) = &snap.view {
        if let Some(msg) = resp.message.as_deref() {
            lines.push(Line::from(vec![
                Span::styled("Message: ", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(msg.to_string()),
            ]));
        }
        if let Some(progress) = resp.progress {
            lines.push(Line::from(crate::render::progress_label(progress)));
        }
    }
    if let Some(ts) = snap.last_completed_utc.as_deref() {
        lines.push(Line::from(Span::styled(
            format!("Last run: {ts}"),
            Style::default().fg(Color::DarkGray),
        )));
    }
    lines.push(Line::from(Span::styled(
        format!("Endpoint: {}", state.endpoint),
        Style::default().fg(Color::DarkGray),
    )));

    Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Status"))
}

fn draw_footer(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let line = if let Some(input) = state.input.as_deref() {
        Line::from(vec![
            Span::styled("Files: ", Style::default().fg(Color::Yellow)),
            Span::raw(input.to_string()),
            Span::styled("█", Style::default().fg(Color::Yellow)),
        ])
    } else if !state.info.is_empty() {
        Line::from(state.info.clone())
    } else if state.has_files() && !state.snapshot.in_flight {
        Line::from(vec![
            Span::raw("Press "),
            Span::styled("a", Style::default().fg(Color::Magenta)),
            Span::raw(" to analyze, "),
            Span::styled("?", Style::default().fg(Color::Magenta)),
            Span::raw(" for help"),
        ])
    } else {
        let mut spans = vec![
            Span::raw("Press "),
            Span::styled("o", Style::default().fg(Color::Magenta)),
            Span::raw(" to select files, "),
            Span::styled("?", Style::default().fg(Color::Magenta)),
            Span::raw(" for help"),
        ];
        if let Some(p) = state.log_path.as_ref() {
            spans.push(Span::styled(
                format!("  (log: {})", p.display()),
                Style::default().fg(Color::DarkGray),
            ));
        }
        Line::from(spans)
    };
    let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
    f.render_widget(p, area);
}
