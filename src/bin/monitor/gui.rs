//! The terminal view of a running experiment: the room grid with every
//! sensor cell colored by how recently its node last logged data.

use std::error::Error;
use std::fmt::Display;
use std::io::stdout;
use std::time::{Duration, SystemTime};

use crossterm::{
    event::{self, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{block::Title, *},
    Terminal,
};

use sinet::config::ExperimentProfile;

#[derive(Debug)]
pub enum MonitorError {
    Io(std::io::Error),
}

impl Display for MonitorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorError::Io(e) => write!(f, "{e}"),
        }
    }
}

impl Error for MonitorError {}

impl From<std::io::Error> for MonitorError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// What one grid cell currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cell {
    Empty,
    Anchor,
    /// A sensor whose node has logged within the given number of epochs,
    /// `None` when its log file does not exist yet.
    Sensor(Option<i64>),
}

/// Build the current grid state from log file ages.
fn scan(profile: &ExperimentProfile) -> Vec<Cell> {
    let room = &profile.room;
    let data_dir = profile.experiment_data_dir();
    let epoch_ms = profile.epoch_ms() as u128;
    let mut cells = vec![Cell::Empty; room.len()];
    for anchor in &room.anchors {
        cells[room.flat_index(anchor)] = Cell::Anchor;
    }
    for (idx, sensor) in room.sensors[..profile.nodes as usize].iter().enumerate() {
        let path = data_dir.join(format!("Node{}_data.csv", idx + 1));
        let freshness = path
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|mtime| SystemTime::now().duration_since(mtime).ok())
            .map(|age| (age.as_millis() / epoch_ms.max(1)) as i64);
        cells[room.flat_index(sensor)] = Cell::Sensor(freshness);
    }
    cells
}

fn cell_span(cell: Cell) -> Span<'static> {
    match cell {
        Cell::Empty => Span::styled(" ·", Style::default().fg(Color::DarkGray)),
        Cell::Anchor => Span::styled("██", Style::default().fg(Color::Gray)),
        Cell::Sensor(None) => Span::styled("▒▒", Style::default().fg(Color::DarkGray)),
        Cell::Sensor(Some(behind)) => {
            let color = if behind <= 5 {
                Color::Green
            } else if behind <= 60 {
                Color::Yellow
            } else {
                Color::Red
            };
            Span::styled("██", Style::default().fg(color))
        }
    }
}

/// Run the monitor until the user presses `q`.
pub fn engage_monitor(
    profile: &ExperimentProfile,
    refresh: Duration,
) -> Result<(), MonitorError> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let (width, height) = profile.room.dim;
    let mut last_scan = std::time::Instant::now() - refresh;
    let mut cells = Vec::new();
    loop {
        if last_scan.elapsed() >= refresh {
            cells = scan(profile);
            last_scan = std::time::Instant::now();
        }

        let title = Title::from(format!(" {} node freshness ", profile.name).magenta().bold());
        let legend = Title::from(Line::from(vec![
            " fresh ".into(),
            "██".green(),
            " stale ".into(),
            "██".yellow(),
            " dead ".into(),
            "██".red(),
            " quit ".into(),
            "<Q> ".magenta().bold(),
        ]));
        let block = Block::default()
            .title(title.alignment(Alignment::Center))
            .title(
                legend
                    .alignment(Alignment::Center)
                    .position(ratatui::widgets::block::Position::Bottom),
            )
            .borders(Borders::ALL);

        // rows top-down, so the highest y prints first (origin lower-left)
        let lines: Vec<Line> = (0..height)
            .rev()
            .map(|y| {
                Line::from(
                    (0..width)
                        .map(|x| cell_span(cells[y * width + x]))
                        .collect::<Vec<_>>(),
                )
            })
            .collect();
        let map = Paragraph::new(lines)
            .alignment(Alignment::Center)
            .block(block);

        terminal.draw(|frame| {
            let area = frame.size();
            frame.render_widget(map, area);
        })?;

        if event::poll(Duration::from_millis(100))? {
            if let event::Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && key.code == KeyCode::Char('q') {
                    break;
                }
            }
        }
    }

    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    Ok(())
}
