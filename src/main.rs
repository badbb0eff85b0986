use std::collections::BTreeSet;
use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use arboard::Clipboard;
use clap::Parser;
use crossterm::event::{self, Event as CEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::{execute, ExecutableCommand};
use log::{info, warn, LevelFilter};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use rand::seq::SliceRandom;
use rand::Rng;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout};
use ratatui::prelude::{Color, Modifier, Rect, Style, Stylize};
use ratatui::text::{Line, Span};
use ratatui::widgets::block::Padding;
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, Paragraph};
use ratatui::Terminal;
use simplelog::WriteLogger;
use tui_big_text::BigTextBuilder;

const SAMPLE_LIST: &str = "Apple\nBanana\nCherry\nDate\nElderberry";

const DEFAULT_STAGGER_SECS: f64 = 1.5;
const DEFAULT_ANIM_SECS: f64 = 1.0;
const HIGHLIGHT_OVERLAP_SECS: f64 = 0.4;
const SETTING_STEP_SECS: f64 = 0.1;

const COUNTDOWN_FROM: u32 = 3;
const COUNTDOWN_STEP_SECS: f64 = 1.0;

const MAX_IMPORT_BYTES: u64 = 5 * 1024 * 1024;
const IDLE_POLL: Duration = Duration::from_millis(120);

const HIGHLIGHT_BG: Color = Color::Rgb(255, 127, 80);

fn inset_rect(area: Rect, horizontal: u16, vertical: u16) -> Rect {
    let x = area.x.saturating_add(horizontal);
    let y = area.y.saturating_add(vertical);
    let width = area.width.saturating_sub(horizontal.saturating_mul(2));
    let height = area.height.saturating_sub(vertical.saturating_mul(2));
    Rect {
        x,
        y,
        width,
        height,
    }
}

fn centered_rect(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn secs_duration(secs: f64) -> Duration {
    Duration::from_secs_f64(secs.max(0.0))
}

#[derive(Debug, Parser)]
#[command(
    name = "shufl",
    version,
    about = "Shuffle a list and reveal it with a staggered highlight wave"
)]
struct Cli {
    /// List file path. Use '-' to read from stdin.
    input: Option<String>,

    /// Shuffle once and print the numbered result to stdout.
    #[arg(long)]
    plain: bool,

    /// Reload when the list file changes (file input only).
    #[arg(long)]
    watch: bool,

    /// Append diagnostics to this file.
    #[arg(long, value_name = "PATH")]
    log: Option<PathBuf>,
}

/// Splits raw text into trimmed, non-empty items. A single line containing
/// commas falls back to CSV splitting.
fn parse_lines(text: &str) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut pieces: Vec<&str> = normalized.split('\n').collect();
    if pieces.len() == 1 && normalized.contains(',') {
        pieces = normalized.split(',').collect();
    }
    pieces
        .into_iter()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .map(str::to_string)
        .collect()
}

fn shuffled<R: Rng>(items: &[String], rng: &mut R) -> Vec<String> {
    let mut out = items.to_vec();
    if out.len() > 1 {
        out.shuffle(rng);
    }
    out
}

fn format_numbered(items: &[String]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| format!("{}. {item}", idx + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Clone, Copy, Debug)]
struct Timing {
    stagger: f64,
    anim_duration: f64,
    overlap: f64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            stagger: DEFAULT_STAGGER_SECS,
            anim_duration: DEFAULT_ANIM_SECS,
            overlap: HIGHLIGHT_OVERLAP_SECS,
        }
    }
}

impl Timing {
    fn clamped(self) -> Self {
        let stagger = self.stagger.max(0.0);
        Self {
            stagger,
            anim_duration: self.anim_duration.max(0.0),
            // overlap beyond the stagger would put an item's hide before its
            // own show; clamp instead
            overlap: self.overlap.max(0.0).min(stagger),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HighlightStep {
    Show(usize),
    Hide(usize),
}

#[derive(Clone, Copy, Debug)]
struct ScheduledStep {
    due: Instant,
    run: u64,
    step: HighlightStep,
}

/// Moves a highlight wave across a fixed-length list. Each index gets a show
/// event at `i * stagger` and a hide event at `i * stagger + (stagger -
/// overlap)`, all computed once at start time. Events are applied by polling
/// with the current instant; a run counter tags every event so nothing from a
/// superseded session can touch the active set.
struct HighlightSequence {
    run: u64,
    steps: Vec<ScheduledStep>,
    cursor: usize,
    active: BTreeSet<usize>,
}

impl HighlightSequence {
    fn new() -> Self {
        Self {
            run: 0,
            steps: Vec::new(),
            cursor: 0,
            active: BTreeSet::new(),
        }
    }

    fn start(&mut self, count: usize, timing: Timing, now: Instant) {
        self.cancel();
        self.run = self.run.wrapping_add(1);

        let timing = timing.clamped();
        let hold = secs_duration(timing.stagger - timing.overlap);

        let mut steps = Vec::with_capacity(count.saturating_mul(2));
        for index in 0..count {
            let show_at = now + secs_duration(timing.stagger * index as f64);
            steps.push(ScheduledStep {
                due: show_at,
                run: self.run,
                step: HighlightStep::Show(index),
            });
            steps.push(ScheduledStep {
                due: show_at + hold,
                run: self.run,
                step: HighlightStep::Hide(index),
            });
        }
        // stable sort keeps show before hide when both land on one instant
        steps.sort_by_key(|scheduled| scheduled.due);
        self.steps = steps;
    }

    fn cancel(&mut self) {
        self.steps.clear();
        self.cursor = 0;
        self.active.clear();
    }

    /// Applies every step due at `now`, in schedule order, and returns them.
    fn poll(&mut self, now: Instant) -> Vec<HighlightStep> {
        let mut applied = Vec::new();
        while self.cursor < self.steps.len() && self.steps[self.cursor].due <= now {
            let scheduled = self.steps[self.cursor];
            self.cursor += 1;
            if scheduled.run != self.run {
                continue;
            }
            match scheduled.step {
                HighlightStep::Show(index) => {
                    self.active.insert(index);
                }
                HighlightStep::Hide(index) => {
                    self.active.remove(&index);
                }
            }
            applied.push(scheduled.step);
        }
        applied
    }

    fn active(&self) -> &BTreeSet<usize> {
        &self.active
    }

    fn in_flight(&self) -> bool {
        self.cursor < self.steps.len()
    }

    fn next_due(&self) -> Option<Instant> {
        self.steps.get(self.cursor).map(|scheduled| scheduled.due)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CountdownPhase {
    Idle,
    Counting(u32),
    Complete,
}

#[derive(Clone, Copy, Debug)]
struct ScheduledTick {
    due: Instant,
    run: u64,
    show: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CountdownPoll {
    Quiet,
    Ticked,
    Completed,
}

/// Fixed-step 3-2-1 timer. Counts down one number per step and reports
/// completion exactly once; cancellation returns to idle without completing.
struct Countdown {
    run: u64,
    phase: CountdownPhase,
    ticks: Vec<ScheduledTick>,
    cursor: usize,
}

impl Countdown {
    fn new() -> Self {
        Self {
            run: 0,
            phase: CountdownPhase::Idle,
            ticks: Vec::new(),
            cursor: 0,
        }
    }

    fn start(&mut self, from: u32, step_secs: f64, now: Instant) {
        self.cancel();
        self.run = self.run.wrapping_add(1);
        self.phase = CountdownPhase::Counting(from);

        let mut ticks = Vec::with_capacity(from as usize);
        for offset in 1..from {
            ticks.push(ScheduledTick {
                due: now + secs_duration(step_secs * offset as f64),
                run: self.run,
                show: Some(from - offset),
            });
        }
        ticks.push(ScheduledTick {
            due: now + secs_duration(step_secs * from as f64),
            run: self.run,
            show: None,
        });
        self.ticks = ticks;
    }

    fn cancel(&mut self) {
        self.phase = CountdownPhase::Idle;
        self.ticks.clear();
        self.cursor = 0;
    }

    fn poll(&mut self, now: Instant) -> CountdownPoll {
        let mut result = CountdownPoll::Quiet;
        while self.cursor < self.ticks.len() && self.ticks[self.cursor].due <= now {
            let tick = self.ticks[self.cursor];
            self.cursor += 1;
            if tick.run != self.run {
                continue;
            }
            match tick.show {
                Some(value) => {
                    self.phase = CountdownPhase::Counting(value);
                    result = CountdownPoll::Ticked;
                }
                None => {
                    self.phase = CountdownPhase::Complete;
                    result = CountdownPoll::Completed;
                }
            }
        }
        result
    }

    fn current(&self) -> Option<u32> {
        match self.phase {
            CountdownPhase::Counting(value) => Some(value),
            _ => None,
        }
    }

    fn is_counting(&self) -> bool {
        matches!(self.phase, CountdownPhase::Counting(_))
    }

    fn next_due(&self) -> Option<Instant> {
        if !self.is_counting() {
            return None;
        }
        self.ticks.get(self.cursor).map(|tick| tick.due)
    }
}

#[derive(Clone, Copy, Debug)]
struct Settings {
    timing: Timing,
    animations: bool,
    countdown: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timing: Timing::default(),
            animations: true,
            countdown: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SettingsRow {
    Stagger,
    AnimDuration,
    Countdown,
    Animations,
    Reset,
}

const SETTINGS_ROWS: [SettingsRow; 5] = [
    SettingsRow::Stagger,
    SettingsRow::AnimDuration,
    SettingsRow::Countdown,
    SettingsRow::Animations,
    SettingsRow::Reset,
];

enum InputSource {
    File(PathBuf),
    Stdin,
    Sample,
}

struct LoadResult {
    path: Option<PathBuf>,
    text: String,
}

fn detect_input(cli: &Cli) -> InputSource {
    match cli.input.as_deref() {
        Some("-") => InputSource::Stdin,
        Some(path) => InputSource::File(PathBuf::from(path)),
        None => {
            if io::stdin().is_terminal() {
                InputSource::Sample
            } else {
                InputSource::Stdin
            }
        }
    }
}

fn load_list_file(path: &Path) -> Result<String> {
    let meta = fs::metadata(path).with_context(|| format!("Failed to read {}", path.display()))?;
    if meta.len() > MAX_IMPORT_BYTES {
        return Err(anyhow!(
            "{} exceeds the {} MB import limit",
            path.display(),
            MAX_IMPORT_BYTES / (1024 * 1024)
        ));
    }
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn read_input(source: &InputSource) -> Result<LoadResult> {
    match source {
        InputSource::File(path) => Ok(LoadResult {
            path: Some(path.clone()),
            text: load_list_file(path)?,
        }),
        InputSource::Stdin => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read list from stdin")?;
            Ok(LoadResult {
                path: None,
                text: buf,
            })
        }
        InputSource::Sample => Ok(LoadResult {
            path: None,
            text: SAMPLE_LIST.to_string(),
        }),
    }
}

struct FileWatcher {
    _watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<Event>>,
}

struct App {
    cli: Cli,
    input: String,
    input_path: Option<PathBuf>,
    show_input: bool,
    editing: bool,

    settings: Settings,
    settings_open: bool,
    settings_row: usize,

    run: u64,
    pending: Vec<String>,
    items: Vec<String>,
    revealed: usize,
    highlights: HighlightSequence,
    countdown: Countdown,
    settle_until: Option<Instant>,

    clipboard: Option<Clipboard>,
    status: String,

    watcher: Option<FileWatcher>,
    watch_requested: bool,
}

impl App {
    fn new(cli: Cli, load: LoadResult) -> Self {
        let count = parse_lines(&load.text).len();
        Self {
            cli,
            input: load.text,
            input_path: load.path,
            show_input: true,
            editing: false,
            settings: Settings::default(),
            settings_open: false,
            settings_row: 0,
            run: 0,
            pending: Vec::new(),
            items: Vec::new(),
            revealed: 0,
            highlights: HighlightSequence::new(),
            countdown: Countdown::new(),
            settle_until: None,
            clipboard: None,
            status: format!("{count} items ready"),
            watcher: None,
            watch_requested: false,
        }
    }

    fn is_counting(&self) -> bool {
        self.countdown.is_counting()
    }

    fn randomize(&mut self, now: Instant) {
        if self.is_counting() {
            return;
        }
        let parsed = parse_lines(&self.input);
        if parsed.is_empty() {
            return;
        }

        self.highlights.cancel();
        self.countdown.cancel();
        self.settle_until = None;

        let order = shuffled(&parsed, &mut rand::thread_rng());

        if !self.settings.animations {
            self.run = self.run.wrapping_add(1);
            self.pending.clear();
            self.items = order;
            self.revealed = self.items.len();
            info!(
                "run {} revealed {} items without animation",
                self.run, self.revealed
            );
            return;
        }

        self.pending = order;
        self.items.clear();
        self.revealed = 0;

        if self.settings.countdown {
            self.countdown.start(COUNTDOWN_FROM, COUNTDOWN_STEP_SECS, now);
        } else {
            self.begin_reveal(now);
        }
    }

    fn begin_reveal(&mut self, now: Instant) {
        self.run = self.run.wrapping_add(1);
        self.items = std::mem::take(&mut self.pending);
        self.revealed = 0;
        self.highlights
            .start(self.items.len(), self.settings.timing, now);
        info!("run {} revealing {} items", self.run, self.items.len());
    }

    /// Advances both timers and reacts to whatever fired.
    fn tick(&mut self, now: Instant) {
        match self.countdown.poll(now) {
            CountdownPoll::Completed => self.begin_reveal(now),
            CountdownPoll::Ticked | CountdownPoll::Quiet => {}
        }

        let steps = self.highlights.poll(now);
        if !steps.is_empty() {
            for step in &steps {
                if let HighlightStep::Show(index) = step {
                    self.revealed = self.revealed.max(index + 1);
                }
            }
            if !self.highlights.in_flight() {
                self.settle_until = Some(now + secs_duration(self.settings.timing.anim_duration));
            }
        }

        if let Some(until) = self.settle_until {
            if now >= until {
                self.settle_until = None;
            }
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        let mut next = self.countdown.next_due();
        for candidate in [self.highlights.next_due(), self.settle_until] {
            next = match (next, candidate) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
        }
        next
    }

    fn copy_result(&mut self) {
        if self.is_counting() || self.items.is_empty() {
            self.status = "Nothing to copy yet".to_string();
            return;
        }

        if self.clipboard.is_none() {
            match Clipboard::new() {
                Ok(clipboard) => self.clipboard = Some(clipboard),
                Err(err) => {
                    warn!("clipboard unavailable: {err}");
                    self.status = "Clipboard unavailable".to_string();
                    return;
                }
            }
        }

        let payload = format_numbered(&self.items);
        if let Some(clipboard) = self.clipboard.as_mut() {
            match clipboard.set_text(payload) {
                Ok(()) => self.status = format!("Copied {} items", self.items.len()),
                Err(err) => {
                    warn!("clipboard write failed: {err}");
                    self.status = "Copy failed".to_string();
                }
            }
        }
    }

    /// Replaces the input text, unless the new text has no usable lines.
    fn apply_import(&mut self, text: String, origin: &Path) {
        let count = parse_lines(&text).len();
        if count == 0 {
            self.status = format!("No usable lines in {}", origin.display());
            return;
        }
        self.input = text;
        self.show_input = true;
        self.status = format!("Loaded {count} items from {}", origin.display());
        info!("imported {count} items from {}", origin.display());
    }

    fn reload_current(&mut self) {
        let Some(path) = self.input_path.clone() else {
            return;
        };
        match load_list_file(&path) {
            Ok(text) => self.apply_import(text, &path),
            Err(err) => {
                warn!("reload failed: {err:#}");
                self.status = format!("Reload failed: {err:#}");
            }
        }
    }

    fn ensure_watcher(&mut self) -> Result<()> {
        if !self.cli.watch {
            self.watcher = None;
            return Ok(());
        }

        let Some(path) = self.input_path.clone() else {
            self.watcher = None;
            return Ok(());
        };

        let (tx, rx) = mpsc::channel();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;

        watcher.watch(&path, RecursiveMode::NonRecursive)?;
        self.watcher = Some(FileWatcher {
            _watcher: watcher,
            rx,
        });
        Ok(())
    }

    fn poll_watch(&mut self) {
        if let Some(watcher) = self.watcher.as_mut() {
            while let Ok(event) = watcher.rx.try_recv() {
                if event.is_ok() {
                    self.watch_requested = true;
                }
            }
        }
    }

    fn set_animations(&mut self, enabled: bool) {
        self.settings.animations = enabled;
        if enabled {
            return;
        }

        // switching animations off mid-run finishes the reveal on the spot
        let counting = self.is_counting();
        self.countdown.cancel();
        self.highlights.cancel();
        self.settle_until = None;
        if counting {
            self.run = self.run.wrapping_add(1);
            self.items = std::mem::take(&mut self.pending);
        }
        self.revealed = self.items.len();
    }

    fn settings_adjust(&mut self, increase: bool) {
        let delta = if increase {
            SETTING_STEP_SECS
        } else {
            -SETTING_STEP_SECS
        };
        match SETTINGS_ROWS[self.settings_row] {
            SettingsRow::Stagger => {
                self.settings.timing.stagger = (self.settings.timing.stagger + delta).max(0.0);
            }
            SettingsRow::AnimDuration => {
                self.settings.timing.anim_duration =
                    (self.settings.timing.anim_duration + delta).max(0.0);
            }
            SettingsRow::Countdown => self.settings.countdown = !self.settings.countdown,
            SettingsRow::Animations => self.set_animations(!self.settings.animations),
            SettingsRow::Reset => {}
        }
    }

    fn settings_activate(&mut self) {
        match SETTINGS_ROWS[self.settings_row] {
            SettingsRow::Countdown => self.settings.countdown = !self.settings.countdown,
            SettingsRow::Animations => self.set_animations(!self.settings.animations),
            SettingsRow::Reset => {
                self.settings = Settings::default();
                self.status = "Settings reset to defaults".to_string();
            }
            SettingsRow::Stagger | SettingsRow::AnimDuration => {}
        }
    }

    fn handle_edit_input(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.editing = false;
            }
            KeyCode::Enter => {
                self.input.push('\n');
            }
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Char(c)
                if !key
                    .modifiers
                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
            {
                self.input.push(c);
            }
            _ => {}
        }
    }

    fn handle_settings_input(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc | KeyCode::Char('s') | KeyCode::Char('q') => {
                self.settings_open = false;
            }
            KeyCode::Char('j') | KeyCode::Down => {
                self.settings_row = (self.settings_row + 1).min(SETTINGS_ROWS.len() - 1);
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.settings_row = self.settings_row.saturating_sub(1);
            }
            KeyCode::Char('h') | KeyCode::Left | KeyCode::Char('-') => {
                self.settings_adjust(false);
            }
            KeyCode::Char('l') | KeyCode::Right | KeyCode::Char('+') | KeyCode::Char('=') => {
                self.settings_adjust(true);
            }
            KeyCode::Enter => {
                self.settings_activate();
            }
            _ => {}
        }
    }

    /// Returns true when the app should quit.
    fn handle_key(&mut self, key: KeyEvent, now: Instant) -> bool {
        if self.editing {
            self.handle_edit_input(key);
            return false;
        }
        if self.settings_open {
            self.handle_settings_input(key);
            return false;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Char('r') | KeyCode::Char(' ') => {
                self.randomize(now);
            }
            KeyCode::Char('c') => {
                self.copy_result();
            }
            KeyCode::Char('i') | KeyCode::Char('e') => {
                self.show_input = true;
                self.editing = true;
            }
            KeyCode::Char('v') => {
                self.show_input = !self.show_input;
            }
            KeyCode::Char('s') => {
                self.settings_open = true;
                self.settings_row = 0;
            }
            _ => {}
        }

        false
    }

    fn draw(&self, frame: &mut ratatui::Frame<'_>) {
        let root = inset_rect(frame.size(), 1, 0);

        let input_height = if self.show_input {
            let lines = self.input.split('\n').count() as u16;
            lines.saturating_add(2).clamp(3, 10)
        } else {
            0
        };

        let chunks = Layout::vertical([
            Constraint::Length(1),
            Constraint::Length(input_height),
            Constraint::Min(1),
            Constraint::Length(1),
        ])
        .split(root);

        self.draw_title(frame, chunks[0]);
        if self.show_input {
            self.draw_input(frame, chunks[1]);
        }
        if self.is_counting() {
            self.draw_countdown(frame, chunks[2]);
        } else {
            self.draw_list(frame, chunks[2]);
        }
        self.draw_status(frame, inset_rect(chunks[3], 1, 0));

        if self.settings_open {
            self.draw_settings(frame, chunks[2]);
        }
    }

    fn draw_title(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let title = Line::from(vec![
            " shufl ".bold(),
            " r ".into(),
            "shuffle".dim(),
            " c ".into(),
            "copy".dim(),
            " i ".into(),
            "edit".dim(),
            " v ".into(),
            "hide input".dim(),
            " s ".into(),
            "settings".dim(),
            " q ".into(),
            "quit".dim(),
        ]);
        frame.render_widget(Paragraph::new(title), area);
    }

    fn draw_input(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let (title, border_style) = if self.editing {
            (
                " list (editing, esc to stop) ",
                Style::default().fg(Color::Yellow),
            )
        } else {
            (" list ", Style::default().fg(Color::DarkGray))
        };

        let display = if self.editing {
            format!("{}\u{258c}", self.input)
        } else {
            self.input.clone()
        };

        let paragraph = Paragraph::new(display).block(
            Block::default()
                .title(title)
                .borders(Borders::TOP)
                .border_style(border_style)
                .padding(Padding::new(1, 1, 0, 0)),
        );
        frame.render_widget(paragraph, area);
    }

    fn draw_countdown(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let Some(value) = self.countdown.current() else {
            return;
        };

        let digits = value.to_string();
        let digit_area = centered_rect(area, (digits.len() as u16).saturating_mul(8).max(8), 8);
        let style = Style::default().fg(HIGHLIGHT_BG);

        match BigTextBuilder::default()
            .lines(vec![Line::from(digits.clone())])
            .style(style)
            .build()
        {
            Ok(big) => frame.render_widget(big, digit_area),
            Err(_) => {
                frame.render_widget(Paragraph::new(Line::from(digits)).style(style), digit_area)
            }
        }
    }

    fn draw_list(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let settling = self.settle_until.is_some();

        // TODO: scroll when the list outgrows the viewport
        let rows: Vec<ListItem> = self.items[..self.revealed.min(self.items.len())]
            .iter()
            .enumerate()
            .map(|(idx, item)| {
                let number = Span::styled(
                    format!("{:>2}. ", idx + 1),
                    Style::default().fg(Color::DarkGray),
                );
                let text = if self.highlights.active().contains(&idx) {
                    Span::styled(
                        item.clone(),
                        Style::default()
                            .bg(HIGHLIGHT_BG)
                            .fg(Color::White)
                            .add_modifier(Modifier::BOLD),
                    )
                } else if settling {
                    Span::styled(item.clone(), Style::default().fg(Color::Yellow))
                } else {
                    Span::raw(item.clone())
                };
                ListItem::new(Line::from(vec![number, text]))
            })
            .collect();

        let list = if rows.is_empty() {
            let hint = if self.items.is_empty() {
                "  press r to shuffle"
            } else {
                ""
            };
            List::new(vec![ListItem::new(Line::raw(hint).dim())])
        } else {
            List::new(rows)
        }
        .block(
            Block::default()
                .title(" result ")
                .borders(Borders::TOP)
                .border_style(Style::default().fg(Color::DarkGray))
                .padding(Padding::new(1, 1, 0, 0)),
        );

        frame.render_widget(list, area);
    }

    fn draw_settings(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let popup = centered_rect(area, 44, SETTINGS_ROWS.len() as u16 + 2);
        frame.render_widget(Clear, popup);

        let rows: Vec<ListItem> = SETTINGS_ROWS
            .iter()
            .enumerate()
            .map(|(idx, row)| {
                let marker = if idx == self.settings_row { "> " } else { "  " };
                let label = match row {
                    SettingsRow::Stagger => {
                        format!("stagger        {:>5.1} s", self.settings.timing.stagger)
                    }
                    SettingsRow::AnimDuration => format!(
                        "anim duration  {:>5.1} s",
                        self.settings.timing.anim_duration
                    ),
                    SettingsRow::Countdown => format!(
                        "countdown      {}",
                        if self.settings.countdown { "on" } else { "off" }
                    ),
                    SettingsRow::Animations => format!(
                        "animations     {}",
                        if self.settings.animations { "on" } else { "off" }
                    ),
                    SettingsRow::Reset => "reset defaults".to_string(),
                };
                let mut line = Line::raw(format!("{marker}{label}"));
                if idx == self.settings_row {
                    line = line.fg(Color::Yellow).bold();
                } else if *row == SettingsRow::Countdown && !self.settings.animations {
                    line = line.dim();
                }
                ListItem::new(line)
            })
            .collect();

        let list = List::new(rows).block(
            Block::default()
                .title(" settings ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray))
                .padding(Padding::new(1, 1, 0, 0)),
        );
        frame.render_widget(list, popup);
    }

    fn draw_status(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let path = self
            .input_path
            .as_ref()
            .map_or_else(|| "<no file>".to_string(), |p| p.display().to_string());

        let count = parse_lines(&self.input).len();
        let flags = format!(
            "anim:{} cd:{}",
            if self.settings.animations { "on" } else { "off" },
            if self.settings.countdown { "on" } else { "off" }
        );
        let watch_hint = if self.cli.watch { " watch:on" } else { "" };

        let status_text = if self.status.is_empty() {
            format!("{path} | {count} items | {flags}{watch_hint}")
        } else {
            format!(
                "{path} | {count} items | {flags}{watch_hint} | {}",
                self.status
            )
        };

        frame.render_widget(
            Paragraph::new(format!(" {status_text}")).style(Style::default().fg(Color::Gray)),
            area,
        );
    }
}

struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> Result<Self> {
        enable_raw_mode()?;
        io::stdout().execute(EnterAlternateScreen)?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

fn run_interactive(mut app: App) -> Result<()> {
    let _guard = TerminalGuard::enter()?;
    app.ensure_watcher()?;

    let stdout = io::stdout();
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    loop {
        terminal.draw(|frame| app.draw(frame))?;

        if app.watch_requested {
            app.reload_current();
            app.watch_requested = false;
        }
        app.poll_watch();

        let timeout = app
            .next_deadline()
            .map(|due| due.saturating_duration_since(Instant::now()))
            .map_or(IDLE_POLL, |wait| wait.min(IDLE_POLL));

        if event::poll(timeout)? {
            match event::read()? {
                CEvent::Key(key) if key.kind == KeyEventKind::Press => {
                    if app.handle_key(key, Instant::now()) {
                        break;
                    }
                }
                _ => {}
            }
        }

        app.tick(Instant::now());
    }

    Ok(())
}

fn init_logging(path: &Path) -> Result<()> {
    let file = fs::File::create(path)
        .with_context(|| format!("Failed to create log file {}", path.display()))?;
    WriteLogger::init(LevelFilter::Info, simplelog::Config::default(), file)
        .context("Failed to initialize logging")?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.plain && cli.watch {
        return Err(anyhow!("--plain and --watch cannot be used together"));
    }

    if let Some(path) = cli.log.as_deref() {
        init_logging(path)?;
    }

    let source = detect_input(&cli);
    if cli.watch && !matches!(source, InputSource::File(_)) {
        return Err(anyhow!("--watch requires file input"));
    }

    let load = read_input(&source)?;

    if cli.plain {
        let items = parse_lines(&load.text);
        let order = shuffled(&items, &mut rand::thread_rng());
        if !order.is_empty() {
            println!("{}", format_numbered(&order));
        }
        return Ok(());
    }

    let app = App::new(cli, load);
    run_interactive(app)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn timing(stagger: f64, overlap: f64) -> Timing {
        Timing {
            stagger,
            anim_duration: 1.0,
            overlap,
        }
    }

    fn items(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn parse_drops_blank_lines_and_trims() {
        assert_eq!(
            parse_lines("Banana\nApple\n\nCherry"),
            items(&["Banana", "Apple", "Cherry"])
        );
        assert_eq!(
            parse_lines("  spaced  \n\ttabbed\t\n"),
            items(&["spaced", "tabbed"])
        );
    }

    #[test]
    fn parse_falls_back_to_csv_for_a_single_line() {
        assert_eq!(parse_lines("A,B,C"), items(&["A", "B", "C"]));
        // commas are not separators once real newlines exist
        assert_eq!(parse_lines("A,B\nC"), items(&["A,B", "C"]));
    }

    #[test]
    fn parse_normalizes_crlf_and_cr() {
        assert_eq!(parse_lines("a\r\nb\rc\nd"), items(&["a", "b", "c", "d"]));
    }

    #[test]
    fn parse_is_idempotent_on_its_own_output() {
        let first = parse_lines("  One \r\nTwo\n\n Three,still three\n");
        let second = parse_lines(&first.join("\n"));
        assert_eq!(first, second);
    }

    #[test]
    fn parse_of_unusable_text_yields_nothing() {
        assert_eq!(parse_lines(""), Vec::<String>::new());
        assert_eq!(parse_lines(" \n\t\n"), Vec::<String>::new());
    }

    #[test]
    fn shuffle_preserves_the_multiset() {
        let original = items(&["a", "b", "c", "d", "e", "f", "g", "b"]);
        let mut rng = StdRng::seed_from_u64(7);
        let result = shuffled(&original, &mut rng);

        assert_eq!(result.len(), original.len());
        let mut sorted_result = result.clone();
        let mut sorted_original = original.clone();
        sorted_result.sort();
        sorted_original.sort();
        assert_eq!(sorted_result, sorted_original);
    }

    #[test]
    fn shuffle_of_tiny_lists_is_identity() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(shuffled(&[], &mut rng), Vec::<String>::new());
        let one = items(&["solo"]);
        assert_eq!(shuffled(&one, &mut rng), one);
    }

    #[test]
    fn numbered_output_is_newline_joined() {
        assert_eq!(format_numbered(&items(&["x", "y"])), "1. x\n2. y");
        assert_eq!(format_numbered(&[]), "");
    }

    #[test]
    fn wave_schedule_matches_stagger_and_overlap() {
        let mut wave = HighlightSequence::new();
        let t0 = Instant::now();
        wave.start(3, timing(1.5, 0.4), t0);

        let expected = [
            (0.0, HighlightStep::Show(0)),
            (1.1, HighlightStep::Hide(0)),
            (1.5, HighlightStep::Show(1)),
            (2.6, HighlightStep::Hide(1)),
            (3.0, HighlightStep::Show(2)),
            (4.1, HighlightStep::Hide(2)),
        ];

        assert!(wave.active().is_empty());
        for (secs, step) in expected {
            let applied = wave.poll(t0 + Duration::from_secs_f64(secs));
            assert_eq!(applied, vec![step]);
        }
        assert!(!wave.in_flight());
        assert!(wave.active().is_empty());
    }

    #[test]
    fn wave_fires_every_show_before_its_hide() {
        let mut wave = HighlightSequence::new();
        let t0 = Instant::now();
        let count = 5;
        wave.start(count, timing(0.3, 0.1), t0);

        let applied = wave.poll(t0 + Duration::from_secs(60));
        let shows = applied
            .iter()
            .filter(|step| matches!(step, HighlightStep::Show(_)))
            .count();
        let hides = applied
            .iter()
            .filter(|step| matches!(step, HighlightStep::Hide(_)))
            .count();
        assert_eq!(shows, count);
        assert_eq!(hides, count);

        for index in 0..count {
            let show_at = applied
                .iter()
                .position(|step| *step == HighlightStep::Show(index))
                .unwrap();
            let hide_at = applied
                .iter()
                .position(|step| *step == HighlightStep::Hide(index))
                .unwrap();
            assert!(show_at < hide_at, "index {index} hidden before shown");
        }
        assert!(wave.active().is_empty());
    }

    #[test]
    fn wave_tracks_the_active_window() {
        let mut wave = HighlightSequence::new();
        let t0 = Instant::now();
        wave.start(3, timing(1.5, 0.4), t0);

        wave.poll(t0);
        assert!(wave.active().contains(&0));
        assert!(!wave.active().contains(&1));

        // 0 hides at 1.1, 1 shows at 1.5
        wave.poll(t0 + Duration::from_secs_f64(1.5));
        assert!(!wave.active().contains(&0));
        assert!(wave.active().contains(&1));
    }

    #[test]
    fn wave_cancel_empties_and_silences() {
        let mut wave = HighlightSequence::new();
        let t0 = Instant::now();
        wave.start(3, timing(1.5, 0.4), t0);
        wave.poll(t0);
        assert!(!wave.active().is_empty());

        wave.cancel();
        assert!(wave.active().is_empty());
        assert!(!wave.in_flight());
        assert!(wave.poll(t0 + Duration::from_secs(60)).is_empty());

        // cancel with nothing live is a no-op
        wave.cancel();
        assert!(wave.active().is_empty());
    }

    #[test]
    fn superseding_start_discards_the_old_session() {
        let mut wave = HighlightSequence::new();
        let t0 = Instant::now();
        wave.start(4, timing(0.5, 0.2), t0);
        wave.poll(t0 + Duration::from_secs_f64(0.5));
        assert!(!wave.active().is_empty());

        let t1 = t0 + Duration::from_secs_f64(0.6);
        wave.start(2, timing(1.0, 0.5), t1);
        assert!(wave.active().is_empty());

        let applied = wave.poll(t1 + Duration::from_secs(60));
        let shows: Vec<usize> = applied
            .iter()
            .filter_map(|step| match step {
                HighlightStep::Show(index) => Some(*index),
                HighlightStep::Hide(_) => None,
            })
            .collect();
        assert_eq!(shows, vec![0, 1]);
        assert!(wave.active().is_empty());
    }

    #[test]
    fn wave_with_no_items_is_done_immediately() {
        let mut wave = HighlightSequence::new();
        let t0 = Instant::now();
        wave.start(0, timing(1.5, 0.4), t0);
        assert!(!wave.in_flight());
        assert!(wave.poll(t0 + Duration::from_secs(60)).is_empty());
        assert!(wave.active().is_empty());
    }

    #[test]
    fn zero_stagger_fires_everything_at_once() {
        let mut wave = HighlightSequence::new();
        let t0 = Instant::now();
        wave.start(3, timing(0.0, 0.4), t0);

        let applied = wave.poll(t0);
        assert_eq!(applied.len(), 6);
        assert!(!wave.in_flight());
        assert!(wave.active().is_empty());
    }

    #[test]
    fn overlap_beyond_stagger_is_clamped() {
        let mut wave = HighlightSequence::new();
        let t0 = Instant::now();
        wave.start(2, timing(0.5, 2.0), t0);

        // hide collapses onto show but never precedes it
        let first = wave.poll(t0);
        assert_eq!(first, vec![HighlightStep::Show(0), HighlightStep::Hide(0)]);
        let second = wave.poll(t0 + Duration::from_secs_f64(0.5));
        assert_eq!(second, vec![HighlightStep::Show(1), HighlightStep::Hide(1)]);
    }

    #[test]
    fn countdown_steps_down_then_completes() {
        let mut countdown = Countdown::new();
        let t0 = Instant::now();
        countdown.start(3, 1.0, t0);

        assert_eq!(countdown.current(), Some(3));
        assert_eq!(
            countdown.poll(t0 + Duration::from_millis(999)),
            CountdownPoll::Quiet
        );
        assert_eq!(countdown.current(), Some(3));

        assert_eq!(
            countdown.poll(t0 + Duration::from_secs(1)),
            CountdownPoll::Ticked
        );
        assert_eq!(countdown.current(), Some(2));

        assert_eq!(
            countdown.poll(t0 + Duration::from_secs(2)),
            CountdownPoll::Ticked
        );
        assert_eq!(countdown.current(), Some(1));

        assert_eq!(
            countdown.poll(t0 + Duration::from_secs(3)),
            CountdownPoll::Completed
        );
        assert_eq!(countdown.current(), None);
        assert!(!countdown.is_counting());
    }

    #[test]
    fn cancelled_countdown_never_completes() {
        let mut countdown = Countdown::new();
        let t0 = Instant::now();
        countdown.start(3, 1.0, t0);
        countdown.poll(t0 + Duration::from_secs(1));

        countdown.cancel();
        assert!(!countdown.is_counting());
        assert_eq!(countdown.current(), None);
        assert_eq!(
            countdown.poll(t0 + Duration::from_secs(60)),
            CountdownPoll::Quiet
        );
    }

    #[test]
    fn restarting_a_countdown_clears_prior_ticks() {
        let mut countdown = Countdown::new();
        let t0 = Instant::now();
        countdown.start(3, 1.0, t0);
        countdown.poll(t0 + Duration::from_secs(1));
        assert_eq!(countdown.current(), Some(2));

        let t1 = t0 + Duration::from_millis(1500);
        countdown.start(3, 1.0, t1);
        assert_eq!(countdown.current(), Some(3));

        // old schedule would have shown 1 here; the new one is still on 3
        assert_eq!(
            countdown.poll(t0 + Duration::from_millis(2400)),
            CountdownPoll::Quiet
        );
        assert_eq!(countdown.current(), Some(3));

        assert_eq!(
            countdown.poll(t1 + Duration::from_secs(1)),
            CountdownPoll::Ticked
        );
        assert_eq!(countdown.current(), Some(2));
    }

    fn test_app(input: &str) -> App {
        let cli = Cli::parse_from(["shufl"]);
        App::new(
            cli,
            LoadResult {
                path: None,
                text: input.to_string(),
            },
        )
    }

    #[test]
    fn randomize_without_animations_reveals_immediately() {
        let mut app = test_app("a\nb\nc");
        app.settings.animations = false;

        app.randomize(Instant::now());
        assert_eq!(app.items.len(), 3);
        assert_eq!(app.revealed, 3);
        assert!(!app.is_counting());
        assert!(!app.highlights.in_flight());
    }

    #[test]
    fn randomize_with_empty_input_is_a_no_op() {
        let mut app = test_app(" \n\n");
        app.randomize(Instant::now());
        assert!(app.items.is_empty());
        assert!(!app.is_counting());
    }

    #[test]
    fn randomize_counts_down_before_revealing() {
        let mut app = test_app("a\nb");
        let t0 = Instant::now();
        app.randomize(t0);

        assert!(app.is_counting());
        assert!(app.items.is_empty());
        assert_eq!(app.pending.len(), 2);

        app.tick(t0 + Duration::from_secs(3));
        assert!(!app.is_counting());
        assert_eq!(app.items.len(), 2);
        assert!(app.highlights.in_flight());
    }

    #[test]
    fn disabling_animations_mid_countdown_reveals_at_once() {
        let mut app = test_app("a\nb\nc");
        let t0 = Instant::now();
        app.randomize(t0);
        assert!(app.is_counting());

        app.set_animations(false);
        assert!(!app.is_counting());
        assert_eq!(app.items.len(), 3);
        assert_eq!(app.revealed, 3);
        assert!(!app.highlights.in_flight());
    }

    #[test]
    fn wave_completion_starts_the_settle_flash() {
        let mut app = test_app("a\nb");
        app.settings.countdown = false;
        let t0 = Instant::now();
        app.randomize(t0);
        assert!(app.highlights.in_flight());

        app.tick(t0 + Duration::from_secs(30));
        assert!(!app.highlights.in_flight());
        assert_eq!(app.revealed, 2);
        assert!(app.settle_until.is_some());

        app.tick(t0 + Duration::from_secs(60));
        assert!(app.settle_until.is_none());
    }

    #[test]
    fn import_rejects_text_without_usable_lines() {
        let mut app = test_app("keep\nme");
        app.apply_import(" \n \n".to_string(), Path::new("junk.txt"));
        assert_eq!(app.input, "keep\nme");

        app.apply_import("new,items".to_string(), Path::new("fresh.csv"));
        assert_eq!(app.input, "new,items");
        assert!(app.show_input);
    }
}
