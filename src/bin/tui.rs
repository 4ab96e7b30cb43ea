//! Real-time dashboard for ThinkGear headsets.
//!
//! Usage:
//!   cargo run --bin tui                       # default serial port
//!   cargo run --bin tui -- /dev/rfcomm0       # explicit port
//!   cargo run --bin tui -- --simulate         # built-in headset simulator
//!
//! Keys
//! ----
//!   +  / =   zoom out  (increase raw scale)
//!   -        zoom in   (decrease raw scale)
//!   a        auto-scale: fit Y axis to current peak amplitude
//!   v        toggle smooth overlay on the raw waveform
//!   p        freeze / unfreeze the display
//!   c        clear the waveform buffer
//!   r        reconnect now
//!   q / Esc  quit

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::{info, warn};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{
        Axis, Bar, BarChart, BarGroup, Block, Borders, Chart, Dataset, Gauge, GraphType,
        Paragraph,
    },
    Frame, Terminal,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use thinkgear_rs::protocol::{EEG_BAND_NAMES, RAW_SAMPLE_RATE};
use thinkgear_rs::simulator::SimulatedSource;
use thinkgear_rs::stats::StatsSnapshot;
use thinkgear_rs::thinkgear_client::{ThinkGearClient, ThinkGearClientConfig, ThinkGearHandle};
use thinkgear_rs::types::{Signal, ThinkGearEvent};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Width of the scrolling waveform window in seconds.
const WINDOW_SECS: f64 = 2.0;

/// Raw samples retained: enough to fill exactly `WINDOW_SECS`.
const BUF_SIZE: usize = (WINDOW_SECS * RAW_SAMPLE_RATE) as usize;

/// Discrete Y-axis scale steps in raw ADC units (half the symmetric range).
const Y_SCALES: &[f64] = &[128.0, 256.0, 512.0, 1024.0, 2048.0, 4096.0, 32768.0];

const DEFAULT_SCALE: usize = 3;

/// Moving-average window in samples. 15 samples ≈ 30 ms at 512 Hz.
const SMOOTH_WINDOW: usize = 15;

/// Poor-signal value the headset reports with no skin contact.
const NO_CONTACT: u8 = 200;

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Seconds before reconnecting after the link drops.
const RECONNECT_DELAY_SECS: u64 = 2;

/// Short bar labels, in [`EEG_BAND_NAMES`] order.
const BAND_LABELS: [&str; 8] = ["δ", "θ", "αL", "αH", "βL", "βH", "γL", "γM"];

const BAND_COLORS: [Color; 8] = [
    Color::Blue,
    Color::Cyan,
    Color::Green,
    Color::LightGreen,
    Color::Yellow,
    Color::LightYellow,
    Color::Magenta,
    Color::LightMagenta,
];

// ── App mode ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
enum AppMode {
    Connecting(String),
    Connected(String),
    /// `--simulate` flag: reading from the built-in simulator.
    Simulated,
    /// Link lost or port could not be opened.  Will retry automatically.
    Disconnected,
}

// ── App state (shared with the event task via Arc<Mutex<_>>) ─────────────────

struct App {
    raw: VecDeque<f64>,
    signal: Option<Signal>,
    mode: AppMode,
    last_error: Option<String>,
    stats: StatsSnapshot,

    // ── Rate tracking
    total_samples: u64,
    batch_times: VecDeque<(Instant, usize)>,
    last_blink: Option<(Instant, u8)>,

    // ── UI controls
    scale_idx: usize,
    paused: bool,
    smooth: bool,
}

impl App {
    fn new() -> Self {
        Self {
            raw: VecDeque::with_capacity(BUF_SIZE + 16),
            signal: None,
            mode: AppMode::Connecting(String::new()),
            last_error: None,
            stats: StatsSnapshot::default(),
            total_samples: 0,
            batch_times: VecDeque::with_capacity(8),
            last_blink: None,
            scale_idx: DEFAULT_SCALE,
            paused: false,
            smooth: false,
        }
    }

    /// Append a raw batch to the rolling waveform buffer.
    fn push_raw(&mut self, samples: &[i16]) {
        let now = Instant::now();
        self.total_samples += samples.len() as u64;
        self.batch_times.push_back((now, samples.len()));
        while self
            .batch_times
            .front()
            .is_some_and(|(t, _)| now.duration_since(*t) > Duration::from_secs(3))
        {
            self.batch_times.pop_front();
        }
        if self.paused {
            return;
        }
        for &v in samples {
            self.raw.push_back(v as f64);
            while self.raw.len() > BUF_SIZE {
                self.raw.pop_front();
            }
        }
    }

    fn push_signal(&mut self, signal: Signal) {
        if signal.blink > 0 {
            self.last_blink = Some((Instant::now(), signal.blink));
        }
        if !self.paused {
            self.signal = Some(signal);
        }
    }

    fn clear(&mut self) {
        self.raw.clear();
        self.signal = None;
        self.total_samples = 0;
        self.batch_times.clear();
        self.last_blink = None;
    }

    /// Raw samples per second over the last few batches.
    fn sample_rate(&self) -> f64 {
        let (Some(first), Some(last)) = (self.batch_times.front(), self.batch_times.back()) else {
            return 0.0;
        };
        let span = last.0.duration_since(first.0).as_secs_f64();
        if span < 1e-3 {
            return 0.0;
        }
        let samples: usize = self.batch_times.iter().skip(1).map(|(_, n)| n).sum();
        samples as f64 / span
    }

    fn y_range(&self) -> f64 {
        Y_SCALES[self.scale_idx]
    }

    fn scale_up(&mut self) {
        if self.scale_idx + 1 < Y_SCALES.len() {
            self.scale_idx += 1;
        }
    }

    fn scale_down(&mut self) {
        self.scale_idx = self.scale_idx.saturating_sub(1);
    }

    /// Smallest scale step that fits the current peak with 10 % headroom.
    fn auto_scale(&mut self) {
        let peak = self.raw.iter().fold(0.0_f64, |acc, &v| acc.max(v.abs()));
        let needed = peak * 1.1;
        self.scale_idx = Y_SCALES
            .iter()
            .position(|&s| s >= needed)
            .unwrap_or(Y_SCALES.len() - 1);
    }
}

fn lock(app: &Mutex<App>) -> MutexGuard<'_, App> {
    app.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Symmetric moving-average (boxcar) smoother that preserves length.
fn smooth_signal(data: &[(f64, f64)], window: usize) -> Vec<(f64, f64)> {
    if data.len() < 3 || window < 2 {
        return data.to_vec();
    }
    let half = window / 2;
    data.iter()
        .enumerate()
        .map(|(i, &(x, _))| {
            let start = i.saturating_sub(half);
            let end = (i + half + 1).min(data.len());
            let sum: f64 = data[start..end].iter().map(|&(_, y)| y).sum();
            (x, sum / (end - start) as f64)
        })
        .collect()
}

// ── Session ───────────────────────────────────────────────────────────────────

/// A live connection plus the task draining its event channel.
struct Session {
    handle: ThinkGearHandle,
    events: JoinHandle<()>,
}

impl Session {
    /// Drop the event receiver first so the worker cannot block on a full
    /// channel, then join it.
    async fn end(mut self) {
        self.events.abort();
        let _ = self.events.await;
        if let Err(e) = tokio::task::block_in_place(|| self.handle.stop()) {
            info!("{} ended: {e}", self.handle.source_name());
        }
        self.handle.close();
    }
}

fn open_session(
    config: &ThinkGearClientConfig,
    simulate: bool,
    app: &Arc<Mutex<App>>,
) -> Option<Session> {
    let client = ThinkGearClient::new(config.clone());
    {
        let mut s = lock(app);
        s.clear();
        s.mode = if simulate {
            AppMode::Simulated
        } else {
            AppMode::Connecting(config.port_name.clone())
        };
    }

    let connected = if simulate {
        client.connect_source(SimulatedSource::new())
    } else {
        client.connect()
    };
    match connected {
        Ok((rx, handle)) => {
            let events = spawn_event_task(rx, Arc::clone(app), simulate);
            Some(Session { handle, events })
        }
        Err(e) => {
            warn!("connect failed: {e}");
            let mut s = lock(app);
            s.mode = AppMode::Disconnected;
            s.last_error = Some(e.to_string());
            None
        }
    }
}

/// Forward reader events into `app` until the stream ends.
fn spawn_event_task(
    mut rx: mpsc::Receiver<ThinkGearEvent>,
    app: Arc<Mutex<App>>,
    simulate: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(ev) = rx.recv().await {
            let mut s = lock(&app);
            match ev {
                ThinkGearEvent::Connected(name) => {
                    if !simulate {
                        s.mode = AppMode::Connected(name);
                    }
                    s.last_error = None;
                }
                ThinkGearEvent::Signal(signal) => s.push_signal(signal),
                ThinkGearEvent::RawBatch(batch) => s.push_raw(&batch.samples),
                ThinkGearEvent::Fault(msg) => s.last_error = Some(msg),
                ThinkGearEvent::Disconnected => {
                    s.mode = AppMode::Disconnected;
                    break;
                }
            }
        }
    })
}

// ── Rendering ─────────────────────────────────────────────────────────────────

fn draw(frame: &mut Frame, app: &App) {
    let [header, meters, wave, footer] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(12),
        Constraint::Min(8),
        Constraint::Length(3),
    ])
    .areas(frame.area());

    let [gauges, bands] =
        Layout::horizontal([Constraint::Percentage(40), Constraint::Percentage(60)]).areas(meters);

    draw_header(frame, header, app);
    draw_gauges(frame, gauges, app);
    draw_bands(frame, bands, app);
    draw_waveform(frame, wave, app);
    draw_footer(frame, footer, app);
}

// ── Header ────────────────────────────────────────────────────────────────────

fn spinner_str() -> &'static str {
    let ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    SPINNER[(ms / 100) as usize % SPINNER.len()]
}

fn draw_header(frame: &mut Frame, area: Rect, app: &App) {
    let (label, color) = match &app.mode {
        AppMode::Connecting(port) => (format!("{} Opening {port}…", spinner_str()), Color::Yellow),
        AppMode::Connected(name) => (format!("● {name}"), Color::Green),
        AppMode::Simulated => ("◆ Simulated".to_owned(), Color::Cyan),
        AppMode::Disconnected => {
            let reason = app
                .last_error
                .as_deref()
                .map(|e| format!(" ({e})"))
                .unwrap_or_default();
            (
                format!("{} Disconnected{reason} — retrying…", spinner_str()),
                Color::Red,
            )
        }
    };

    let rate = format!("{:.0} smp/s", app.sample_rate());
    let scale = format!("±{:.0}", app.y_range());
    let dropped = format!("{} dropped", app.stats.dropped_frames());
    let total = format!("{}K smp", app.total_samples / 1_000);

    let line = Line::from(vec![
        Span::styled(
            " ThinkGear EEG Monitor ",
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
        sep(),
        Span::styled(label, Style::default().fg(color).add_modifier(Modifier::BOLD)),
        sep(),
        Span::styled(rate, Style::default().fg(Color::White)),
        sep(),
        Span::styled(
            scale,
            Style::default()
                .fg(Color::LightBlue)
                .add_modifier(Modifier::BOLD),
        ),
        sep(),
        Span::styled(
            dropped,
            Style::default().fg(if app.stats.dropped_frames() > 0 {
                Color::Yellow
            } else {
                Color::DarkGray
            }),
        ),
        sep(),
        Span::styled(total, Style::default().fg(Color::DarkGray)),
        Span::raw(" "),
    ]);

    frame.render_widget(
        Paragraph::new(line).block(Block::default().borders(Borders::ALL)),
        area,
    );
}

#[inline]
fn sep<'a>() -> Span<'a> {
    Span::styled(" │ ", Style::default().fg(Color::DarkGray))
}

// ── eSense gauges ─────────────────────────────────────────────────────────────

fn gauge<'a>(title: &'a str, value: u8, color: Color) -> Gauge<'a> {
    Gauge::default()
        .block(
            Block::default()
                .title(Span::styled(title, Style::default().fg(color).add_modifier(Modifier::BOLD)))
                .borders(Borders::ALL),
        )
        .gauge_style(Style::default().fg(color))
        .percent(u16::from(value.min(100)))
        .label(format!("{value:3}"))
}

fn draw_gauges(frame: &mut Frame, area: Rect, app: &App) {
    let [attention, meditation, contact, blink] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Length(3),
    ])
    .areas(area);

    let signal = app.signal.unwrap_or_default();
    frame.render_widget(gauge(" Attention ", signal.attention, Color::Red), attention);
    frame.render_widget(gauge(" Meditation ", signal.meditation, Color::Cyan), meditation);

    // Poor signal runs from 0 (good) to 200 (no contact); show it as contact quality.
    let quality = if app.signal.is_some() {
        100 - (u32::from(signal.quality.min(NO_CONTACT)) * 100 / u32::from(NO_CONTACT)) as u8
    } else {
        0
    };
    let contact_color = match quality {
        0..=40 => Color::Red,
        41..=80 => Color::Yellow,
        _ => Color::Green,
    };
    frame.render_widget(gauge(" Contact ", quality, contact_color), contact);

    let blink_line = match app.last_blink {
        Some((at, strength)) => {
            let ago = at.elapsed().as_secs_f64();
            let color = if ago < 1.5 { Color::LightMagenta } else { Color::DarkGray };
            Line::from(Span::styled(
                format!(" strength {strength:3}  ({ago:.0} s ago)"),
                Style::default().fg(color),
            ))
        }
        None => Line::from(Span::styled(" none yet", Style::default().fg(Color::DarkGray))),
    };
    frame.render_widget(
        Paragraph::new(blink_line).block(Block::default().title(" Blink ").borders(Borders::ALL)),
        blink,
    );
}

// ── Band powers ───────────────────────────────────────────────────────────────

/// Band powers span several decades, so bars are drawn on a log scale and
/// labelled with the raw value.
fn draw_bands(frame: &mut Frame, area: Rect, app: &App) {
    let powers = app.signal.map(|s| s.power.to_array()).unwrap_or_default();
    let bars: Vec<Bar> = EEG_BAND_NAMES
        .iter()
        .zip(powers)
        .enumerate()
        .map(|(i, (_, p))| {
            Bar::default()
                .value(((p as f64 + 1.0).log10() * 100.0) as u64)
                .label(Line::from(BAND_LABELS[i]))
                .text_value(compact(p))
                .style(Style::default().fg(BAND_COLORS[i]))
        })
        .collect();

    let inner_w = area.width.saturating_sub(2);
    let bar_width = (inner_w / 8).saturating_sub(1).max(3);

    let chart = BarChart::default()
        .block(
            Block::default()
                .title(Span::styled(
                    " Band power (log) ",
                    Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
                ))
                .borders(Borders::ALL),
        )
        .bar_width(bar_width)
        .bar_gap(1)
        .max(800)
        .data(BarGroup::default().bars(&bars));
    frame.render_widget(chart, area);
}

/// `1234567` → `"1.2M"`.
fn compact(v: u32) -> String {
    match v {
        0..=9_999 => v.to_string(),
        10_000..=999_999 => format!("{:.0}k", v as f64 / 1e3),
        _ => format!("{:.1}M", v as f64 / 1e6),
    }
}

// ── Raw waveform ──────────────────────────────────────────────────────────────

fn draw_waveform(frame: &mut Frame, area: Rect, app: &App) {
    let y_range = app.y_range();
    // Clamp to the visible window; ratatui drops out-of-range points.
    let data: Vec<(f64, f64)> = app
        .raw
        .iter()
        .enumerate()
        .map(|(i, &v)| (i as f64 / RAW_SAMPLE_RATE, v.clamp(-y_range, y_range)))
        .collect();

    let (min_v, max_v, rms_v) = if app.raw.is_empty() {
        (0.0, 0.0, 0.0)
    } else {
        let min = app.raw.iter().copied().fold(f64::INFINITY, f64::min);
        let max = app.raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let rms = (app.raw.iter().map(|&v| v * v).sum::<f64>() / app.raw.len() as f64).sqrt();
        (min, max, rms)
    };
    let clipping = max_v > y_range || min_v < -y_range;
    let color = Color::Green;
    let border_color = if clipping { Color::Red } else { color };

    let clip_tag = if clipping { " [CLIP +]" } else { "" };
    let smooth_tag = if app.smooth { " [SMOOTH]" } else { "" };
    let pause_tag = if app.paused { " [FROZEN]" } else { "" };
    let title = format!(
        " Raw  min:{min_v:+6.0}  max:{max_v:+6.0}  rms:{rms_v:6.1}{clip_tag}{smooth_tag}{pause_tag} "
    );

    let smoothed = if app.smooth {
        smooth_signal(&data, SMOOTH_WINDOW)
    } else {
        vec![]
    };
    let datasets: Vec<Dataset> = if app.smooth {
        vec![
            Dataset::default()
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(Color::Rgb(0, 110, 0)))
                .data(&data),
            Dataset::default()
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(color))
                .data(&smoothed),
        ]
    } else {
        vec![Dataset::default()
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(color))
            .data(&data)]
    };

    let y_labels: Vec<String> = [-1.0, -0.5, 0.0, 0.5, 1.0]
        .iter()
        .map(|&f| format!("{:+.0}", f * y_range))
        .collect();
    let x_labels = vec![
        "0s".to_string(),
        format!("{:.1}s", WINDOW_SECS / 2.0),
        format!("{:.0}s", WINDOW_SECS),
    ];

    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .title(Span::styled(
                    title,
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                ))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border_color)),
        )
        .x_axis(
            Axis::default()
                .bounds([0.0, WINDOW_SECS])
                .labels(x_labels)
                .style(Style::default().fg(Color::DarkGray)),
        )
        .y_axis(
            Axis::default()
                .bounds([-y_range, y_range])
                .labels(y_labels)
                .style(Style::default().fg(Color::DarkGray)),
        );
    frame.render_widget(chart, area);
}

// ── Footer ────────────────────────────────────────────────────────────────────

fn draw_footer(frame: &mut Frame, area: Rect, app: &App) {
    let pause_span = if app.paused {
        Span::styled(
            "  ⏸ FROZEN",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )
    } else {
        Span::raw("")
    };

    let keys = Line::from(vec![
        Span::raw(" "),
        key("[+]"),
        Span::raw("Scale↑  "),
        key("[-]"),
        Span::raw("Scale↓  "),
        key("[a]"),
        Span::raw("Auto-scale  "),
        key("[v]"),
        Span::raw(if app.smooth { "Raw  " } else { "Smooth  " }),
        key("[p]"),
        Span::raw(if app.paused { "Unfreeze  " } else { "Freeze  " }),
        key("[c]"),
        Span::raw("Clear  "),
        key("[r]"),
        Span::raw("Reconnect  "),
        key("[q]"),
        Span::raw("Quit"),
        pause_span,
    ]);

    frame.render_widget(
        Paragraph::new(keys).block(Block::default().borders(Borders::ALL)),
        area,
    );
}

#[inline]
fn key(s: &str) -> Span<'_> {
    Span::styled(
        s,
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    )
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    use std::io::IsTerminal as _;
    if !io::stdout().is_terminal() {
        eprintln!("Error: thinkgear tui requires a real terminal (TTY).");
        eprintln!("Run it directly in a terminal emulator, not piped or redirected.");
        std::process::exit(1);
    }

    // ── Logging ─────────────────────────────────────────────────────────────
    // Logs go to thinkgear-tui.log so they never interfere with the display.
    //   RUST_LOG=thinkgear_rs=debug cargo run --bin tui -- --simulate
    {
        use std::fs::File;
        if let Ok(file) = File::create("thinkgear-tui.log") {
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
                .target(env_logger::Target::Pipe(Box::new(file)))
                .init();
        }
    }

    let simulate = std::env::args().any(|a| a == "--simulate");
    let mut config = ThinkGearClientConfig::default();
    if let Some(port) = std::env::args().skip(1).find(|a| !a.starts_with('-')) {
        config.port_name = port;
    }

    // ── Shared UI state ───────────────────────────────────────────────────────
    let app = Arc::new(Mutex::new(App::new()));
    let mut session = open_session(&config, simulate, &app);
    let mut retry_at = session
        .is_none()
        .then(|| Instant::now() + Duration::from_secs(RECONNECT_DELAY_SECS));

    // ── Terminal setup ────────────────────────────────────────────────────────
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
    let tick = Duration::from_millis(33); // ~30 FPS

    // ── Main loop ─────────────────────────────────────────────────────────────
    'main: loop {
        // ── 1. Detect a dropped link ──────────────────────────────────────────
        let disconnected = matches!(lock(&app).mode, AppMode::Disconnected);
        if disconnected {
            if let Some(s) = session.take() {
                s.end().await;
                retry_at = Some(Instant::now() + Duration::from_secs(RECONNECT_DELAY_SECS));
            }
        }

        // ── 2. Fire pending reconnect ─────────────────────────────────────────
        if retry_at.is_some_and(|t| Instant::now() >= t) {
            retry_at = None;
            session = open_session(&config, simulate, &app);
            if session.is_none() {
                retry_at = Some(Instant::now() + Duration::from_secs(RECONNECT_DELAY_SECS));
            }
        }

        // ── 3. Render ─────────────────────────────────────────────────────────
        {
            let mut s = lock(&app);
            if let Some(sess) = &session {
                s.stats = sess.handle.stats();
            }
            terminal.draw(|f| draw(f, &s))?;
        }

        // ── 4. Handle keyboard ────────────────────────────────────────────────
        if !event::poll(tick)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };

        // In raw mode Ctrl+C arrives as a key event, not SIGINT.
        let ctrl_c = key.modifiers.contains(KeyModifiers::CONTROL)
            && key.code == KeyCode::Char('c');
        if ctrl_c {
            break 'main;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => break 'main,
            KeyCode::Char('+') | KeyCode::Char('=') => lock(&app).scale_up(),
            KeyCode::Char('-') => lock(&app).scale_down(),
            KeyCode::Char('a') => lock(&app).auto_scale(),
            KeyCode::Char('v') => {
                let mut s = lock(&app);
                s.smooth = !s.smooth;
            }
            KeyCode::Char('p') => {
                let mut s = lock(&app);
                s.paused = !s.paused;
            }
            KeyCode::Char('c') => lock(&app).clear(),
            KeyCode::Char('r') => {
                if let Some(s) = session.take() {
                    s.end().await;
                }
                retry_at = None;
                session = open_session(&config, simulate, &app);
                if session.is_none() {
                    retry_at = Some(Instant::now() + Duration::from_secs(RECONNECT_DELAY_SECS));
                }
            }
            _ => {}
        }
    }

    // ── Teardown ──────────────────────────────────────────────────────────────
    if let Some(s) = session {
        s.end().await;
    }
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}
