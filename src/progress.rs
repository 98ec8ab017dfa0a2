use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{BTreeMap, VecDeque};
use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const TICK: Duration = Duration::from_millis(250);
const KEPT_WARNINGS: usize = 32;
const SHOWN_ACTIVE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lower")]
pub enum ProgressMode {
    Auto,
    Rich,
    Plain,
    Quiet,
}

#[derive(Debug, Clone, Copy)]
pub struct ProgressConfig {
    pub mode: ProgressMode,
    /// A pass that finishes no file for this long gets a warning. A hung
    /// external command holds its slot indefinitely.
    pub idle_after: Duration,
    /// Cadence of status lines in plain mode.
    pub plain_every: Duration,
    stderr_tty: Option<bool>,
}

impl ProgressConfig {
    pub fn new(mode: ProgressMode) -> Self {
        Self {
            mode,
            idle_after: Duration::from_secs(120),
            plain_every: Duration::from_secs(2),
            stderr_tty: None,
        }
    }

    #[cfg(test)]
    fn assume_tty(mut self, tty: bool) -> Self {
        self.stderr_tty = Some(tty);
        self
    }

    fn display_kind(&self) -> DisplayKind {
        let tty = || {
            self.stderr_tty
                .unwrap_or_else(|| std::io::stderr().is_terminal())
        };
        match self.mode {
            ProgressMode::Auto if tty() => DisplayKind::Bar,
            ProgressMode::Auto | ProgressMode::Plain => DisplayKind::Lines,
            ProgressMode::Rich => DisplayKind::Bar,
            ProgressMode::Quiet => DisplayKind::Silent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DisplayKind {
    Bar,
    Lines,
    Silent,
}

enum Display {
    Bar(ProgressBar),
    Lines,
    Silent,
}

#[derive(Debug, Clone)]
pub struct ProgressOutcome {
    pub total_units: u64,
    pub finished_units: u64,
    pub warnings: Vec<String>,
}

/// Live view of one pass, counted in files.
pub struct ProgressReporter {
    handle: ProgressHandle,
    ticker: Option<JoinHandle<()>>,
}

/// Cheap clone handed to workers.
#[derive(Clone)]
pub struct ProgressHandle {
    shared: Arc<Shared>,
}

struct Shared {
    label: String,
    display: Display,
    idle_after: Duration,
    plain_every: Duration,
    counters: Mutex<Counters>,
    stop: AtomicBool,
    closed: AtomicBool,
}

struct Counters {
    started: Instant,
    stage: String,
    total: u64,
    finished: u64,
    last_finish: Instant,
    last_line: Option<Instant>,
    last_idle_warn: Option<Instant>,
    /// Worker id -> file it is on.
    active: BTreeMap<String, String>,
    warnings: VecDeque<String>,
}

impl ProgressReporter {
    pub fn new(label: impl Into<String>, total_units: u64, config: ProgressConfig) -> Self {
        let label = label.into();
        let kind = config.display_kind();
        let display = match kind {
            DisplayKind::Bar => Display::Bar(file_bar(&label, total_units)),
            DisplayKind::Lines => Display::Lines,
            DisplayKind::Silent => Display::Silent,
        };

        let now = Instant::now();
        let shared = Arc::new(Shared {
            label,
            display,
            idle_after: config.idle_after,
            plain_every: config.plain_every,
            counters: Mutex::new(Counters {
                started: now,
                stage: "starting".to_string(),
                total: total_units,
                finished: 0,
                last_finish: now,
                last_line: None,
                last_idle_warn: None,
                active: BTreeMap::new(),
                warnings: VecDeque::new(),
            }),
            stop: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });

        let ticker = (kind != DisplayKind::Silent).then(|| {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                while !shared.stop.load(Ordering::Relaxed) {
                    thread::sleep(TICK);
                    shared.tick();
                }
            })
        });

        Self {
            handle: ProgressHandle { shared },
            ticker,
        }
    }

    pub fn handle(&self) -> ProgressHandle {
        self.handle.clone()
    }

    pub fn finish(mut self, final_message: impl Into<String>) -> ProgressOutcome {
        self.stop_ticker();
        self.handle.shared.close(Some(&final_message.into()))
    }

    fn stop_ticker(&mut self) {
        self.handle.shared.stop.store(true, Ordering::Relaxed);
        if let Some(ticker) = self.ticker.take() {
            let _ = ticker.join();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.stop_ticker();
        self.handle.shared.close(None);
    }
}

impl ProgressHandle {
    pub fn set_stage(&self, stage: impl Into<String>) {
        let stage = stage.into();
        self.shared.update(true, |c| c.stage = stage);
    }

    /// Counts finished files; never goes past the pass total.
    pub fn inc_units(&self, delta: u64) {
        self.shared.update(false, |c| {
            c.finished = c.finished.saturating_add(delta).min(c.total);
            c.last_finish = Instant::now();
        });
    }

    pub fn set_operation_status(&self, operation_id: impl Into<String>, status: impl Into<String>) {
        let (id, status) = (operation_id.into(), status.into());
        self.shared.update(false, |c| {
            c.active.insert(id, status);
        });
    }

    pub fn clear_operation(&self, operation_id: &str) {
        self.shared.update(false, |c| {
            c.active.remove(operation_id);
        });
    }

    pub fn warning(&self, message: impl Into<String>) {
        let message = message.into();
        self.shared.counters().remember_warning(&message);
        self.shared.announce(&message);
    }
}

impl Shared {
    fn counters(&self) -> MutexGuard<'_, Counters> {
        // Poisoned only if a worker panicked mid-update; counts stay usable.
        self.counters.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn update(&self, force_line: bool, f: impl FnOnce(&mut Counters)) {
        let mut c = self.counters();
        f(&mut *c);
        self.refresh(&mut *c, force_line);
    }

    fn refresh(&self, c: &mut Counters, force_line: bool) {
        match &self.display {
            Display::Bar(bar) => {
                bar.set_position(c.finished);
                bar.set_message(c.summary());
            }
            Display::Lines => {
                let due = c
                    .last_line
                    .map_or(true, |at| at.elapsed() >= self.plain_every);
                if force_line || due {
                    c.last_line = Some(Instant::now());
                    eprintln!("[{}] {}", self.label, c.status_line());
                }
            }
            Display::Silent => {}
        }
    }

    fn announce(&self, message: &str) {
        let line = format!("[{}] warning: {}", self.label, message);
        match &self.display {
            Display::Bar(bar) => bar.println(line),
            Display::Lines => eprintln!("{}", line),
            Display::Silent => {}
        }
    }

    fn tick(&self) {
        let idle = {
            let mut c = self.counters();
            let now = Instant::now();
            let since_finish = now.duration_since(c.last_finish);
            let due = idle_warning_due(
                since_finish,
                c.last_idle_warn.map(|at| now.duration_since(at)),
                self.idle_after,
                c.finished < c.total,
            );
            let idle = due.then(|| {
                format!(
                    "no unit finished for {}s; running: {}",
                    since_finish.as_secs(),
                    c.active_list()
                )
            });
            if let Some(msg) = &idle {
                c.last_idle_warn = Some(now);
                c.remember_warning(msg);
            }
            self.refresh(&mut *c, false);
            idle
        };
        if let Some(msg) = idle {
            self.announce(&msg);
        }
    }

    fn close(&self, final_message: Option<&str>) -> ProgressOutcome {
        let c = self.counters();
        if !self.closed.swap(true, Ordering::Relaxed) {
            let elapsed = format_duration(c.started.elapsed());
            match (&self.display, final_message) {
                (Display::Bar(bar), Some(msg)) => {
                    bar.finish_with_message(format!("{} in {}", msg, elapsed))
                }
                (Display::Bar(bar), None) => bar.finish_and_clear(),
                (Display::Lines, Some(msg)) => eprintln!(
                    "[{}] {}: {}/{} files in {}",
                    self.label, msg, c.finished, c.total, elapsed
                ),
                _ => {}
            }
        }
        ProgressOutcome {
            total_units: c.total,
            finished_units: c.finished,
            warnings: c.warnings.iter().cloned().collect(),
        }
    }
}

impl Counters {
    fn rate(&self) -> f64 {
        let secs = self.started.elapsed().as_secs_f64().max(1e-6);
        self.finished as f64 / secs
    }

    fn active_list(&self) -> String {
        if self.active.is_empty() {
            return "-".to_string();
        }
        self.active
            .values()
            .take(SHOWN_ACTIVE)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn summary(&self) -> String {
        let rate = self.rate();
        format!(
            "{} | {} | eta {} | {}",
            self.stage,
            format_rate(rate),
            format_eta(remaining_time(self.total, self.finished, rate)),
            self.active_list()
        )
    }

    fn status_line(&self) -> String {
        let pct = match self.total {
            0 => 100.0,
            total => self.finished as f64 * 100.0 / total as f64,
        };
        format!(
            "{}/{} files ({:.0}%) after {} | {}",
            self.finished,
            self.total,
            pct,
            format_duration(self.started.elapsed()),
            self.summary()
        )
    }

    fn remember_warning(&mut self, message: &str) {
        if self.warnings.len() == KEPT_WARNINGS {
            self.warnings.pop_front();
        }
        self.warnings.push_back(message.to_string());
    }
}

fn file_bar(label: &str, total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    let style = ProgressStyle::with_template(
        "{prefix:.bold} [{elapsed_precise}] {bar:30.cyan/blue} {pos}/{len} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style.progress_chars("=> "));
    bar.set_prefix(label.to_string());
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    match (secs / 3600, secs % 3600 / 60, secs % 60) {
        (0, m, s) => format!("{:02}:{:02}", m, s),
        (h, m, s) => format!("{:02}:{:02}:{:02}", h, m, s),
    }
}

fn format_rate(files_per_sec: f64) -> String {
    if files_per_sec < 0.01 {
        "- files/s".to_string()
    } else {
        format!("{:.2} files/s", files_per_sec)
    }
}

fn format_eta(eta: Option<Duration>) -> String {
    eta.map_or_else(|| "--:--".to_string(), format_duration)
}

fn remaining_time(total: u64, finished: u64, files_per_sec: f64) -> Option<Duration> {
    if finished >= total || files_per_sec < 0.01 {
        return None;
    }
    Some(Duration::from_secs_f64((total - finished) as f64 / files_per_sec))
}

fn idle_warning_due(
    since_finish: Duration,
    since_last_warning: Option<Duration>,
    threshold: Duration,
    pending: bool,
) -> bool {
    pending
        && since_finish >= threshold
        && since_last_warning.map_or(true, |d| d >= threshold)
}
