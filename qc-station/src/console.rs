//! Operator console shared by the kiosk and technician front-ends.
//!
//! The console turns parsed command lines into orchestrator calls and renders
//! [`SessionSnapshot`]s as toned text lines. Rendering is pure so both the
//! interactive binary and the transcript capture tool print the same thing.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use qc_core::console::catalog::help_lines;
use qc_core::console::status::{write_result_line, write_verdict_line};
use qc_core::console::{ConsoleCommand, StatusFormatter, parse};
use qc_core::results::DeviceStatus;
use qc_core::sequencer::SessionPhase;
use qc_core::session_log::{LogEntry, LogLevel};
use tokio::time::Instant;

use crate::config::FrontEnd;
use crate::driver::{Orchestrator, SessionSnapshot};

/// Entries shown by `log` without a count.
pub const DEFAULT_LOG_LINES: usize = 20;

/// Colour hint for a rendered line.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Tone {
    #[default]
    Plain,
    Good,
    Warn,
    Bad,
    Dim,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Line {
    pub text: String,
    pub tone: Tone,
}

impl Line {
    #[must_use]
    pub fn new(tone: Tone, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tone,
        }
    }

    #[must_use]
    pub fn plain(text: impl Into<String>) -> Self {
        Self::new(Tone::Plain, text)
    }
}

/// Lines produced for one operator input.
#[derive(Debug, Default)]
pub struct Response {
    pub lines: Vec<Line>,
    /// The operator asked to leave the console.
    pub exit: bool,
}

pub struct Console {
    front_end: FrontEnd,
    transcript: Option<TranscriptLogger>,
    seen: SessionSnapshot,
}

impl Console {
    #[must_use]
    pub fn new(
        front_end: FrontEnd,
        transcript: Option<TranscriptLogger>,
        initial: SessionSnapshot,
    ) -> Self {
        Self {
            front_end,
            transcript,
            seen: initial,
        }
    }

    #[must_use]
    pub fn banner(&self) -> Line {
        let view = match self.front_end {
            FrontEnd::Kiosk => "kiosk",
            FrontEnd::Technician => "technician",
        };
        Line::plain(format!(
            "BLE QC station ({view}) ready. Type `help` for commands or `exit` to quit."
        ))
    }

    /// Parses and executes one operator line.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the transcript cannot be written.
    pub async fn handle_line(
        &mut self,
        orchestrator: &Orchestrator,
        line: &str,
    ) -> io::Result<Response> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Response::default());
        }
        self.record(TranscriptRole::Operator, trimmed)?;

        let (lines, exit) = match parse(trimmed) {
            Ok(ConsoleCommand::Exit) => (vec![Line::plain("Session closed.")], true),
            Ok(command) => (self.execute(orchestrator, command).await, false),
            Err(err) => (
                vec![Line::new(Tone::Bad, format!("ERR syntax {err}"))],
                false,
            ),
        };

        self.record_lines(&lines)?;
        Ok(Response { lines, exit })
    }

    /// Renders what changed since the last observed snapshot.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the transcript cannot be written.
    pub fn observe(&mut self, snapshot: &SessionSnapshot) -> io::Result<Vec<Line>> {
        let lines = updates(self.front_end, &self.seen, snapshot);
        self.seen = snapshot.clone();
        self.record_lines(&lines)?;
        Ok(lines)
    }

    async fn execute(&self, orchestrator: &Orchestrator, command: ConsoleCommand) -> Vec<Line> {
        match command {
            ConsoleCommand::Start => match orchestrator.start().await {
                Ok(()) => vec![Line::plain(
                    "Starting QC session; waiting for the device to advertise",
                )],
                Err(err) => vec![Line::new(Tone::Bad, format!("ERR {err}"))],
            },
            ConsoleCommand::Confirm => match orchestrator.confirm().await {
                Ok(()) => vec![Line::new(Tone::Good, "User action confirmed")],
                Err(err) => vec![Line::new(Tone::Bad, format!("ERR {err}"))],
            },
            ConsoleCommand::Reset => match orchestrator.reset().await {
                Ok(()) => vec![Line::plain("Session reset; ready for the next device")],
                Err(err) => vec![Line::new(Tone::Bad, format!("ERR {err}"))],
            },
            ConsoleCommand::Status => render_status(self.front_end, &orchestrator.snapshot()),
            ConsoleCommand::Results => render_results(self.front_end, &orchestrator.snapshot()),
            ConsoleCommand::Log { count } => render_log(
                self.front_end,
                &orchestrator.snapshot(),
                count.unwrap_or(DEFAULT_LOG_LINES),
            ),
            ConsoleCommand::Save => match orchestrator.save().await {
                Ok(location) => vec![Line::new(Tone::Good, format!("Results saved to {location}"))],
                Err(err) => vec![Line::new(Tone::Bad, format!("ERR save failed: {err}"))],
            },
            ConsoleCommand::Help { topic } => help_lines(topic.as_deref())
                .into_iter()
                .map(Line::plain)
                .collect(),
            ConsoleCommand::Exit => Vec::new(),
        }
    }

    fn record(&mut self, role: TranscriptRole, line: &str) -> io::Result<()> {
        match &mut self.transcript {
            Some(transcript) => transcript.append_line(role, line),
            None => Ok(()),
        }
    }

    fn record_lines(&mut self, lines: &[Line]) -> io::Result<()> {
        for line in lines {
            self.record(TranscriptRole::Station, &line.text)?;
        }
        Ok(())
    }
}

/// Renders the `status` command.
#[must_use]
pub fn render_status(front_end: FrontEnd, snapshot: &SessionSnapshot) -> Vec<Line> {
    let formatter = StatusFormatter::new(snapshot.phase, &snapshot.state, snapshot.total_tests);
    let mut lines = Vec::new();

    match front_end {
        FrontEnd::Kiosk => {
            lines.push(kiosk_headline(snapshot));
            let mut bar = String::new();
            if formatter.write_progress_bar(&mut bar).is_ok() {
                lines.push(Line::plain(bar));
            }
        }
        FrontEnd::Technician => {
            let mut session = String::new();
            let mut command = String::new();
            let mut bar = String::new();
            if formatter.write_session_line(&mut session).is_ok() {
                lines.push(Line::plain(session));
            }
            if formatter.write_command_line(&mut command).is_ok() {
                lines.push(Line::plain(command));
            }
            if let Some(device) = &snapshot.device {
                lines.push(Line::plain(format!(
                    "device name={} address={}",
                    device.display_name(),
                    device.address
                )));
            }
            if let Some(test) = &snapshot.current_test {
                lines.push(Line::plain(format!("test current={test}")));
            }
            if formatter.write_progress_bar(&mut bar).is_ok() {
                lines.push(Line::plain(bar));
            }
            let mut prompt = String::new();
            if formatter.write_prompt_line(&mut prompt).unwrap_or(false) {
                lines.push(Line::new(Tone::Warn, prompt));
            }
        }
    }

    if snapshot.pending_save {
        lines.push(Line::new(
            Tone::Bad,
            "Results not saved; type 'save' to retry",
        ));
    }
    lines
}

/// Renders the `results` command.
#[must_use]
pub fn render_results(front_end: FrontEnd, snapshot: &SessionSnapshot) -> Vec<Line> {
    if snapshot.results.is_empty() {
        return vec![Line::new(Tone::Dim, "No results yet")];
    }

    let mut lines = Vec::new();
    if front_end == FrontEnd::Technician {
        for result in &snapshot.results {
            let mut row = String::new();
            if write_result_line(&mut row, result).is_ok() {
                let tone = if result.passed() { Tone::Good } else { Tone::Bad };
                lines.push(Line::new(tone, row));
            }
            lines.push(Line::new(Tone::Dim, format!("  {}", result.details)));
        }
    }

    if let Some(status) = snapshot.verdict() {
        let mut verdict = String::new();
        if write_verdict_line(&mut verdict, &snapshot.summary).is_ok() {
            lines.push(Line::new(status_tone(status), verdict));
        }
    } else {
        lines.push(Line::plain(format!(
            "{}/{} tests complete",
            snapshot.results.len(),
            snapshot.total_tests
        )));
    }
    lines
}

/// Renders the `log` command; the kiosk does not expose the session log.
#[must_use]
pub fn render_log(front_end: FrontEnd, snapshot: &SessionSnapshot, count: usize) -> Vec<Line> {
    if front_end == FrontEnd::Kiosk {
        return vec![Line::new(
            Tone::Dim,
            "The session log is available on the technician station",
        )];
    }
    if snapshot.log.is_empty() {
        return vec![Line::new(Tone::Dim, "Session log is empty")];
    }

    let skip = snapshot.log.len().saturating_sub(count);
    let mut lines = Vec::with_capacity(count);
    lines.extend(
        snapshot.log[skip..]
            .iter()
            .map(|entry| Line::new(level_tone(entry.level), entry.to_string())),
    );
    lines
}

/// Lines announcing what changed between two snapshots.
#[must_use]
pub fn updates(
    front_end: FrontEnd,
    previous: &SessionSnapshot,
    current: &SessionSnapshot,
) -> Vec<Line> {
    let mut lines = match front_end {
        FrontEnd::Kiosk => kiosk_updates(previous, current),
        FrontEnd::Technician => new_log_entries(previous, current)
            .iter()
            .map(|entry| Line::new(level_tone(entry.level), live_entry(entry)))
            .collect(),
    };

    if front_end == FrontEnd::Technician
        && current.phase == SessionPhase::Completed
        && previous.phase != SessionPhase::Completed
    {
        lines.push(kiosk_headline(current));
    }
    if current.pending_save && !previous.pending_save {
        lines.push(Line::new(
            Tone::Bad,
            "Results not saved; type 'save' to retry",
        ));
    }
    lines
}

fn kiosk_updates(previous: &SessionSnapshot, current: &SessionSnapshot) -> Vec<Line> {
    if previous.phase == current.phase {
        return Vec::new();
    }

    let line = match current.phase {
        SessionPhase::Connecting => Line::plain("Connecting to device..."),
        SessionPhase::Idle if previous.phase == SessionPhase::Connecting => Line::new(
            Tone::Bad,
            "Connection failed - check the device and type 'start' again",
        ),
        SessionPhase::Idle => return Vec::new(),
        SessionPhase::Running { .. }
            if matches!(previous.phase, SessionPhase::AwaitingUserAction { .. }) =>
        {
            Line::plain("Resuming tests")
        }
        SessionPhase::Running { .. } | SessionPhase::AwaitingUserAction { .. } => {
            kiosk_headline(current)
        }
        SessionPhase::Completed => kiosk_headline(current),
    };
    vec![line]
}

fn kiosk_headline(snapshot: &SessionSnapshot) -> Line {
    match snapshot.phase {
        SessionPhase::Idle => Line::plain("Place the device on the fixture and type 'start'"),
        SessionPhase::Connecting => Line::plain("Connecting to device..."),
        SessionPhase::Running { index } => Line::plain(format!(
            "Running test {}/{}: {}",
            index + 1,
            snapshot.total_tests,
            snapshot.current_test.as_deref().unwrap_or("")
        )),
        SessionPhase::AwaitingUserAction { .. } => Line::new(
            Tone::Warn,
            format!(
                "ACTION REQUIRED: {} (type 'confirm' when done)",
                snapshot
                    .state
                    .user_action_message
                    .as_deref()
                    .unwrap_or("see device")
            ),
        ),
        SessionPhase::Completed => {
            let mut verdict = String::new();
            match write_verdict_line(&mut verdict, &snapshot.summary) {
                Ok(()) => Line::new(status_tone(snapshot.summary.device_status), verdict),
                Err(_) => Line::plain("Run complete"),
            }
        }
    }
}

fn new_log_entries<'a>(previous: &SessionSnapshot, current: &'a SessionSnapshot) -> &'a [LogEntry] {
    if previous.session_id != current.session_id || current.log.len() < previous.log.len() {
        &current.log
    } else {
        &current.log[previous.log.len()..]
    }
}

fn live_entry(entry: &LogEntry) -> String {
    match &entry.details {
        Some(details) => format!("{:<7} {} | {details}", entry.level, entry.message),
        None => format!("{:<7} {}", entry.level, entry.message),
    }
}

const fn level_tone(level: LogLevel) -> Tone {
    match level {
        LogLevel::Info => Tone::Plain,
        LogLevel::Success => Tone::Good,
        LogLevel::Warning => Tone::Warn,
        LogLevel::Error => Tone::Bad,
    }
}

const fn status_tone(status: DeviceStatus) -> Tone {
    match status {
        DeviceStatus::Ready => Tone::Good,
        DeviceStatus::Defective => Tone::Bad,
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TranscriptRole {
    Operator,
    Station,
}

impl TranscriptRole {
    const fn prefix(self) -> &'static str {
        match self {
            TranscriptRole::Operator => "HOST>",
            TranscriptRole::Station => "QC  <",
        }
    }
}

/// Appends operator input and station output to a transcript file.
pub struct TranscriptLogger {
    writer: BufWriter<File>,
    started_at: Instant,
}

impl TranscriptLogger {
    /// Creates (or truncates) the transcript at `path` and writes its header.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the file or its parent directory cannot be
    /// created.
    pub fn create(path: &Path, header: &str) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
            started_at: Instant::now(),
        };
        logger.write_header(header)?;
        Ok(logger)
    }

    fn write_header(&mut self, header: &str) -> io::Result<()> {
        writeln!(self.writer, "# {header}")?;
        writeln!(
            self.writer,
            "# Timestamps are milliseconds since session start"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    /// # Errors
    ///
    /// Returns an I/O error when the transcript cannot be written.
    pub fn append_line(&mut self, role: TranscriptRole, line: &str) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            self.started_at.elapsed().as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}
