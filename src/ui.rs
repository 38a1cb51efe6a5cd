//! Terminal implementations of the progress, commit input and notification surfaces.

use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crossterm::cursor::{MoveToColumn, MoveUp};
use crossterm::queue;
use crossterm::terminal::{self, Clear, ClearType};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use tracing::warn;

use crate::ai::{CommitInput, Notifier, ProgressSink};
use crate::config::write_atomically;

/// Progress shown as a status line on stderr.
///
/// A deferred sink keeps only the latest status and prints it on
/// [`finish`](Self::finish), leaving the terminal to the live commit message.
/// A live sink redraws its line on every update.
pub struct TerminalProgress {
    live: bool,
    interactive: bool,
    state: Mutex<Status>,
}

#[derive(Default)]
struct Status {
    percent: f64,
    message: Option<String>,
}

impl TerminalProgress {
    /// Prints the last status once generation is over.
    pub fn deferred() -> Self {
        Self::new(false)
    }

    /// Redraws the status line on every update.
    pub fn live() -> Self {
        Self::new(true)
    }

    fn new(live: bool) -> Self {
        Self {
            live,
            interactive: io::stderr().is_terminal(),
            state: Mutex::new(Status::default()),
        }
    }

    /// Ends the status line, printing the last status of a deferred sink.
    pub fn finish(&self) {
        if self.live {
            if self.interactive {
                eprintln!();
            }
            return;
        }
        if let Ok(state) = self.state.lock() {
            if let Some(ref message) = state.message {
                eprintln!("{message}");
            }
        }
    }
}

impl ProgressSink for TerminalProgress {
    fn report(&self, message: Option<&str>, increment: Option<f64>) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if let Some(increment) = increment {
            state.percent = (state.percent + increment).clamp(0.0, 100.0);
        }
        let Some(message) = message else {
            return;
        };
        state.message = Some(message.to_string());
        if !self.live {
            return;
        }

        let line = format!("[{:>3.0}%] {}", state.percent, message);
        if self.interactive {
            let mut stderr = io::stderr();
            let _ = queue!(stderr, MoveToColumn(0), Clear(ClearType::CurrentLine));
            let _ = write!(stderr, "{line}");
            let _ = stderr.flush();
        } else {
            eprintln!("{line}");
        }
    }
}

/// Terminal rows taken by `text` once wrapped at `cols` columns.
fn rows(text: &str, cols: u16) -> u16 {
    let cols = usize::from(cols.max(1));
    let rows: usize = text
        .lines()
        .map(|line| line.chars().count().div_ceil(cols).max(1))
        .sum();
    u16::try_from(rows).unwrap_or(u16::MAX)
}

struct Drawn {
    value: String,
    lines: u16,
}

/// Commit message redrawn in place on stderr while it streams in.
pub struct LiveCommitInput {
    drawn: Mutex<Drawn>,
    interactive: bool,
}

impl Default for LiveCommitInput {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveCommitInput {
    /// Draws on stderr when it is a terminal; otherwise only keeps the value.
    pub fn new() -> Self {
        Self {
            drawn: Mutex::new(Drawn {
                value: String::new(),
                lines: 0,
            }),
            interactive: io::stderr().is_terminal(),
        }
    }

    fn erase(stderr: &mut impl Write, lines: u16) -> io::Result<()> {
        if lines > 1 {
            queue!(stderr, MoveUp(lines - 1))?;
        }
        if lines > 0 {
            queue!(stderr, MoveToColumn(0), Clear(ClearType::FromCursorDown))?;
        }
        Ok(())
    }

    fn redraw(&self, drawn: &mut Drawn) -> io::Result<()> {
        let mut stderr = io::stderr();
        Self::erase(&mut stderr, drawn.lines)?;
        write!(stderr, "{}", drawn.value)?;
        stderr.flush()?;
        drawn.lines = rows(&drawn.value, terminal::size().map(|(cols, _)| cols).unwrap_or(80));
        Ok(())
    }

    /// Removes the drawn text.
    pub fn clear(&self) {
        if !self.interactive {
            return;
        }
        if let Ok(mut drawn) = self.drawn.lock() {
            let mut stderr = io::stderr();
            let _ = Self::erase(&mut stderr, drawn.lines).and_then(|()| stderr.flush());
            drawn.lines = 0;
        }
    }
}

impl CommitInput for LiveCommitInput {
    fn set_value(&self, value: &str) {
        let Ok(mut drawn) = self.drawn.lock() else {
            return;
        };
        drawn.value = value.to_string();
        if self.interactive {
            if let Err(e) = self.redraw(&mut drawn) {
                warn!(error = %e, "Failed to redraw commit message");
            }
        }
    }
}

/// Commit message written to a file, replaced atomically on every update.
pub struct FileCommitInput {
    path: PathBuf,
}

impl FileCommitInput {
    /// Writes to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Target file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CommitInput for FileCommitInput {
    fn set_value(&self, value: &str) {
        let mut content = value.to_string();
        content.push('\n');
        if let Err(e) = write_atomically(&self.path, &content) {
            warn!(path = %self.path.display(), error = %format!("{e:#}"), "Failed to write commit message");
        }
    }
}

/// Coloured notifications on stderr.
pub struct ConsoleNotifier {
    choice: ColorChoice,
}

impl Default for ConsoleNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleNotifier {
    /// Colours only when stderr is a terminal.
    pub fn new() -> Self {
        let choice = if io::stderr().is_terminal() {
            ColorChoice::Auto
        } else {
            ColorChoice::Never
        };
        Self { choice }
    }

    fn write(&self, label: &str, color: Color, message: &str) {
        let mut stderr = StandardStream::stderr(self.choice);
        let _ = stderr.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true));
        let _ = write!(stderr, "{label}:");
        let _ = stderr.reset();
        let _ = writeln!(stderr, " {message}");
    }
}

impl Notifier for ConsoleNotifier {
    fn info(&self, message: &str) {
        self.write("info", Color::Cyan, message);
    }

    fn warn(&self, message: &str) {
        self.write("warning", Color::Yellow, message);
    }

    fn error(&self, message: &str) {
        self.write("error", Color::Red, message);
    }
}
