//! Job progress bars and a log writer that keeps them pinned.

use crate::meta::{Job, JobStatus};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::{self, Write};
use std::sync::OnceLock;
use tracing_subscriber::fmt::MakeWriter;

static MULTI_PROGRESS: OnceLock<MultiProgress> = OnceLock::new();

fn multi_progress() -> &'static MultiProgress {
    MULTI_PROGRESS.get_or_init(|| {
        let mp = MultiProgress::new();
        mp.set_draw_target(ProgressDrawTarget::stderr_with_hz(10));
        mp
    })
}

/// Progress bar mirroring one job's 0-100 progress and message
pub struct JobProgress {
    bar: ProgressBar,
}

impl JobProgress {
    pub fn new(job_id: &str) -> Self {
        let bar = multi_progress().add(ProgressBar::new(100));
        if let Ok(style) =
            ProgressStyle::with_template("{prefix} [{bar:30.cyan/blue}] {pos:>3}% {wide_msg}")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_prefix(short_id(job_id).to_string());
        Self { bar }
    }

    /// Redraw from the job's current state
    pub fn update(&self, job: &Job) {
        self.bar.set_position(job.progress.clamp(0, 100) as u64);
        self.bar.set_message(job.message.clone());
    }

    /// Final redraw; the bar stays visible with the outcome
    pub fn finish(&self, job: &Job) {
        self.update(job);
        let outcome = match job.get_status() {
            Ok(JobStatus::Done) => format!("✓ {}", job.message),
            Ok(JobStatus::Error) => format!("✗ {}", job.message),
            _ => job.message.clone(),
        };
        self.bar.finish_with_message(outcome);
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Complete lines at the front of `buffer`, removed from it.
/// A trailing partial line stays buffered.
fn drain_lines(buffer: &mut String) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(idx) = buffer.find('\n') {
        lines.push(buffer[..idx].trim_end_matches('\r').to_string());
        buffer.drain(..idx + 1);
    }
    lines
}

#[derive(Default, Clone)]
pub struct LogWriterFactory;

/// Routes formatted log lines through the shared progress display
pub struct LogWriter {
    buffer: String,
}

impl LogWriter {
    fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    fn emit(line: String) {
        let _ = multi_progress().println(line);
    }
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.push_str(&String::from_utf8_lossy(buf));
        for line in drain_lines(&mut self.buffer) {
            Self::emit(line);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            Self::emit(rest.trim_end_matches(['\r', '\n']).to_string());
        }
        Ok(())
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

impl<'a> MakeWriter<'a> for LogWriterFactory {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter::new()
    }
}
