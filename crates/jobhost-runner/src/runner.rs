use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use chrono::Utc;
use jobhost_packages::{args::split_arguments, PackageRunStaging, PackageStore};
use jobhost_protocol::{decode, ConsoleMessage, EmailRequest};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    error::{Result, RunnerError},
    events::{JobConsoleLogEvent, LiveEventBus},
    mail::{MailMessage, MailTransport},
    sink::{RunOutputSink, SinkError},
};

/// Prefix put in front of every physical line a child writes to stderr.
pub const STDERR_MARKER: &str = "[stderr] ";

/// Stages packages and runs their entry file as a child process.
///
/// Cheap to share behind an `Arc`; every call to [`run`](Self::run) owns
/// exactly one child and one staging directory.
pub struct PackageRunner {
    packages: Arc<PackageStore>,
    output: Arc<dyn RunOutputSink>,
    mail: Arc<dyn MailTransport>,
    events: Arc<dyn LiveEventBus>,
    temp_root: PathBuf,
    mail_from: String,
}

impl PackageRunner {
    pub fn new(
        packages: Arc<PackageStore>,
        output: Arc<dyn RunOutputSink>,
        mail: Arc<dyn MailTransport>,
        events: Arc<dyn LiveEventBus>,
        temp_root: impl Into<PathBuf>,
        mail_from: impl Into<String>,
    ) -> Self {
        Self {
            packages,
            output,
            mail,
            events,
            temp_root: temp_root.into(),
            mail_from: mail_from.into(),
        }
    }

    /// Run `package_name` for the job run `job_run_id` and wait for it to exit.
    ///
    /// # Errors
    ///
    /// - `PackageNotFound`: unknown package; nothing was staged or spawned.
    /// - `Staging` / `ProcessLaunch`: the package could not be extracted or started.
    /// - `ExecutionFailed`: the child exited with a non-zero code.
    /// - `Cancelled`: `cancel` fired and the child was killed.
    /// - `Output`: the child succeeded but its output could not be recorded.
    #[instrument(skip_all, fields(job_run_id = %job_run_id, package = %package_name))]
    pub async fn run(
        &self,
        job_run_id: &str,
        package_name: &str,
        caller_arguments: &str,
        cancel: CancellationToken,
    ) -> Result<()> {
        let package = self
            .packages
            .get_by_name(package_name)?
            .ok_or_else(|| RunnerError::PackageNotFound {
                name: package_name.to_string(),
            })?;

        let mut staging = PackageRunStaging::prepare(&package, &self.temp_root, caller_arguments)?;
        let result = self.run_staged(job_run_id, &staging, cancel).await;
        // Also covered by Drop when this future is dropped mid-run.
        staging.dispose();

        match &result {
            Ok(()) => info!("package run succeeded"),
            Err(e) => warn!(error = %e, "package run failed"),
        }
        result
    }

    async fn run_staged(
        &self,
        job_run_id: &str,
        staging: &PackageRunStaging<'_>,
        cancel: CancellationToken,
    ) -> Result<()> {
        staging.extract()?;

        let program = staging.file_name.display().to_string();
        let mut child = Command::new(&staging.file_name)
            .args(split_arguments(&staging.arguments))
            .current_dir(&staging.run_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunnerError::ProcessLaunch {
                program: program.clone(),
                source,
            })?;
        info!(program = %program, args = %staging.arguments, pid = ?child.id(), "process started");

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(RunnerError::ProcessLaunch {
                program,
                source: std::io::Error::other("output pipes were not captured"),
            });
        };

        let relay = OutputRelay {
            job_run_id,
            output: self.output.as_ref(),
            mail: self.mail.as_ref(),
            events: self.events.as_ref(),
            mail_from: &self.mail_from,
            cancel: &cancel,
        };
        let drained = async {
            let (out, err) = tokio::join!(relay.drain_stdout(stdout), relay.drain_stderr(stderr));
            out.and(err)
        };

        let (status, drained) = tokio::select! {
            finished = async { tokio::join!(child.wait(), drained) } => finished,
            _ = cancel.cancelled() => {
                warn!("run cancelled, killing process");
                if let Err(e) = child.kill().await {
                    error!(error = %e, "failed to kill process");
                }
                return Err(RunnerError::Cancelled);
            }
        };

        let exit_code = status?.code().unwrap_or(-1);
        info!(exit_code, "process exited");
        if exit_code != 0 {
            return Err(RunnerError::ExecutionFailed { exit_code });
        }
        drained
    }
}

/// Per-run view of the output collaborators, shared by both stream consumers.
struct OutputRelay<'a> {
    job_run_id: &'a str,
    output: &'a dyn RunOutputSink,
    mail: &'a dyn MailTransport,
    events: &'a dyn LiveEventBus,
    mail_from: &'a str,
    cancel: &'a CancellationToken,
}

impl OutputRelay<'_> {
    async fn drain_stdout(&self, stream: impl AsyncRead + Unpin) -> Result<()> {
        let mut lines = LineReader::new(stream);
        let mut first_failure = None;
        while let Some(line) = lines.next_line().await {
            self.signal();
            let handled = match decode(&line) {
                None => {
                    debug!(job_run_id = %self.job_run_id, "plain stdout line dropped");
                    Ok(())
                }
                Some(ConsoleMessage::Log { message }) => self.log(&message, false),
                Some(ConsoleMessage::Email(request)) => self.relay_email(request).await,
            };
            // Keep reading so the child never blocks on a full pipe.
            if let Err(e) = handled {
                error!(job_run_id = %self.job_run_id, error = %e, "failed to record stdout line");
                first_failure.get_or_insert(e);
            }
        }
        lines.finish(first_failure)
    }

    async fn drain_stderr(&self, stream: impl AsyncRead + Unpin) -> Result<()> {
        let mut lines = LineReader::new(stream);
        let mut first_failure = None;
        while let Some(line) = lines.next_line().await {
            self.signal();
            if let Err(e) = self.log(&prefix_lines(&line, STDERR_MARKER), true) {
                error!(job_run_id = %self.job_run_id, error = %e, "failed to record stderr line");
                first_failure.get_or_insert(e);
            }
        }
        lines.finish(first_failure)
    }

    /// Persist an email request, hand it to the transport and bracket the
    /// attempt with log lines. A failed delivery is logged, not raised.
    async fn relay_email(&self, request: EmailRequest) -> std::result::Result<(), SinkError> {
        let email_id = self.output.create_email(self.job_run_id, &request)?;
        let message = MailMessage::from_request(self.mail_from, request);
        self.log(&format!("Sending email to {}", message.to), false)?;

        match self.mail.send(&message, self.cancel).await {
            Ok(()) => {
                self.output.mark_email_sent(&email_id)?;
                self.log(&format!("Email is sent to {}", message.to), false)
            }
            Err(e) => {
                warn!(job_run_id = %self.job_run_id, to = %message.to, error = %e, "mail delivery failed");
                self.log(&format!("Failed to send email to {}: {e}", message.to), true)
            }
        }
    }

    fn log(&self, content: &str, is_error: bool) -> std::result::Result<(), SinkError> {
        self.output.append_log(self.job_run_id, content, is_error)?;
        self.events.publish(JobConsoleLogEvent {
            job_run_id: self.job_run_id.to_string(),
            content: content.to_string(),
            is_error,
        });
        Ok(())
    }

    fn signal(&self) {
        if let Err(e) = self.output.refresh_signal(self.job_run_id, Utc::now()) {
            warn!(job_run_id = %self.job_run_id, error = %e, "failed to refresh run signal");
        }
    }
}

/// Consecutive failed reads after which a stream is abandoned.
const MAX_READ_FAILURES: u32 = 8;

/// Reads newline-terminated lines, replacing invalid UTF-8 instead of failing.
///
/// A failed read is logged and reading resumes, so the child never blocks on
/// a pipe nobody drains. The first read error is kept for [`finish`](Self::finish).
struct LineReader<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
    read_error: Option<std::io::Error>,
    failures_in_a_row: u32,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    fn new(stream: R) -> Self {
        Self {
            reader: BufReader::new(stream),
            buf: Vec::new(),
            read_error: None,
            failures_in_a_row: 0,
        }
    }

    async fn next_line(&mut self) -> Option<String> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf).await {
                Ok(0) => return None,
                Ok(_) => {
                    self.failures_in_a_row = 0;
                    let line = String::from_utf8_lossy(&self.buf);
                    return Some(line.trim_end_matches(['\r', '\n']).to_string());
                }
                Err(e) => {
                    warn!(error = %e, "failed to read child output");
                    self.read_error.get_or_insert(e);
                    self.failures_in_a_row += 1;
                    if self.failures_in_a_row >= MAX_READ_FAILURES {
                        error!("giving up on child output stream");
                        return None;
                    }
                }
            }
        }
    }

    /// Outcome of a fully drained stream. Recording failures win over read errors.
    fn finish(self, record_failure: Option<SinkError>) -> Result<()> {
        if let Some(e) = record_failure {
            return Err(RunnerError::Output(e));
        }
        self.read_error.map_or(Ok(()), |e| Err(RunnerError::Io(e)))
    }
}

fn prefix_lines(text: &str, marker: &str) -> String {
    if text.is_empty() {
        return marker.to_string();
    }
    text.lines()
        .map(|line| format!("{marker}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_physical_line_gets_the_marker() {
        assert_eq!(prefix_lines("boom", STDERR_MARKER), "[stderr] boom");
        assert_eq!(
            prefix_lines("first\nsecond", STDERR_MARKER),
            "[stderr] first\n[stderr] second"
        );
        assert_eq!(prefix_lines("", STDERR_MARKER), "[stderr] ");
    }

    #[tokio::test]
    async fn line_reader_handles_crlf_and_bad_utf8() {
        let input: &[u8] = b"one\r\ntw\xffo\nlast";
        let mut reader = LineReader::new(input);
        assert_eq!(reader.next_line().await.as_deref(), Some("one"));
        assert_eq!(reader.next_line().await.as_deref(), Some("tw\u{fffd}o"));
        assert_eq!(reader.next_line().await.as_deref(), Some("last"));
        assert_eq!(reader.next_line().await, None);
        assert!(reader.finish(None).is_ok());
    }

    /// Fails `failures` reads, then serves `data`.
    struct Flaky {
        failures: u32,
        data: &'static [u8],
    }

    impl AsyncRead for Flaky {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            if self.failures > 0 {
                self.failures -= 1;
                return std::task::Poll::Ready(Err(std::io::Error::other("pipe hiccup")));
            }
            let data = self.data;
            let n = data.len().min(buf.remaining());
            buf.put_slice(&data[..n]);
            self.data = &data[n..];
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn read_error_does_not_stop_draining() {
        let mut reader = LineReader::new(Flaky {
            failures: 1,
            data: b"after\nend\n",
        });
        assert_eq!(reader.next_line().await.as_deref(), Some("after"));
        assert_eq!(reader.next_line().await.as_deref(), Some("end"));
        assert_eq!(reader.next_line().await, None);
        assert!(matches!(reader.finish(None), Err(RunnerError::Io(_))));
    }

    #[tokio::test]
    async fn a_stream_that_keeps_failing_is_abandoned() {
        let mut reader = LineReader::new(Flaky {
            failures: u32::MAX,
            data: b"never\n",
        });
        assert_eq!(reader.next_line().await, None);
        assert!(matches!(reader.finish(None), Err(RunnerError::Io(_))));
    }
}
