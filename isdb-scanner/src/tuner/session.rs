//! Tune and signal-level sessions against one tuner device.
//!
//! Each operation spawns one short-lived `recisdb` process and supervises
//! it: stdout is drained into memory while a poll loop watches for process
//! exit and for the no-output timeout. The helper is detached from the
//! terminal except for stderr pass-through when requested.

use std::io;
use std::io::Write;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use isdb_scanner_model::channels::DEFAULT_TUNE_TIMEOUT;

use super::parse;
use super::{TuneError, TunerDevice, Voltage};

/// Helper executable resolved through PATH.
pub(crate) const HELPER_COMMAND: &str = "recisdb";

/// Captures smaller than this are treated as a failed channel selection
/// even when the helper exits successfully.
pub const DEFAULT_MIN_CAPTURE_BYTES: usize = 100 * 1024;

/// How many signal-level reports are averaged per measurement.
const SIGNAL_SAMPLE_COUNT: usize = 5;

/// Interval of the process supervision loop.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Fallback when the helper fails without a recognizable stderr message.
const UNKNOWN_TUNE_ERROR: &str = "Channel selection failed due to an unknown error.";

/// Per-session tuning parameters shared by all captures on one device.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// LNB power supply voltage, passed to the helper for BS/CS channels only.
    pub lnb: Option<Voltage>,
    /// Pass the helper's stderr through to the terminal.
    pub echo_helper_log: bool,
    /// How long the helper may stay silent on stdout before the tune is
    /// abandoned.
    pub tune_timeout: Duration,
    /// Minimum stdout size for a capture to count as tuned.
    pub min_capture_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            lnb: None,
            echo_helper_log: false,
            tune_timeout: DEFAULT_TUNE_TIMEOUT,
            min_capture_bytes: DEFAULT_MIN_CAPTURE_BYTES,
        }
    }
}

/// Destination of the helper's stderr stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StderrMode {
    /// Captured for error-message parsing.
    Piped,
    /// Passed through to the terminal.
    Inherit,
    /// Discarded.
    Null,
}

/// Spawns helper processes. Swapped out for a scripted double in tests.
pub(crate) trait HelperSpawner: Send + Sync {
    fn spawn(&self, command: &[String], stderr: StderrMode) -> io::Result<Box<dyn HelperChild>>;
}

/// A running helper process.
pub(crate) trait HelperChild: Send {
    fn take_stdout(&mut self) -> Option<Box<dyn AsyncRead + Send + Unpin>>;
    fn take_stderr(&mut self) -> Option<Box<dyn AsyncRead + Send + Unpin>>;
    /// Non-blocking exit check. `Some(code)` once the process has exited.
    fn poll_exit(&mut self) -> Option<i32>;
    /// Ask the helper to stop streaming and flush its output.
    fn send_interrupt(&mut self);
}

struct RecisdbSpawner;

impl HelperSpawner for RecisdbSpawner {
    fn spawn(&self, command: &[String], stderr: StderrMode) -> io::Result<Box<dyn HelperChild>> {
        let mut builder = Command::new(&command[0]);
        builder
            .args(&command[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(match stderr {
                StderrMode::Piped => Stdio::piped(),
                StderrMode::Inherit => Stdio::inherit(),
                StderrMode::Null => Stdio::null(),
            });
        let child = builder.spawn()?;
        Ok(Box::new(RecisdbChild { child }))
    }
}

struct RecisdbChild {
    child: tokio::process::Child,
}

impl HelperChild for RecisdbChild {
    fn take_stdout(&mut self) -> Option<Box<dyn AsyncRead + Send + Unpin>> {
        self.child
            .stdout
            .take()
            .map(|stdout| Box::new(stdout) as Box<dyn AsyncRead + Send + Unpin>)
    }

    fn take_stderr(&mut self) -> Option<Box<dyn AsyncRead + Send + Unpin>> {
        self.child
            .stderr
            .take()
            .map(|stderr| Box::new(stderr) as Box<dyn AsyncRead + Send + Unpin>)
    }

    fn poll_exit(&mut self) -> Option<i32> {
        match self.child.try_wait() {
            Ok(Some(status)) => Some(status.code().unwrap_or(-1)),
            Ok(None) | Err(_) => None,
        }
    }

    fn send_interrupt(&mut self) {
        // SIGINT rather than SIGKILL so the helper closes the tuner device
        // cleanly.
        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGINT);
        }
        #[cfg(not(unix))]
        {
            let _ = self.child.start_kill();
        }
    }
}

/// One tuner device driven through the helper for the duration of a scan.
pub struct TunerSession {
    device: TunerDevice,
    config: SessionConfig,
    last_opening_failed: bool,
    spawner: Box<dyn HelperSpawner>,
}

impl TunerSession {
    pub fn new(device: TunerDevice, config: SessionConfig) -> Self {
        Self::with_spawner(device, config, Box::new(RecisdbSpawner))
    }

    pub(crate) fn with_spawner(
        device: TunerDevice,
        config: SessionConfig,
        spawner: Box<dyn HelperSpawner>,
    ) -> Self {
        TunerSession {
            device,
            config,
            last_opening_failed: false,
            spawner,
        }
    }

    pub fn device(&self) -> &TunerDevice {
        &self.device
    }

    /// Whether the most recent capture failed to open the device. Such a
    /// tuner is skipped when remeasuring signal levels, because opening it
    /// would fail again.
    pub fn last_opening_failed(&self) -> bool {
        self.last_opening_failed
    }

    fn tune_command(&self, channel: &str, duration: Duration) -> Vec<String> {
        let mut command = vec![
            HELPER_COMMAND.to_string(),
            "tune".to_string(),
            "--device".to_string(),
            self.device.path().to_string_lossy().into_owned(),
            "--channel".to_string(),
            channel.to_string(),
            "--time".to_string(),
            duration.as_secs_f64().to_string(),
        ];
        if channel.starts_with("BS") || channel.starts_with("CS") {
            if let Some(lnb) = self.config.lnb {
                command.push("--lnb".to_string());
                command.push(lnb.as_arg().to_string());
            }
        }
        command.push("-".to_string());
        command
    }

    fn checksignal_command(&self, channel: &str) -> Vec<String> {
        let mut command = vec![
            HELPER_COMMAND.to_string(),
            "checksignal".to_string(),
            "--device".to_string(),
            self.device.path().to_string_lossy().into_owned(),
            "--channel".to_string(),
            channel.to_string(),
        ];
        if channel.starts_with("BS") || channel.starts_with("CS") {
            if let Some(lnb) = self.config.lnb {
                command.push("--lnb".to_string());
                command.push(lnb.as_arg().to_string());
            }
        }
        command
    }

    /// Tune to `channel` and record its transport stream for `duration`.
    ///
    /// The recording length is enforced by the helper itself through
    /// `--time`; this side only supervises. If stdout stays empty for
    /// longer than the configured timeout the helper is interrupted and
    /// the tune reported as timed out.
    pub async fn capture(&mut self, channel: &str, duration: Duration) -> Result<Bytes, TuneError> {
        self.last_opening_failed = false;

        let command = self.tune_command(channel, duration);
        debug!("Running: {}", command.join(" "));
        let mut child = self.spawner.spawn(&command, StderrMode::Piped)?;

        let stdout = child.take_stdout().ok_or_else(|| {
            io::Error::new(io::ErrorKind::BrokenPipe, "helper stdout is not piped")
        })?;
        let first_byte_arrived = Arc::new(AtomicBool::new(false));
        let stdout_task = tokio::spawn(drain_stdout(stdout, Arc::clone(&first_byte_arrived)));
        let stderr_task = child
            .take_stderr()
            .map(|stderr| tokio::spawn(drain_stderr(stderr, self.config.echo_helper_log)));

        // The timeout clock only runs while nothing has arrived on stdout.
        // Once the first byte is through, the helper is left alone until
        // its own --time expires.
        let mut waited = Duration::ZERO;
        let exit_code = loop {
            if let Some(code) = child.poll_exit() {
                break Some(code);
            }
            if !first_byte_arrived.load(Ordering::Relaxed) {
                if waited >= self.config.tune_timeout {
                    break None;
                }
                waited += POLL_INTERVAL;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        };

        let exit_code = match exit_code {
            Some(code) => code,
            None => {
                child.send_interrupt();
                wait_for_exit(&mut *child).await;
                let _ = stdout_task.await;
                if let Some(task) = stderr_task {
                    let _ = task.await;
                }
                return Err(TuneError::TuningTimeout);
            }
        };

        let received = stdout_task.await.unwrap_or_default();
        let stderr_bytes = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };

        if exit_code != 0 {
            let stderr_text = String::from_utf8_lossy(&stderr_bytes);
            let message = parse::parse_helper_error(&stderr_text)
                .unwrap_or_else(|| UNKNOWN_TUNE_ERROR.to_string());
            if parse::is_opening_failure(&message) {
                self.last_opening_failed = true;
                return Err(TuneError::OpeningFailed { message });
            }
            return Err(TuneError::TuningFailed { message });
        }

        if received.len() < self.config.min_capture_bytes {
            return Err(TuneError::OutputTooSmall {
                received: received.len(),
            });
        }

        Ok(received.freeze())
    }

    /// Tune to `channel` and average the first few signal-level reports.
    ///
    /// Returns `None` when the helper exits before enough reports arrive,
    /// which happens on tuners that cannot lock the channel at all.
    pub async fn sample_signal_mean(&mut self, channel: &str) -> Result<Option<f64>, TuneError> {
        let command = self.checksignal_command(channel);
        debug!("Running: {}", command.join(" "));
        let stderr_mode = if self.config.echo_helper_log {
            StderrMode::Inherit
        } else {
            StderrMode::Null
        };
        let mut child = self.spawner.spawn(&command, stderr_mode)?;
        let mut stdout = child.take_stdout().ok_or_else(|| {
            io::Error::new(io::ErrorKind::BrokenPipe, "helper stdout is not piped")
        })?;

        let mut levels: Vec<f64> = Vec::with_capacity(SIGNAL_SAMPLE_COUNT);
        let mut line: Vec<u8> = Vec::new();
        let mut buf = [0u8; 512];
        loop {
            let n = match stdout.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            for &byte in &buf[..n] {
                // The helper redraws its report in place, so lines end in
                // carriage returns rather than newlines.
                if byte != b'\r' && byte != b'\n' {
                    line.push(byte);
                    continue;
                }
                if let Some(level) = parse::parse_signal_level(&String::from_utf8_lossy(&line)) {
                    levels.push(level);
                    if levels.len() >= SIGNAL_SAMPLE_COUNT {
                        child.send_interrupt();
                        wait_for_exit(&mut *child).await;
                        let mean = levels.iter().sum::<f64>() / levels.len() as f64;
                        return Ok(Some(mean));
                    }
                }
                line.clear();
            }
        }

        // The helper exited before reporting; no signal on this tuner.
        child.send_interrupt();
        wait_for_exit(&mut *child).await;
        Ok(None)
    }
}

async fn drain_stdout(
    mut reader: Box<dyn AsyncRead + Send + Unpin>,
    first_byte_arrived: Arc<AtomicBool>,
) -> BytesMut {
    let mut received = BytesMut::with_capacity(256 * 1024);
    loop {
        match reader.read_buf(&mut received).await {
            Ok(0) | Err(_) => break,
            Ok(_) => first_byte_arrived.store(true, Ordering::Relaxed),
        }
    }
    received
}

async fn drain_stderr(mut reader: Box<dyn AsyncRead + Send + Unpin>, echo: bool) -> Vec<u8> {
    let mut collected = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if echo {
                    let mut stderr = std::io::stderr().lock();
                    let _ = stderr.write_all(&buf[..n]);
                    let _ = stderr.flush();
                }
                collected.extend_from_slice(&buf[..n]);
            }
        }
    }
    collected
}

async fn wait_for_exit(child: &mut dyn HelperChild) -> i32 {
    loop {
        if let Some(code) = child.poll_exit() {
            return code;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
