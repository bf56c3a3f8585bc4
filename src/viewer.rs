use anyhow::{Context, bail};
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Seconds per slide the viewer uses when not told otherwise.
pub(crate) const DEFAULT_INTERVAL_SECS: u32 = 5;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SlideshowOptions {
    pub(crate) command: Option<String>,
    pub(crate) fullscreen: bool,
    pub(crate) random: bool,
    pub(crate) interval_secs: u32,
}

impl Default for SlideshowOptions {
    fn default() -> Self {
        Self {
            command: None,
            fullscreen: false,
            random: false,
            interval_secs: DEFAULT_INTERVAL_SECS,
        }
    }
}

impl SlideshowOptions {
    /// Program followed by its arguments. The configured command is split
    /// on whitespace, slideshow flags are appended.
    pub(crate) fn command_line(&self) -> Option<Vec<String>> {
        let mut args: Vec<String> = self
            .command
            .as_deref()?
            .split_whitespace()
            .map(|s| s.to_string())
            .collect();
        if args.is_empty() {
            return None;
        }
        if self.fullscreen {
            args.push("--fullscreen".to_string());
        }
        if self.random {
            args.push("--random".to_string());
        }
        if self.interval_secs != DEFAULT_INTERVAL_SECS {
            args.push("--interval".to_string());
            args.push(self.interval_secs.to_string());
        }
        Some(args)
    }
}

/// Start the slideshow process in the background. The viewer only reads the
/// progress file and ledger. A waiter thread reaps it when it exits, the
/// returned handle yields its exit status.
pub(crate) fn launch(options: &SlideshowOptions) -> anyhow::Result<JoinHandle<Option<ExitStatus>>> {
    let Some(args) = options.command_line() else {
        bail!("no viewer command configured");
    };
    let (program, rest) = args.split_at(1);
    info!("Starting slideshow: {}", args.join(" "));
    let mut child = Command::new(&program[0])
        .args(rest)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("Unable to start viewer {:?}", program[0]))?;
    let pid = child.id();
    info!("Slideshow running as pid {pid}");
    thread::Builder::new()
        .name("viewer-wait".to_string())
        .spawn(move || match child.wait() {
            Ok(status) => {
                debug!("Slideshow pid {pid} exited: {status}");
                Some(status)
            }
            Err(e) => {
                warn!("Unable to wait for slideshow pid {pid}: {e}");
                None
            }
        })
        .context("Unable to start viewer waiter thread")
}

/// Launch when a viewer is configured, log and carry on when it can't start.
pub(crate) fn launch_if_configured(options: &SlideshowOptions) {
    if options.command.is_none() {
        warn!("Slideshow requested but no viewer command configured");
        return;
    }
    // the waiter thread runs detached
    if let Err(e) = launch(options) {
        warn!("Slideshow not started: {e:#}");
    }
}
