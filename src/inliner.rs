use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use crate::error::RenderError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Shared flag that aborts a running inline step from another thread.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self { Self::default() }
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn cancel(&self) { self.0.store(true, Ordering::SeqCst); }
    pub fn is_cancelled(&self) -> bool { self.0.load(Ordering::SeqCst) }
}

/// Turns the un-inlined email on disk into the inlined one. Blocks until done.
pub trait CssInliner {
    fn inline(&self, timeout: Duration, cancel: &CancelToken) -> Result<(), RenderError>;
}

/// Runs the node build that inlines CSS: `install` once, then `run-script build`.
#[derive(Clone, Debug)]
pub struct NpmInliner {
    pub tool_dir: PathBuf,
    pub program: String,
}

impl NpmInliner {
    pub fn new(tool_dir: impl Into<PathBuf>, program: impl Into<String>) -> Self {
        NpmInliner { tool_dir: tool_dir.into(), program: program.into() }
    }

    fn needs_install(&self) -> bool { !self.tool_dir.join("node_modules").exists() }

    fn run_stage(&self, args: &[&str], deadline: Option<Instant>, cancel: &CancelToken) -> Result<(), RenderError> {
        let stage = format!("{} {}", self.program, args.join(" "));
        log::debug!("Running `{}` in {}", stage, self.tool_dir.to_string_lossy());
        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .current_dir(&self.tool_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // own process group so a timeout can take down node workers started by npm
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        let mut child = cmd.spawn()
            .map_err(|e| RenderError::Pipeline(format!("failed to start `{}`: {}", stage, e)))?;
        // drain pipes on their own threads so a chatty build can't fill them and stall
        let out = child.stdout.take().map(drain);
        let err = child.stderr.take().map(drain);
        let status = loop {
            if cancel.is_cancelled() {
                kill_tree(&mut child);
                return Err(RenderError::Cancelled);
            }
            if let Some(d) = deadline && Instant::now() >= d {
                kill_tree(&mut child);
                return Err(RenderError::Pipeline(format!("`{}` timed out", stage)));
            }
            match child.try_wait() {
                Ok(Some(st)) => break st,
                Ok(None) => std::thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(RenderError::Pipeline(format!("failed to wait on `{}`: {}", stage, e))),
            }
        };
        // a background process may still hold the pipes open; never wait on it past the deadline
        for (name, rx) in [("stdout", out), ("stderr", err)] {
            let Some(rx) = rx else { continue };
            let wait = deadline.map(|d| d.saturating_duration_since(Instant::now())).unwrap_or(DRAIN_GRACE).min(DRAIN_GRACE);
            match rx.recv_timeout(wait) {
                Ok(text) if !text.trim().is_empty() => log::debug!("`{}` {}:\n{}", stage, name, text.trim_end()),
                Ok(_) => {}
                Err(_) => log::warn!("`{}` {} still open after exit, dropping output", stage, name),
            }
        }
        if status.success() { Ok(()) } else { Err(RenderError::Pipeline(format!("`{}` exited with {}", stage, status))) }
    }
}

fn drain<R: Read + Send + 'static>(mut r: R) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = r.read_to_end(&mut buf);
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });
    rx
}

fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        let group = format!("-{}", child.id());
        let _ = Command::new("kill")
            .args(["-KILL", "--", group.as_str()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
    let _ = child.kill();
    let _ = child.wait();
}

impl CssInliner for NpmInliner {
    fn inline(&self, timeout: Duration, cancel: &CancelToken) -> Result<(), RenderError> {
        // a timeout too large to represent means no deadline
        let deadline = Instant::now().checked_add(timeout);
        if self.needs_install() {
            log::info!("Installing inliner dependencies in {}", self.tool_dir.to_string_lossy());
            self.run_stage(&["install"], deadline, cancel)?;
        } else {
            log::debug!("Inliner dependencies present, skipping install");
        }
        self.run_stage(&["run-script", "build"], deadline, cancel)
    }
}
