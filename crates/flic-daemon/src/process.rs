//! flicd process supervision

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::time::timeout;

use flic_core::prelude::*;

/// Diagnostic marker flicd prints on stderr once it is listening.
///
/// Readiness is derived from this line, not from the spawn succeeding:
/// flicd binds its socket and opens the button database asynchronously
/// and may exit before either works.
pub const READY_MARKER: &str = "now up and running";

/// How long shutdown waits for flicd to honor SIGTERM before force-killing
const GRACEFUL_EXIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Events from the daemon supervisor
#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    /// flicd reported it is listening
    Ready,
    /// Diagnostic stderr line (already logged, forwarded for operator surfacing)
    Stderr(String),
    /// flicd has exited
    Exited { code: Option<i32> },
}

/// Supervises a flicd child process.
///
/// The `Child` handle is moved into a dedicated `wait_for_exit` background
/// task that calls `child.wait()`, so the real exit code is captured and
/// emitted as `SupervisorEvent::Exited { code: Some(N) }`.
///
/// Readiness is tracked the same way as exit: an atomic flag plus a
/// [`Notify`] so `wait_until_ready()` can await without holding a lock
/// across `.await`. When the operator runs the daemon themselves
/// ([`FlicdProcess::external`]) the readiness signal is trivially
/// completed and no child is tracked.
pub struct FlicdProcess {
    /// Process ID for logging and graceful termination
    pid: Option<u32>,
    /// One-shot sender that tells the wait task to force-kill the process.
    /// Consumed on first use (or on drop).
    kill_tx: Option<oneshot::Sender<()>>,
    /// Set to `true` by the stderr reader once the ready marker is seen.
    ready: Arc<AtomicBool>,
    /// Notified immediately after the ready flag is set.
    ready_notify: Arc<Notify>,
    /// Set to `true` by the wait task once the child has exited.
    exited: Arc<AtomicBool>,
    /// Notified by the wait task immediately after the child exits.
    exit_notify: Arc<Notify>,
    /// True when the operator runs flicd themselves; nothing to supervise.
    external: bool,
}

impl FlicdProcess {
    /// Spawn flicd bound to `port`, wiring its stderr to diagnostic logging.
    ///
    /// `device_hint` is the operator-chosen Bluetooth interface (flicd's
    /// `-h`), `db_path` the daemon's own pairing database. Events are
    /// sent to `event_tx` for processing by the adapter event loop.
    pub fn start(
        binary: &Path,
        db_path: &Path,
        port: u16,
        device_hint: Option<&str>,
        event_tx: mpsc::Sender<SupervisorEvent>,
    ) -> Result<Self> {
        let mut args: Vec<String> = vec![
            "-f".to_string(),
            db_path.display().to_string(),
            "-p".to_string(),
            port.to_string(),
            "-w".to_string(),
        ];
        if let Some(hint) = device_hint {
            args.push("-h".to_string());
            args.push(hint.to_string());
        }

        info!("Spawning flicd: {} {}", binary.display(), args.join(" "));

        let mut child = Command::new(binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true) // Critical: cleanup on drop
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::FlicdNotFound
                } else {
                    Error::ProcessSpawn {
                        reason: e.to_string(),
                    }
                }
            })?;

        let pid = child.id();
        info!("flicd started with PID: {:?}", pid);

        // Readiness primitives, shared with the stderr reader
        let ready = Arc::new(AtomicBool::new(false));
        let ready_notify = Arc::new(Notify::new());

        // flicd logs exclusively to stderr; the ready marker arrives there
        let stderr = child.stderr.take().expect("stderr was configured");
        tokio::spawn(Self::stderr_reader(
            stderr,
            event_tx.clone(),
            Arc::clone(&ready),
            Arc::clone(&ready_notify),
        ));

        // Drain stdout so the pipe never fills
        let stdout = child.stdout.take().expect("stdout was configured");
        tokio::spawn(Self::stdout_reader(stdout));

        // Shared exit-state primitives
        let exited = Arc::new(AtomicBool::new(false));
        let exit_notify = Arc::new(Notify::new());

        // Kill channel: FlicdProcess holds the sender, wait task holds the receiver.
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        // Spawn the dedicated wait task — takes ownership of `child`.
        tokio::spawn(Self::wait_for_exit(
            child,
            kill_rx,
            event_tx,
            Arc::clone(&exited),
            Arc::clone(&exit_notify),
        ));

        Ok(Self {
            pid,
            kill_tx: Some(kill_tx),
            ready,
            ready_notify,
            exited,
            exit_notify,
            external: false,
        })
    }

    /// Resolve the daemon binary and spawn with the default database location
    pub fn start_default(
        binary_override: Option<&Path>,
        port: u16,
        device_hint: Option<&str>,
        event_tx: mpsc::Sender<SupervisorEvent>,
    ) -> Result<Self> {
        let binary = super::binary::resolve_flicd_binary(binary_override)?;
        let db_path = default_db_path();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::start(&binary, &db_path, port, device_hint, event_tx)
    }

    /// The operator runs flicd themselves; readiness is trivially complete.
    pub fn external() -> Self {
        warn!("Daemon auto-start disabled; assuming an externally-run flicd");
        Self {
            pid: None,
            kill_tx: None,
            ready: Arc::new(AtomicBool::new(true)),
            ready_notify: Arc::new(Notify::new()),
            exited: Arc::new(AtomicBool::new(false)),
            exit_notify: Arc::new(Notify::new()),
            external: true,
        }
    }

    /// Read stderr lines, forward them, and watch for the ready marker
    async fn stderr_reader(
        stderr: tokio::process::ChildStderr,
        tx: mpsc::Sender<SupervisorEvent>,
        ready: Arc<AtomicBool>,
        ready_notify: Arc<Notify>,
    ) {
        let mut reader = BufReader::new(stderr).lines();

        while let Ok(Some(line)) = reader.next_line().await {
            trace!("flicd stderr: {}", line);

            if !ready.load(Ordering::Acquire) && line.contains(READY_MARKER) {
                info!("flicd is up and running");
                // Flag before notify so wait_until_ready cannot miss it
                ready.store(true, Ordering::Release);
                ready_notify.notify_waiters();
                if tx.send(SupervisorEvent::Ready).await.is_err() {
                    break;
                }
            }

            if tx.send(SupervisorEvent::Stderr(line)).await.is_err() {
                debug!("supervisor channel closed");
                break;
            }
        }

        debug!("flicd stderr reader finished");
    }

    /// Drain stdout; flicd is not expected to write anything meaningful there
    async fn stdout_reader(stdout: tokio::process::ChildStdout) {
        let mut reader = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = reader.next_line().await {
            trace!("flicd stdout: {}", line);
        }
    }

    /// Background task: owns `child`, waits for it to exit, emits `SupervisorEvent::Exited`.
    ///
    /// Two ways the task can end:
    /// 1. flicd exits naturally — `child.wait()` resolves.
    /// 2. `kill_rx` fires — we kill the child first, then wait for it.
    async fn wait_for_exit(
        mut child: Child,
        kill_rx: oneshot::Receiver<()>,
        event_tx: mpsc::Sender<SupervisorEvent>,
        exited: Arc<AtomicBool>,
        exit_notify: Arc<Notify>,
    ) {
        let code: Option<i32> = tokio::select! {
            // Natural exit path
            result = child.wait() => {
                match result {
                    Ok(status) => {
                        info!("flicd exited with status: {:?}", status);
                        status.code()
                    }
                    Err(e) => {
                        error!("Error waiting for flicd: {}", e);
                        None
                    }
                }
            }
            // Force-kill path: kill_tx was sent (by shutdown or drop)
            _ = kill_rx => {
                info!("Kill signal received, force-killing flicd");
                if let Err(e) = child.kill().await {
                    error!("Failed to kill flicd: {}", e);
                }
                match child.wait().await {
                    Ok(status) => {
                        info!("flicd killed, exit status: {:?}", status);
                        status.code()
                    }
                    Err(e) => {
                        error!("Error waiting after kill: {}", e);
                        None
                    }
                }
            }
        };

        // Mark process as exited and wake any waiters before sending the event.
        // This order ensures `has_exited()` is true before callers observe the event.
        exited.store(true, Ordering::Release);
        exit_notify.notify_waiters();

        debug!("Sending SupervisorEvent::Exited {{ code: {:?} }}", code);
        let _ = event_tx.send(SupervisorEvent::Exited { code }).await;
    }

    /// Wait for flicd to report readiness.
    ///
    /// Resolves `Ok(())` once the ready marker has been seen (immediately
    /// for an external daemon). Resolves `Err` if the process exits
    /// before signaling readiness, so callers never block forever on a
    /// daemon that died during startup.
    pub async fn wait_until_ready(&self) -> Result<()> {
        // Create the notified futures BEFORE the flag checks so a
        // notification between check and await cannot be missed.
        let ready_notified = self.ready_notify.notified();
        let exit_notified = self.exit_notify.notified();

        if self.is_ready() {
            return Ok(());
        }
        if self.has_exited() {
            return Err(Error::daemon("flicd exited before signaling readiness"));
        }

        tokio::select! {
            _ = ready_notified => Ok(()),
            _ = exit_notified => Err(Error::daemon("flicd exited before signaling readiness")),
        }
    }

    /// Gracefully shut down flicd.
    ///
    /// 1. No-op for an external daemon or an already-exited child
    /// 2. Send SIGTERM to the process group leader
    /// 3. Wait up to 2s for graceful exit via `exit_notify`
    /// 4. Send the kill signal to the wait task if graceful exit times out
    ///
    /// Always completes; safe to call even if the process already exited.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.external {
            return Ok(());
        }

        // Fast path: if process already exited, we're done
        if self.has_exited() {
            info!("flicd already exited, skipping shutdown");
            return Ok(());
        }

        info!("Initiating flicd shutdown");
        self.request_termination();

        // Race-free pattern: create the `notified()` future BEFORE the final
        // `has_exited()` check, so we cannot miss a notification that fires
        // between the check and the await.
        let notified = self.exit_notify.notified();
        if self.has_exited() {
            info!("flicd exited gracefully");
            return Ok(());
        }

        match timeout(GRACEFUL_EXIT_TIMEOUT, notified).await {
            Ok(()) => {
                info!("flicd exited gracefully");
                Ok(())
            }
            Err(_) => {
                warn!("Timeout waiting for graceful exit, force killing");
                self.force_kill()
            }
        }
    }

    /// Ask flicd to terminate on its expected signal (SIGTERM)
    #[cfg(unix)]
    fn request_termination(&self) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = self.pid {
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                // Process may have exited between the check and the signal
                debug!("SIGTERM to flicd failed: {}", e);
            }
        }
    }

    #[cfg(not(unix))]
    fn request_termination(&self) {
        // No graceful signal available; the force-kill path handles it
    }

    /// Force kill the process by signalling the wait task.
    ///
    /// The wait task calls `child.kill()` and then `child.wait()`, ensuring
    /// the OS reaps the process correctly before emitting the exit event.
    fn force_kill(&mut self) -> Result<()> {
        warn!("Force killing flicd via kill channel");
        if let Some(tx) = self.kill_tx.take() {
            // Ignore send error — the wait task may have already exited naturally.
            let _ = tx.send(());
        }
        Ok(())
    }

    /// Check if the ready marker has been seen
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Check if the process has already exited.
    ///
    /// Non-blocking, synchronous check backed by an atomic flag that is
    /// set by the `wait_for_exit` task.
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    /// Check if the process is still running (always true for external daemons)
    pub fn is_running(&self) -> bool {
        !self.has_exited()
    }

    /// Get the process ID
    pub fn id(&self) -> Option<u32> {
        self.pid
    }
}

impl Drop for FlicdProcess {
    fn drop(&mut self) {
        if !self.external && !self.has_exited() {
            warn!("FlicdProcess dropped while flicd may still be running");
            // Send kill signal so the wait task tears down the child cleanly.
            // If kill_tx was already consumed by shutdown(), this is a no-op.
            if let Some(tx) = self.kill_tx.take() {
                let _ = tx.send(());
            }
        }
        // kill_on_drop(true) on the Child is the final safety net if the
        // wait task hasn't had a chance to handle the kill yet.
        debug!("FlicdProcess dropped");
    }
}

/// Default location for the daemon's pairing database
fn default_db_path() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("flic-bridge").join("flicdb.sqlite")
}
