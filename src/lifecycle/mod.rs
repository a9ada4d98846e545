//! Resource lifecycle management and graceful shutdown
//!
//! A [`ResourceManager`] tracks every live resource a run acquires: spawned
//! subprocesses, temp directories, cancellation tokens, and arbitrary cleanup
//! callbacks. On interrupt it cancels, kills, and cleans up everything it
//! knows about, racing a fixed timeout so shutdown can never hang.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use futures_util::future::{join_all, BoxFuture, FutureExt};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use crate::Result;

/// Process exit code after an interrupt, per shell convention (128 + SIGINT)
pub const EXIT_SIGINT: i32 = 130;

const CLEANUP_TIMEOUT: Duration = Duration::from_secs(5);

type SharedChild = Arc<tokio::sync::Mutex<Child>>;
type CleanupCallback = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Shutdown progression; transitions are one-way for the process lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    Idle,
    FirstInterrupt,
    ShuttingDown,
}

/// What a signal handler should do after recording a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    /// First signal: run bounded cleanup, then exit
    Cleanup,
    /// Repeated signal: exit immediately, skipping remaining cleanup
    ForceExit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryCounts {
    pub processes: usize,
    pub temp_dirs: usize,
    pub tokens: usize,
    pub callbacks: usize,
}

struct Inner {
    next_id: AtomicU64,
    cancelled: AtomicBool,
    phase: Mutex<ShutdownPhase>,
    processes: Mutex<HashMap<u64, SharedChild>>,
    temp_dirs: Mutex<HashMap<u64, PathBuf>>,
    tokens: Mutex<HashMap<u64, CancellationToken>>,
    callbacks: Mutex<HashMap<u64, CleanupCallback>>,
}

/// Process-wide registry of live resources plus interrupt handling
///
/// Cheap to clone; all clones share state. Constructed once at process start
/// and passed to every component that acquires resources. Tests construct
/// independent instances instead of resetting a global.
#[derive(Clone)]
pub struct ResourceManager {
    inner: Arc<Inner>,
}

/// Revocation handle returned by every registration
///
/// Revoking after the entry was already removed (naturally or during
/// shutdown) is a no-op.
pub struct Registration {
    id: u64,
    slot: Slot,
    inner: Weak<Inner>,
}

#[derive(Clone, Copy)]
enum Slot {
    Process,
    TempDir,
    Token,
    Callback,
}

impl Registration {
    pub fn revoke(&self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        match self.slot {
            Slot::Process => {
                inner.processes.lock().expect("registry poisoned").remove(&self.id);
            }
            Slot::TempDir => {
                inner.temp_dirs.lock().expect("registry poisoned").remove(&self.id);
            }
            Slot::Token => {
                inner.tokens.lock().expect("registry poisoned").remove(&self.id);
            }
            Slot::Callback => {
                inner.callbacks.lock().expect("registry poisoned").remove(&self.id);
            }
        }
    }
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceManager {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                next_id: AtomicU64::new(0),
                cancelled: AtomicBool::new(false),
                phase: Mutex::new(ShutdownPhase::Idle),
                processes: Mutex::new(HashMap::new()),
                temp_dirs: Mutex::new(HashMap::new()),
                tokens: Mutex::new(HashMap::new()),
                callbacks: Mutex::new(HashMap::new()),
            }),
        }
    }

    fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn registration(&self, id: u64, slot: Slot) -> Registration {
        Registration {
            id,
            slot,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Track a spawned subprocess so shutdown can terminate it
    pub fn register_process(&self, child: SharedChild) -> Registration {
        let id = self.next_id();
        self.inner
            .processes
            .lock()
            .expect("registry poisoned")
            .insert(id, child);
        self.registration(id, Slot::Process)
    }

    /// Track a temp directory for removal during shutdown
    pub fn register_temp_dir(&self, path: impl Into<PathBuf>) -> Registration {
        let id = self.next_id();
        self.inner
            .temp_dirs
            .lock()
            .expect("registry poisoned")
            .insert(id, path.into());
        self.registration(id, Slot::TempDir)
    }

    /// Track a cancellation token so shutdown can abort in-flight requests
    pub fn register_token(&self, token: &CancellationToken) -> Registration {
        let id = self.next_id();
        self.inner
            .tokens
            .lock()
            .expect("registry poisoned")
            .insert(id, token.clone());
        self.registration(id, Slot::Token)
    }

    /// Create and track a fresh cancellation token in one step
    pub fn cancellation_token(&self) -> (CancellationToken, Registration) {
        let token = CancellationToken::new();
        let registration = self.register_token(&token);
        (token, registration)
    }

    /// Register an arbitrary async cleanup callback to run during shutdown
    pub fn register_cleanup<F, Fut>(&self, callback: F) -> Registration
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id();
        let boxed: CleanupCallback = Box::new(move || callback().boxed());
        self.inner
            .callbacks
            .lock()
            .expect("registry poisoned")
            .insert(id, boxed);
        self.registration(id, Slot::Callback)
    }

    /// Whether shutdown has begun; later code may poll this to skip
    /// non-essential work
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> ShutdownPhase {
        *self.inner.phase.lock().expect("phase poisoned")
    }

    pub fn registry_counts(&self) -> RegistryCounts {
        RegistryCounts {
            processes: self.inner.processes.lock().expect("registry poisoned").len(),
            temp_dirs: self.inner.temp_dirs.lock().expect("registry poisoned").len(),
            tokens: self.inner.tokens.lock().expect("registry poisoned").len(),
            callbacks: self.inner.callbacks.lock().expect("registry poisoned").len(),
        }
    }

    /// Record an interrupt signal and decide how to react. The first
    /// interrupt starts cleanup; any further one forces an immediate exit.
    pub fn begin_interrupt(&self) -> InterruptAction {
        let mut phase = self.inner.phase.lock().expect("phase poisoned");
        match *phase {
            ShutdownPhase::Idle => {
                *phase = ShutdownPhase::FirstInterrupt;
                InterruptAction::Cleanup
            }
            ShutdownPhase::FirstInterrupt | ShutdownPhase::ShuttingDown => {
                InterruptAction::ForceExit
            }
        }
    }

    /// Record a termination signal. Same cleanup path as the first
    /// interrupt, without the double-signal grace window.
    pub fn begin_termination(&self) -> InterruptAction {
        let mut phase = self.inner.phase.lock().expect("phase poisoned");
        match *phase {
            ShutdownPhase::Idle => {
                *phase = ShutdownPhase::ShuttingDown;
                InterruptAction::Cleanup
            }
            _ => InterruptAction::ForceExit,
        }
    }

    fn cancel_tokens(&self) {
        let tokens: Vec<CancellationToken> = {
            let mut guard = self.inner.tokens.lock().expect("registry poisoned");
            guard.drain().map(|(_, token)| token).collect()
        };
        for token in tokens {
            if !token.is_cancelled() {
                token.cancel();
            }
        }
    }

    fn kill_processes(&self) {
        let children: Vec<SharedChild> = {
            let mut guard = self.inner.processes.lock().expect("registry poisoned");
            guard.drain().map(|(_, child)| child).collect()
        };
        for child in children {
            // try_lock: a reader awaiting the child holds the lock until the
            // kill below makes it return, so never block the shutdown path
            if let Ok(mut guard) = child.try_lock() {
                let _ = guard.start_kill();
            }
        }
    }

    async fn run_cleanup_callbacks(&self) {
        let callbacks: Vec<CleanupCallback> = {
            let mut guard = self.inner.callbacks.lock().expect("registry poisoned");
            guard.drain().map(|(_, callback)| callback).collect()
        };
        // Fire all, then join; a panicking callback only loses its own task
        let handles: Vec<_> = callbacks
            .into_iter()
            .map(|callback| tokio::spawn(callback()))
            .collect();
        for handle in handles {
            let _ = handle.await;
        }
    }

    async fn remove_temp_dirs(&self) {
        let dirs: Vec<PathBuf> = {
            let mut guard = self.inner.temp_dirs.lock().expect("registry poisoned");
            guard.drain().map(|(_, dir)| dir).collect()
        };
        join_all(dirs.into_iter().map(|dir| async move {
            let _ = tokio::fs::remove_dir_all(&dir).await;
        }))
        .await;
    }

    /// Cancel, kill, and clean up everything registered, racing the cleanup
    /// work against a fixed timeout so shutdown is bounded in time.
    pub async fn perform_cleanup(&self) {
        {
            let mut phase = self.inner.phase.lock().expect("phase poisoned");
            *phase = ShutdownPhase::ShuttingDown;
        }
        self.inner.cancelled.store(true, Ordering::SeqCst);

        self.cancel_tokens();
        self.kill_processes();

        let cleanup = async {
            tokio::join!(self.run_cleanup_callbacks(), self.remove_temp_dirs());
        };

        if tokio::time::timeout(CLEANUP_TIMEOUT, cleanup).await.is_err() {
            eprintln!("\nCleanup timed out, forcing exit.");
        }
    }

    /// Spawn a command with piped stdio, register it for shutdown
    /// termination, capture its output, and revoke the registration once it
    /// exits naturally.
    pub async fn run_command(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        tracing::debug!(%program, ?args, "spawning command");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();

        let shared: SharedChild = Arc::new(tokio::sync::Mutex::new(child));
        let registration = self.register_process(shared.clone());

        let mut stdout = String::new();
        let mut stderr = String::new();
        let stdout_read = async {
            if let Some(pipe) = stdout_pipe.as_mut() {
                let _ = pipe.read_to_string(&mut stdout).await;
            }
        };
        let stderr_read = async {
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_string(&mut stderr).await;
            }
        };
        tokio::join!(stdout_read, stderr_read);

        let status = shared.lock().await.wait().await?;
        registration.revoke();

        Ok(CommandOutput {
            success: status.success(),
            stdout,
            stderr,
        })
    }
}

/// Captured output of a registered subprocess
#[derive(Debug)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Listen for SIGINT/SIGTERM for the rest of the process lifetime,
/// dispatching to the manager's state machine. Exits the process with
/// [`EXIT_SIGINT`] once handling completes.
pub fn install_signal_handlers(manager: ResourceManager) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let mut sigint = match signal(SignalKind::interrupt()) {
                Ok(stream) => stream,
                Err(error) => {
                    tracing::error!(%error, "failed to install SIGINT handler");
                    return;
                }
            };
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(stream) => stream,
                Err(error) => {
                    tracing::error!(%error, "failed to install SIGTERM handler");
                    return;
                }
            };

            loop {
                tokio::select! {
                    _ = sigint.recv() => match manager.begin_interrupt() {
                        InterruptAction::Cleanup => {
                            eprintln!("\nInterrupted. Cleaning up... (press Ctrl+C again to force quit)");
                            let manager = manager.clone();
                            tokio::spawn(async move {
                                manager.perform_cleanup().await;
                                std::process::exit(EXIT_SIGINT);
                            });
                        }
                        InterruptAction::ForceExit => {
                            eprintln!("\nForce quit.");
                            std::process::exit(EXIT_SIGINT);
                        }
                    },
                    _ = sigterm.recv() => match manager.begin_termination() {
                        InterruptAction::Cleanup => {
                            eprintln!("\nTermination requested. Cleaning up...");
                            let manager = manager.clone();
                            tokio::spawn(async move {
                                manager.perform_cleanup().await;
                                std::process::exit(EXIT_SIGINT);
                            });
                        }
                        InterruptAction::ForceExit => {
                            std::process::exit(EXIT_SIGINT);
                        }
                    },
                }
            }
        }

        #[cfg(not(unix))]
        {
            loop {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                match manager.begin_interrupt() {
                    InterruptAction::Cleanup => {
                        eprintln!("\nInterrupted. Cleaning up... (press Ctrl+C again to force quit)");
                        let manager = manager.clone();
                        tokio::spawn(async move {
                            manager.perform_cleanup().await;
                            std::process::exit(EXIT_SIGINT);
                        });
                    }
                    InterruptAction::ForceExit => {
                        eprintln!("\nForce quit.");
                        std::process::exit(EXIT_SIGINT);
                    }
                }
            }
        }
    });
}

/// Create a temp directory under the system temp root and register it for
/// shutdown removal.
pub fn registered_temp_dir(manager: &ResourceManager) -> Result<(PathBuf, Registration)> {
    let dir = tempfile::Builder::new().prefix("castnotes_").tempdir()?;
    // Registered for shutdown removal, so drop-based deletion is disarmed
    let path: PathBuf = dir.into_path();
    let registration = manager.register_temp_dir(&path);
    Ok((path, registration))
}

/// Remove a temp directory now and revoke its shutdown registration
pub async fn release_temp_dir(path: &Path, registration: &Registration) {
    let _ = tokio::fs::remove_dir_all(path).await;
    registration.revoke();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registrations_are_counted() {
        let manager = ResourceManager::new();
        let _dir = manager.register_temp_dir("/tmp/castnotes-test-a");
        let (_token, _reg) = manager.cancellation_token();
        let _cb = manager.register_cleanup(|| async {});

        let counts = manager.registry_counts();
        assert_eq!(counts.temp_dirs, 1);
        assert_eq!(counts.tokens, 1);
        assert_eq!(counts.callbacks, 1);
        assert_eq!(counts.processes, 0);
    }

    #[test]
    fn revocation_is_idempotent() {
        let manager = ResourceManager::new();
        let keep = manager.register_temp_dir("/tmp/castnotes-test-keep");
        let revoked = manager.register_temp_dir("/tmp/castnotes-test-revoked");

        revoked.revoke();
        revoked.revoke();

        assert_eq!(manager.registry_counts().temp_dirs, 1);
        keep.revoke();
        assert_eq!(manager.registry_counts().temp_dirs, 0);
    }

    #[test]
    fn double_interrupt_forces_exit() {
        let manager = ResourceManager::new();
        assert_eq!(manager.begin_interrupt(), InterruptAction::Cleanup);
        assert_eq!(manager.begin_interrupt(), InterruptAction::ForceExit);
        assert_eq!(manager.begin_interrupt(), InterruptAction::ForceExit);
    }

    #[test]
    fn termination_skips_the_grace_window() {
        let manager = ResourceManager::new();
        assert_eq!(manager.begin_termination(), InterruptAction::Cleanup);
        assert_eq!(manager.phase(), ShutdownPhase::ShuttingDown);
        assert_eq!(manager.begin_termination(), InterruptAction::ForceExit);
    }

    #[tokio::test]
    async fn cleanup_sets_cancelled_and_aborts_tokens() {
        let manager = ResourceManager::new();
        let (token, _registration) = manager.cancellation_token();
        assert!(!manager.is_cancelled());

        manager.perform_cleanup().await;

        assert!(manager.is_cancelled());
        assert!(token.is_cancelled());
        assert_eq!(manager.phase(), ShutdownPhase::ShuttingDown);
        assert_eq!(manager.registry_counts().tokens, 0);
    }

    #[tokio::test]
    async fn cleanup_removes_registered_temp_dirs() {
        let manager = ResourceManager::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.into_path();
        let _registration = manager.register_temp_dir(&path);
        assert!(path.exists());

        manager.perform_cleanup().await;

        assert!(!path.exists());
        assert_eq!(manager.registry_counts().temp_dirs, 0);
    }

    #[tokio::test]
    async fn cleanup_runs_registered_callbacks() {
        use std::sync::atomic::AtomicBool;

        let manager = ResourceManager::new();
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();
        let _registration = manager.register_cleanup(move || async move {
            ran_clone.store(true, Ordering::SeqCst);
        });

        manager.perform_cleanup().await;

        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(manager.registry_counts().callbacks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_is_bounded_by_the_timeout() {
        let manager = ResourceManager::new();
        let _registration =
            manager.register_cleanup(|| futures_util::future::pending::<()>());

        let start = tokio::time::Instant::now();
        manager.perform_cleanup().await;
        let elapsed = start.elapsed();

        assert!(elapsed >= CLEANUP_TIMEOUT, "waited {elapsed:?}");
        assert!(elapsed < CLEANUP_TIMEOUT + Duration::from_secs(1), "waited {elapsed:?}");
    }

    #[tokio::test]
    async fn run_command_captures_output_and_revokes() {
        let manager = ResourceManager::new();
        let output = manager.run_command("echo", &["hello"]).await.unwrap();

        assert!(output.success);
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(manager.registry_counts().processes, 0);
    }
}
