//! Managed child processes (device enumeration helpers, local backends).
//!
//! A process counts as started once it survives a short grace window. Exiting inside
//! the window is a start failure reported once to the caller; exiting afterwards is
//! only logged by the supervising task.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::{GatewayError, Result};

/// Executable and arguments of a managed process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
	pub program: PathBuf,
	pub args: Vec<String>,
}

impl ProcessSpec {
	pub fn new(program: impl Into<PathBuf>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
		Self {
			program: program.into(),
			args: args.into_iter().map(Into::into).collect(),
		}
	}
}

/// Handle to a running child process.
///
/// The child is owned by a supervising task; dropping the handle or calling
/// [`terminate`](Self::terminate) kills it.
#[derive(Debug)]
pub struct ManagedProcess {
	program: PathBuf,
	pid: Option<u32>,
	kill: Option<oneshot::Sender<()>>,
}

impl ManagedProcess {
	/// Spawns `spec` and waits out the `grace` window.
	pub async fn spawn(spec: &ProcessSpec, grace: Duration) -> Result<Self> {
		let mut cmd = Command::new(&spec.program);
		cmd.args(&spec.args)
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true);

		#[cfg(unix)]
		cmd.process_group(0);

		let mut child = cmd.spawn().map_err(|source| GatewayError::Spawn {
			program: spec.program.clone(),
			source,
		})?;
		let pid = child.id();
		let name = spec.program.display().to_string();

		if let Some(stdout) = child.stdout.take() {
			tokio::spawn(log_lines(name.clone(), "stdout", stdout));
		}
		if let Some(stderr) = child.stderr.take() {
			tokio::spawn(log_lines(name.clone(), "stderr", stderr));
		}

		tokio::select! {
			status = child.wait() => {
				let status = match status {
					Ok(status) => status.to_string(),
					Err(err) => err.to_string(),
				};
				return Err(GatewayError::ExitedEarly {
					program: spec.program.clone(),
					status,
				});
			}
			_ = tokio::time::sleep(grace) => {}
		}

		info!(target = "gw.process", program = %name, pid = ?pid, "managed process started");

		let (kill_tx, kill_rx) = oneshot::channel();
		tokio::spawn(supervise(name, child, kill_rx));

		Ok(Self {
			program: spec.program.clone(),
			pid,
			kill: Some(kill_tx),
		})
	}

	pub fn pid(&self) -> Option<u32> {
		self.pid
	}

	pub fn program(&self) -> &std::path::Path {
		&self.program
	}

	/// Signals the process to exit. Idempotent.
	pub fn terminate(&mut self) {
		if let Some(kill) = self.kill.take() {
			let _ = kill.send(());
		}
	}
}

/// Per-adapter process state. `Starting` reserves the slot across the grace window
/// so a concurrent second start observes it; its ticket identifies which start
/// attempt holds the reservation.
#[derive(Debug, Default)]
pub(crate) enum ProcessSlot {
	#[default]
	Idle,
	Starting(u64),
	Running(ManagedProcess),
}

impl ProcessSlot {
	pub(crate) fn is_idle(&self) -> bool {
		matches!(self, ProcessSlot::Idle)
	}

	pub(crate) fn is_running(&self) -> bool {
		matches!(self, ProcessSlot::Running(_))
	}

	pub(crate) fn is_starting(&self, ticket: u64) -> bool {
		matches!(self, ProcessSlot::Starting(held) if *held == ticket)
	}
}

/// Releases a `Starting` reservation unless disarmed.
///
/// Dropping a start future mid-grace (e.g. under a timeout) would otherwise leave the
/// slot reserved with no process behind it.
pub(crate) struct StartReservation<'a> {
	slot: &'a Mutex<ProcessSlot>,
	ticket: u64,
	armed: bool,
}

impl<'a> StartReservation<'a> {
	/// Reserves an idle `slot`, or returns `None` when it is starting or running.
	pub(crate) fn acquire(slot: &'a Mutex<ProcessSlot>) -> Option<Self> {
		static NEXT_TICKET: AtomicU64 = AtomicU64::new(1);

		let mut guard = slot.lock();
		if !guard.is_idle() {
			return None;
		}
		let ticket = NEXT_TICKET.fetch_add(1, Ordering::Relaxed);
		*guard = ProcessSlot::Starting(ticket);
		Some(Self {
			slot,
			ticket,
			armed: true,
		})
	}

	/// Installs `process` if the reservation still holds; otherwise hands it back.
	pub(crate) fn complete(mut self, process: ManagedProcess) -> std::result::Result<(), ManagedProcess> {
		self.armed = false;
		let mut guard = self.slot.lock();
		if guard.is_starting(self.ticket) {
			*guard = ProcessSlot::Running(process);
			Ok(())
		} else {
			Err(process)
		}
	}
}

impl Drop for StartReservation<'_> {
	fn drop(&mut self) {
		if !self.armed {
			return;
		}
		let mut guard = self.slot.lock();
		if guard.is_starting(self.ticket) {
			*guard = ProcessSlot::Idle;
		}
	}
}

async fn supervise(program: String, mut child: Child, kill: oneshot::Receiver<()>) {
	tokio::select! {
		status = child.wait() => match status {
			Ok(status) => info!(target = "gw.process", program = %program, %status, "managed process exited"),
			Err(err) => warn!(target = "gw.process", program = %program, error = %err, "failed waiting on managed process"),
		},
		_ = kill => match child.kill().await {
			Ok(()) => debug!(target = "gw.process", program = %program, "managed process terminated"),
			Err(err) => warn!(target = "gw.process", program = %program, error = %err, "failed to terminate managed process"),
		},
	}
}

async fn log_lines<R: AsyncRead + Unpin>(program: String, stream: &'static str, reader: R) {
	let mut lines = BufReader::new(reader).lines();
	while let Ok(Some(line)) = lines.next_line().await {
		debug!(target = "gw.process", program = %program, stream, "{line}");
	}
}

#[cfg(all(test, unix))]
mod tests {
	use super::*;

	#[tokio::test]
	async fn survives_grace_window() {
		let spec = ProcessSpec::new("sleep", ["5"]);
		let mut process = ManagedProcess::spawn(&spec, Duration::from_millis(50)).await.unwrap();
		assert!(process.pid().is_some());
		process.terminate();
		process.terminate();
	}

	#[tokio::test]
	async fn early_exit_is_a_start_failure() {
		let spec = ProcessSpec::new("sh", ["-c", "exit 3"]);
		let err = ManagedProcess::spawn(&spec, Duration::from_millis(500)).await.unwrap_err();
		assert!(matches!(err, GatewayError::ExitedEarly { .. }), "got {err}");
	}

	#[test]
	fn reservation_is_exclusive_and_released_on_drop() {
		let slot = Mutex::new(ProcessSlot::Idle);

		let first = StartReservation::acquire(&slot).unwrap();
		assert!(StartReservation::acquire(&slot).is_none());
		drop(first);

		assert!(slot.lock().is_idle());
		assert!(StartReservation::acquire(&slot).is_some());
	}

	#[test]
	fn stale_reservation_leaves_a_newer_one_alone() {
		let slot = Mutex::new(ProcessSlot::Idle);

		let stale = StartReservation::acquire(&slot).unwrap();
		*slot.lock() = ProcessSlot::Idle;
		let fresh = StartReservation::acquire(&slot).unwrap();
		drop(stale);

		assert!(slot.lock().is_starting(fresh.ticket));
	}

	#[tokio::test]
	async fn missing_executable_fails_to_spawn() {
		let spec = ProcessSpec::new("/definitely/missing/proxy", Vec::<String>::new());
		let err = ManagedProcess::spawn(&spec, Duration::from_millis(50)).await.unwrap_err();
		assert!(matches!(err, GatewayError::Spawn { .. }));
	}
}
