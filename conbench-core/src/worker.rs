//! Worker Process Entry Point
//!
//! The worker side of the process-pool strategy. A worker announces itself
//! with `Hello`, then executes one `Run` command at a time and answers each
//! with exactly one `TaskComplete` or `TaskFailed`.
//!
//! On Unix, uses the fd pair named by `CONBENCH_IPC_FD` (normally 3/4) and
//! installs a SIGTERM handler for graceful shutdown. Elsewhere, falls back to
//! stdin/stdout and skips signal handling.

use crate::error::panic_message;
use crate::measure::LatencyRecorder;
use crate::workload::WorkUnit;
use conbench_ipc::{
    FailureKind, FrameError, FrameReader, FrameWriter, IPC_FD_ENV, SupervisorCommand, WorkerInfo,
    WorkerMessage, WorkloadSpec,
};
use std::io::{Read, Write};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(unix)]
use std::os::unix::io::FromRawFd;

/// Set by the SIGTERM handler
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::Relaxed)
}

/// The handler only stores to an atomic, which is async-signal-safe.
#[cfg(unix)]
fn install_sigterm_handler() {
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = sigterm_handler as *const () as usize;
        sa.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut sa.sa_mask);
        libc::sigaction(libc::SIGTERM, &sa, std::ptr::null_mut());
    }
}

#[cfg(unix)]
extern "C" fn sigterm_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::Relaxed);
}

#[cfg(not(unix))]
fn install_sigterm_handler() {}

enum IpcTransport {
    #[cfg(unix)]
    Fds { read_fd: i32, write_fd: i32 },
    Stdio,
}

fn parse_fd_pair(value: &str) -> Option<(i32, i32)> {
    let (r, w) = value.split_once(',')?;
    Some((r.trim().parse().ok()?, w.trim().parse().ok()?))
}

fn detect_transport() -> IpcTransport {
    #[cfg(unix)]
    if let Ok(val) = std::env::var(IPC_FD_ENV) {
        if let Some((read_fd, write_fd)) = parse_fd_pair(&val) {
            return IpcTransport::Fds { read_fd, write_fd };
        }
        eprintln!(
            "conbench: warning: invalid {IPC_FD_ENV}={val:?} (expected <read_fd>,<write_fd>), falling back to stdio"
        );
    }
    IpcTransport::Stdio
}

/// Execute one task and build the reply for it.
///
/// Panics in the workload body are caught and reported as
/// [`FailureKind::Panic`].
pub fn execute_task(task_id: u64, workload: &WorkloadSpec) -> WorkerMessage {
    let result = catch_unwind(AssertUnwindSafe(|| {
        LatencyRecorder::record(|| workload.run())
    }));

    match result {
        Ok((Ok(value), timing)) => WorkerMessage::TaskComplete {
            task_id,
            value,
            duration_nanos: u64::try_from(timing.duration().as_nanos()).unwrap_or(u64::MAX),
        },
        Ok((Err(err), _)) => WorkerMessage::TaskFailed {
            task_id,
            kind: FailureKind::Error,
            message: err.to_string(),
        },
        Err(panic) => WorkerMessage::TaskFailed {
            task_id,
            kind: FailureKind::Panic,
            message: panic_message(panic.as_ref()),
        },
    }
}

/// Worker main loop
pub struct WorkerMain {
    reader: FrameReader<Box<dyn Read>>,
    writer: FrameWriter<Box<dyn Write>>,
}

impl WorkerMain {
    /// Connect to the supervisor over the inherited fd pair, or stdin/stdout
    pub fn new() -> Self {
        match detect_transport() {
            #[cfg(unix)]
            IpcTransport::Fds { read_fd, write_fd } => {
                // SAFETY: the supervisor dup2'd both pipe ends onto these fds
                // before exec and nothing else in this process owns them.
                let read_file = unsafe { std::fs::File::from_raw_fd(read_fd) };
                let write_file = unsafe { std::fs::File::from_raw_fd(write_fd) };
                Self::with_io(Box::new(read_file), Box::new(write_file))
            }
            IpcTransport::Stdio => {
                Self::with_io(Box::new(std::io::stdin()), Box::new(std::io::stdout()))
            }
        }
    }

    /// Run the protocol over arbitrary streams
    pub fn with_io(reader: Box<dyn Read>, writer: Box<dyn Write>) -> Self {
        Self {
            reader: FrameReader::new(reader),
            writer: FrameWriter::new(writer),
        }
    }

    /// Serve commands until `Shutdown`, SIGTERM, or the supervisor closes
    /// the pipe
    pub fn run(&mut self) -> Result<(), FrameError> {
        install_sigterm_handler();

        self.writer
            .send(&WorkerMessage::Hello(WorkerInfo::current()))?;

        while !shutdown_requested() {
            let command: SupervisorCommand = match self.reader.recv() {
                Ok(command) => command,
                Err(FrameError::EndOfStream) => break,
                Err(e) => return Err(e),
            };

            match command {
                SupervisorCommand::Run { task_id, workload } => {
                    let reply = execute_task(task_id, &workload);
                    self.writer.send(&reply)?;
                }
                SupervisorCommand::Shutdown => break,
            }
        }

        Ok(())
    }
}

impl Default for WorkerMain {
    fn default() -> Self {
        Self::new()
    }
}
