//! Worker Process Supervisor
//!
//! Spawns process-pool workers and talks to them over a pair of pipes.
//!
//! Each worker is the current binary re-executed with the hidden
//! `--conbench-worker` flag. The command pipe lands on fd 3 in the child and
//! the reply pipe on fd 4; `CONBENCH_IPC_FD=3,4` tells the worker where to
//! look. stdout is discarded so a stray `println!` in a workload can't corrupt
//! the report.

use conbench_ipc::{
    FailureKind, FrameError, FrameReader, FrameWriter, IPC_FD_ENV, PROTOCOL_VERSION,
    SupervisorCommand, WORKER_FLAG, WorkerInfo, WorkerMessage, WorkloadSpec,
};
use std::env;
use std::os::unix::io::{FromRawFd, RawFd};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// How often a blocked read re-checks that the worker is still alive
const LIVENESS_INTERVAL: Duration = Duration::from_millis(100);

/// Grace period between SIGTERM and SIGKILL when a handle is dropped
const TERMINATE_GRACE: Duration = Duration::from_millis(50);

/// Failures talking to a worker process
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The worker process could not be started
    #[error("failed to spawn worker: {0}")]
    SpawnFailed(#[from] std::io::Error),

    /// A frame could not be written or decoded
    #[error("IPC error: {0}")]
    Ipc(#[from] FrameError),

    /// The worker died or closed its pipe
    #[error("worker crashed: {0}")]
    WorkerCrashed(String),

    /// The worker sent something other than the expected message
    #[error("worker protocol error: expected {expected}, got {got}")]
    Protocol {
        /// Message the supervisor was waiting for
        expected: String,
        /// Message that arrived instead
        got: String,
    },
}

/// What a worker reported for one task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskReply {
    /// The workload returned a value
    Complete {
        /// Scalar result
        value: f64,
        /// Duration measured inside the worker
        worker_duration: Duration,
    },
    /// The workload returned an error or panicked
    Failed {
        /// Whether the body panicked
        panicked: bool,
        /// Reason reported by the worker
        message: String,
    },
}

#[derive(Debug)]
enum PollResult {
    DataAvailable,
    Timeout,
    PipeClosed,
    Error(std::io::Error),
}

fn wait_for_data(fd: RawFd, timeout: Duration) -> PollResult {
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);

    let result = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };

    if result < 0 {
        PollResult::Error(std::io::Error::last_os_error())
    } else if result == 0 {
        PollResult::Timeout
    } else if pollfd.revents & libc::POLLIN != 0 {
        // A closing pipe may still hold a complete reply.
        PollResult::DataAvailable
    } else if pollfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
        PollResult::PipeClosed
    } else {
        PollResult::Timeout
    }
}

/// Create a pipe with close-on-exec set on both ends, returning
/// `(read_fd, write_fd)`
fn create_pipe() -> Result<(RawFd, RawFd), std::io::Error> {
    let mut fds = [0 as RawFd; 2];
    let ret = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }
    for &fd in &fds {
        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFD);
            libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC);
        }
    }
    Ok((fds[0], fds[1]))
}

/// Fails with the current OS error when a libc call returned -1
fn check(ret: libc::c_int) -> Result<libc::c_int, std::io::Error> {
    if ret == -1 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

/// Runs in the forked child: put the command pipe on fd 3 and the reply pipe
/// on fd 4, whatever numbers `pipe()` handed out in the parent.
///
/// Both ends are first moved to fds >= 5 so that neither `dup2` can clobber
/// the other, and the parent's ends are closed before anything lands on 3 or
/// 4. Every fd involved is close-on-exec except the two targets.
fn wire_child_fds(
    cmd_read: RawFd,
    msg_write: RawFd,
    cmd_write: RawFd,
    msg_read: RawFd,
) -> Result<(), std::io::Error> {
    unsafe {
        libc::close(cmd_write);
        libc::close(msg_read);

        let cmd_high = check(libc::fcntl(cmd_read, libc::F_DUPFD_CLOEXEC, 5))?;
        let msg_high = check(libc::fcntl(msg_write, libc::F_DUPFD_CLOEXEC, 5))?;
        libc::close(cmd_read);
        libc::close(msg_write);

        // dup2 clears FD_CLOEXEC on the target
        check(libc::dup2(cmd_high, 3))?;
        check(libc::dup2(msg_high, 4))?;
        libc::close(cmd_high);
        libc::close(msg_high);
    }
    Ok(())
}

fn close_fd(fd: RawFd) {
    unsafe {
        libc::close(fd);
    }
}

fn send_sigterm(pid: u32) -> Result<(), std::io::Error> {
    let ret = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if ret == -1 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// One live worker process, exclusively owned by the executor that spawned it
pub struct WorkerHandle {
    child: Child,
    reader: FrameReader<std::fs::File>,
    writer: FrameWriter<std::fs::File>,
    info: Option<WorkerInfo>,
    msg_read_fd: RawFd,
}

impl WorkerHandle {
    /// Spawn a worker from the currently running binary
    pub fn spawn() -> Result<Self, SupervisorError> {
        let binary = env::current_exe()?;
        Self::spawn_binary(&binary)
    }

    /// Spawn a worker from `binary`, which must handle the worker flag
    pub fn spawn_binary(binary: &Path) -> Result<Self, SupervisorError> {
        // command pipe: supervisor writes, worker reads on fd 3
        let (cmd_read, cmd_write) = create_pipe()?;
        // reply pipe: worker writes on fd 4, supervisor reads
        let (msg_read, msg_write) = match create_pipe() {
            Ok(fds) => fds,
            Err(e) => {
                close_fd(cmd_read);
                close_fd(cmd_write);
                return Err(SupervisorError::SpawnFailed(e));
            }
        };

        let mut command = Command::new(binary);
        command
            .arg(WORKER_FLAG)
            .env(IPC_FD_ENV, "3,4")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());

        // Only async-signal-safe calls between fork and exec.
        unsafe {
            command.pre_exec(move || wire_child_fds(cmd_read, msg_write, cmd_write, msg_read));
        }

        let child = match command.spawn() {
            Ok(c) => c,
            Err(e) => {
                close_fd(cmd_read);
                close_fd(cmd_write);
                close_fd(msg_read);
                close_fd(msg_write);
                return Err(SupervisorError::SpawnFailed(e));
            }
        };

        close_fd(cmd_read);
        close_fd(msg_write);

        // SAFETY: both fds came from pipe() above and are owned by nothing else.
        let writer_file = unsafe { std::fs::File::from_raw_fd(cmd_write) };
        let reader_file = unsafe { std::fs::File::from_raw_fd(msg_read) };

        let mut handle = Self {
            child,
            reader: FrameReader::new(reader_file),
            writer: FrameWriter::new(writer_file),
            info: None,
            msg_read_fd: msg_read,
        };

        // On failure the handle is dropped here, which terminates the child.
        let info = handle.wait_for_hello()?;
        debug!(pid = info.pid, cpus = info.cpu_count, "worker ready");
        handle.info = Some(info);
        Ok(handle)
    }

    fn wait_for_hello(&mut self) -> Result<WorkerInfo, SupervisorError> {
        match self.read_reply()? {
            WorkerMessage::Hello(info) if info.protocol_version == PROTOCOL_VERSION => Ok(info),
            WorkerMessage::Hello(info) => Err(SupervisorError::Protocol {
                expected: format!("protocol version {PROTOCOL_VERSION}"),
                got: format!("protocol version {}", info.protocol_version),
            }),
            other => Err(SupervisorError::Protocol {
                expected: "Hello".to_string(),
                got: format!("{other:?}"),
            }),
        }
    }

    /// Handshake data sent by the worker
    pub fn info(&self) -> Option<&WorkerInfo> {
        self.info.as_ref()
    }

    /// OS process id of the worker
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Send one task and block until the worker answers it
    pub fn execute(
        &mut self,
        task_id: u64,
        workload: &WorkloadSpec,
    ) -> Result<TaskReply, SupervisorError> {
        self.writer.send(&SupervisorCommand::Run {
            task_id,
            workload: *workload,
        })?;

        match self.read_reply()? {
            WorkerMessage::TaskComplete {
                task_id: id,
                value,
                duration_nanos,
            } if id == task_id => Ok(TaskReply::Complete {
                value,
                worker_duration: Duration::from_nanos(duration_nanos),
            }),
            WorkerMessage::TaskFailed {
                task_id: id,
                kind,
                message,
            } if id == task_id => Ok(TaskReply::Failed {
                panicked: kind == FailureKind::Panic,
                message,
            }),
            other => Err(SupervisorError::Protocol {
                expected: format!("reply for task {task_id}"),
                got: format!("{other:?}"),
            }),
        }
    }

    /// Block until the next reply, noticing if the worker dies meanwhile
    fn read_reply(&mut self) -> Result<WorkerMessage, SupervisorError> {
        // A partially buffered frame can only be completed by a live worker.
        if self.reader.has_buffered() {
            if !self.is_alive() {
                return Err(SupervisorError::WorkerCrashed(
                    "worker exited with a partial reply buffered".to_string(),
                ));
            }
        } else {
            loop {
                match wait_for_data(self.msg_read_fd, LIVENESS_INTERVAL) {
                    PollResult::DataAvailable => break,
                    PollResult::Timeout => {
                        if !self.is_alive() {
                            return Err(SupervisorError::WorkerCrashed(
                                "worker exited unexpectedly".to_string(),
                            ));
                        }
                    }
                    PollResult::PipeClosed => {
                        return Err(SupervisorError::WorkerCrashed(
                            "worker pipe closed unexpectedly".to_string(),
                        ));
                    }
                    PollResult::Error(e) => {
                        return Err(SupervisorError::WorkerCrashed(format!("pipe error: {e}")));
                    }
                }
            }
        }

        match self.reader.recv::<WorkerMessage>() {
            Ok(msg) => Ok(msg),
            Err(FrameError::EndOfStream) => Err(SupervisorError::WorkerCrashed(
                "worker closed its pipe".to_string(),
            )),
            Err(e) => {
                if !self.is_alive() {
                    return Err(SupervisorError::WorkerCrashed(
                        "worker crashed during read".to_string(),
                    ));
                }
                Err(SupervisorError::Ipc(e))
            }
        }
    }

    /// Ask the worker to exit and reap it
    pub fn shutdown(mut self) -> Result<(), SupervisorError> {
        self.writer.send(&SupervisorCommand::Shutdown)?;
        let status = self.child.wait()?;
        debug!(pid = self.child.id(), %status, "worker exited");
        Ok(())
    }

    /// Whether the worker process is still running
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if self.is_alive() {
            let _ = send_sigterm(self.child.id());
            std::thread::sleep(TERMINATE_GRACE);
            if self.is_alive() {
                let _ = self.child.kill();
            }
            let _ = self.child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_spawning_a_missing_binary_fails() {
        let result = WorkerHandle::spawn_binary(Path::new("/nonexistent/conbench-worker"));
        assert!(matches!(result, Err(SupervisorError::SpawnFailed(_))));
    }

    #[test]
    fn test_binary_without_worker_mode_is_a_crash() {
        // `true` exits immediately without ever sending Hello.
        let Some(binary) = which_true() else {
            return;
        };
        let result = WorkerHandle::spawn_binary(&binary);
        assert!(matches!(result, Err(SupervisorError::WorkerCrashed(_))));
    }

    fn which_true() -> Option<PathBuf> {
        ["/bin/true", "/usr/bin/true"]
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
    }
}
