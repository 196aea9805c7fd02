#![warn(missing_docs)]
//! Conbench IPC Protocol
//!
//! Wire types and framing for the process-pool strategy. The coordinating
//! process (supervisor) sends one `Run` command per task to a worker process
//! and waits for the matching `TaskComplete`/`TaskFailed` reply. Only plain
//! data crosses the boundary: the workload description going out, a scalar
//! result and a self-measured duration coming back.

mod framing;
mod messages;

pub use framing::{FrameError, FrameReader, FrameWriter, HEADER_LEN, MAX_FRAME_SIZE};
pub use messages::{FailureKind, SupervisorCommand, WorkerInfo, WorkerMessage, WorkloadSpec};

/// Protocol version exchanged in the worker's `Hello`
pub const PROTOCOL_VERSION: u32 = 1;

/// Command-line flag that switches a conbench binary into worker mode
pub const WORKER_FLAG: &str = "--conbench-worker";

/// Environment variable carrying the inherited `<read_fd>,<write_fd>` pair
pub const IPC_FD_ENV: &str = "CONBENCH_IPC_FD";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_flag_is_long_option() {
        assert!(WORKER_FLAG.starts_with("--"));
    }

    #[test]
    fn test_worker_info_reports_current_protocol() {
        let info = WorkerInfo::current();
        assert_eq!(info.protocol_version, PROTOCOL_VERSION);
        assert_eq!(info.pid, std::process::id());
        assert!(info.cpu_count >= 1);
    }
}
