//! External execution: synchronous shell/process runners and the
//! fire-and-forget async queue drained on the host's frame tick.

mod queue;
mod run;

pub use queue::{AsyncExecFinished, ExecKind, ExecQueue, INVALID_EXEC_ID};
pub use run::{SPAWN_FAILURE_EXIT, system_command, system_run};
