//! Link lifecycle: the orchestrator task, its published state and the
//! handles callers use to observe it.

mod handle;
pub mod orchestrator;
pub mod state;

pub use handle::LinkHandle;
pub use orchestrator::{Orchestrator, RunExit};
pub use state::{ConnectionState, LinkSnapshot, LinkStats, LinkStatsSnapshot};
