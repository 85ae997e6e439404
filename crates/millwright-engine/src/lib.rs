//! Virtual clock, event loop and the preemptible/priority resource
//! primitives that every other crate in the workspace builds on.

pub mod cause;
pub mod clock;
pub mod error;
pub mod event;
pub mod mutex;
pub mod process;
pub mod semaphore;
pub mod store;

pub use cause::Cause;
pub use clock::{Clock, RunMode};
pub use error::{EngineError, Result};
pub use event::EdgeEvent;
pub use mutex::{MutexGuard, PreemptiveMutex};
pub use process::{spawn_process, InterruptReceiver, InterruptSender, ProcessHandle, ProcessId};
pub use semaphore::{PriorityResource, ResourceGuard};
pub use store::PriorityStore;
