//! Supervision core for an external archive password search worker.
//!
//! ```text
//! JobDescriptor
//!     |
//!     v
//! Launcher --spawn--> WorkerProcess + stdout/stderr
//!     |                    |
//!     |                    +--> router (one reader task per channel)
//!     |                               |
//!     |                               v
//!     |                         event queue --> Notifier
//!     v
//! monitor (polls exit) --> classify --> Notifier::on_outcome --> idle
//!     ^
//!     |
//! shutdown::stop (flag file, grace, SIGTERM, SIGKILL)
//! ```

pub mod config;
pub mod job;
pub mod launcher;
pub mod monitor;
pub mod notify;
pub mod outcome;
pub mod router;
pub mod run;
pub mod shutdown;
pub mod skip_list;
pub mod worker;

pub use config::SupervisorConfig;
pub use job::{JobDescriptor, JobError, SearchOrder, SearchSpace, SkipList};
pub use launcher::{LaunchError, Launcher, Run};
pub use notify::{Channel, ChannelNotifier, Event, Notification, Notifier};
pub use outcome::{Outcome, classify};
pub use run::{RunHandle, RunSlot, RunState};
pub use shutdown::{Escalation, StopReport, StopSignal};
pub use skip_list::{ClearResult, SkipListError};
pub use worker::{CommandSpawner, SpawnedWorker, Spawner, WorkerCommand, WorkerProcess};
