//! Locating container scopes in the cgroup v2 hierarchy and reading their interface files.
//!
//! # Key Components
//!
//! - [`find_scope`]: resolves a container identifier to a `*.scope` directory.
//! - [`CgroupHandle`]: a resolved scope; reads single-value and keyed interface files.
//! - [`detect_cgroup2_mount`]: finds the cgroup v2 mount point in a `mountinfo` file.
//!
//! # Supported Files
//!
//! Any numeric interface file can be read. The exporter reads:
//!
//! - `memory.current`, `memory.peak`, `memory.low`, `memory.high`, `memory.max`
//! - `memory.stat` and `cpu.stat` (keyed)
//! - `pids.current`, `pids.max`, `pids.peak`
//!
//! # Platform Requirements
//!
//! - Linux with the unified cgroup v2 hierarchy.
//! - Read access to the cgroup mount (usually `/sys/fs/cgroup`). Nothing is ever written.
mod error;
mod handle;
mod locator;
mod mount;
pub mod parser;

pub use error::{Error, Result};
pub use handle::CgroupHandle;
pub use locator::find_scope;
pub use mount::detect_cgroup2_mount;
