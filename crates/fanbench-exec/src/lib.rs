mod error;
pub use error::{ExecError, ExecResult};

mod spec;
pub use spec::{CommandSpec, OutputMode};

pub mod proc;
pub use proc::{ProcHandle, ProcSupervisor};

mod util;
