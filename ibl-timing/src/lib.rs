pub mod clock;
pub mod deferred;
pub mod timer;

pub use clock::{format_task_time, SessionClock};
pub use deferred::{DeferredId, DeferredQueue};
pub use timer::{CalibrationStats, HighPrecisionTimer, ManualTimer, Timer};
