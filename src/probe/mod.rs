//! The resilient observation and interaction engine.
//!
//! Every operation takes the view provider as an explicit argument — there is
//! no ambient driver singleton — and no handle outlives one logical step.
//! Failures local to one candidate or attempt are absorbed and converted into
//! "try the next one"; only exhaustion of a retry budget or a wait deadline
//! becomes caller-visible.

pub mod click;
pub mod context;
pub mod locate;
pub mod observe;
pub mod read;

pub use click::{click_first_available, ClickPolicy};
pub use context::{is_excluded_context, Exclusion};
pub use locate::{find_first_visible, wait_present, FallbackPolicy};
pub use observe::{observe_change, observe_signal_change, ObservePolicy, Outcome};
pub use read::{read_signal, read_signal_now, ReadSpec, SignalSource};

use crate::view::ViewError;
use std::time::Duration;
use thiserror::Error;

/// Engine-level failures. `Stale` and `Intercepted` never appear here; the
/// retry boundaries absorb them and only their exhaustion surfaces.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Every interaction attempt failed transiently and the budget ran out.
    #[error("all {attempts} interaction attempts exhausted")]
    AllAttemptsExhausted { attempts: u32 },
    /// A wait deadline elapsed with nothing to show for it.
    #[error("probe wait timed out after {0:?}")]
    Timeout(Duration),
    /// A non-transient view failure.
    #[error(transparent)]
    View(#[from] ViewError),
}
