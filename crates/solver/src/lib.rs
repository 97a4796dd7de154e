pub mod optimize;
pub mod place;
pub mod section;
pub mod swap;

use thiserror::Error;

pub use optimize::{optimize, OptimizeConfig, OptimizeStats};
pub use place::place_sections;
pub use section::{build_sections, Section};
pub use swap::{swap_search, SwapConfig};

#[derive(Debug, Error)]
pub enum SolveError {
    #[error("no valid room/time combinations left for course {course}")]
    Infeasible { course: String },
    #[error("no valid schedule found in warmup period")]
    NoSchedule,
    #[error(transparent)]
    Persist(#[from] timetable_core::PersistError),
}
