mod attempt;
mod ids;
mod module;
mod progress;

pub use ids::{AttemptId, CourseId, FrameId, ModuleId, ParseIdError};

pub use attempt::{Attempt, AttemptError, SnapshotOutcome};
pub use module::{Module, ModuleError, RteVersion};
pub use progress::{DerivedProgress, ParseStatusError, ProgressStatus, Score};
