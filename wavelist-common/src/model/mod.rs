//! The immutable data model shared by the parser, selector, relaxer,
//! validator, and batch coordinator (spec §3).
//!
//! Every type here is a plain data descriptor; nothing in this module
//! performs I/O. Construction goes through `TryFrom`/constructor
//! functions that enforce the invariants spec §3 and §8 require (percent
//! sums, BPM ordering, time ordering) so that a value of these types is
//! always internally consistent.

mod cache;
mod criteria;
mod daypart;
mod decision;
mod document;
mod era;
mod playlist;
mod track;
mod validation;

pub use cache::KnownTracksCache;
pub use criteria::{EraCriterion, GenreCriterion, ToleranceKnobs, TrackSelectionCriteria};
pub use daypart::{
    BpmRange, DaypartSpecification, RotationCategory, ScheduleTag, SpecialtyConstraint,
    TimeWindow,
};
pub use decision::{DecisionLogEntry, DecisionType};
pub use document::{LockDescriptor, ProgrammingDocument, ProgrammingStructure};
pub use era::EraTable;
pub use playlist::{ConstraintRelaxation, Playlist, PlaylistSpecification, RelaxedConstraintType};
pub use track::{LibraryTrack, MetadataSource, SelectedTrack, ValidationStatus};
pub use validation::{ConstraintScore, FlowQualityMetrics, ValidationResult};
