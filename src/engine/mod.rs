pub mod evaluator;
pub mod events;
pub mod sequencer;
pub mod step;
pub mod test_engine;

pub use events::{EventSender, GradeEvent};
pub use sequencer::{ActivitySequencer, SequencerState};
pub use step::{Phase, Step};
pub use test_engine::{ExecContext, TestEngine};
