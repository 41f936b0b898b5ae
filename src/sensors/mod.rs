//! Sensor module - reading types, the synthetic reading source and its
//! emission loop

mod emitter;
mod source;
mod traits;

pub use emitter::Emitter;
pub use source::{ReadingSource, ThrottleState};
pub use traits::{truncate_micros, AnomalyRecord, Reading, SensorType};
