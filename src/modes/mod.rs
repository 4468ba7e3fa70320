pub mod inspect;
pub mod train;

pub use inspect::{ExtractorReport, InspectMode};
pub use train::{TrainConfig, TrainMode};
