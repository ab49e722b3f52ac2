pub mod generator;

pub use generator::{DailyOhlc, SyntheticGenerator};
