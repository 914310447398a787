pub mod timeseries;

pub use timeseries::{TimeSeries, check_alignment};
