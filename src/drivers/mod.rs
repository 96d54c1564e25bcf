// src/drivers/mod.rs
pub mod bsmp;
pub mod buffer;
pub mod error;
pub mod plot;
pub mod sampler;
pub mod scpi;
pub mod session;
pub mod sim;
pub mod source;
pub mod stats;
pub mod task;

pub use buffer::SampleSeries;
pub use error::{BenchError, LinkError};
pub use plot::{save_leakage_plot, PlotStyle};
pub use sampler::{AcquisitionPlan, Sampler, ThreadPacer};
pub use session::BenchSession;
pub use source::{Board, Instrument};
pub use stats::SummaryStats;
pub use task::{spawn_acquisition, CancelHandle, StopReason};
