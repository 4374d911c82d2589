//! Batch processing.
//!
//! Runs the unwrap pipeline over many files on a fixed-size worker pool.
//! Jobs are independent: a file that fails to load, unwrap or save is
//! recorded as failed and the remaining files carry on. The only shared state
//! is the job queue and the completed-count, both behind a mutex inside
//! [`WorkerPool`]; progress reaches the caller as completion events on the
//! calling thread.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use unfold::algo::progress::Progress;
//! use unfold::algo::unwrap::UnwrapParams;
//! use unfold::batch::{collect_inputs, process_batch, BatchOptions};
//!
//! let inputs = collect_inputs("meshes/").unwrap();
//! let report = process_batch(
//!     &inputs,
//!     Path::new("unwrapped/"),
//!     &UnwrapParams::default(),
//!     &BatchOptions::default().with_threads(8),
//!     &Progress::new(|done, total, file| println!("[{}/{}] {}", done, total, file)),
//! )
//! .unwrap();
//!
//! println!("{} of {} succeeded", report.summary.succeeded, report.summary.total);
//! report.save_report("report.json").unwrap();
//! ```

mod pool;
mod processor;
mod report;

pub use pool::{CancelToken, Completion, JobResult, WorkerPool};
pub use processor::{collect_inputs, plan_outputs, process_batch, BatchOptions};
pub use report::{BatchReport, BatchSummary, FileResult, FileStatus};
