//! Progress reporting for long-running operations.
//!
//! A simple callback mechanism the unwrap pipeline and the optimizer use to
//! report their progress to callers.
//!
//! # Example
//!
//! ```
//! use unfold::algo::progress::Progress;
//! use unfold::algo::unwrap::{unwrap_with, UnwrapParams};
//! use unfold::algo::parameterize::SolverOptions;
//! use unfold::fixtures;
//!
//! let progress = Progress::new(|current, total, message| {
//!     println!("[{}/{}] {}", current, total, message);
//! });
//!
//! let sphere = fixtures::uv_sphere(8, 6, 1.0);
//! let result = unwrap_with(&sphere, &UnwrapParams::default(), &SolverOptions::default(), &progress);
//! assert!(result.is_ok());
//! ```

/// A progress callback that receives updates during long-running operations.
///
/// The callback receives:
/// - `current`: Steps completed so far
/// - `total`: Total number of steps
/// - `message`: Description of the current operation
pub struct Progress {
    callback: Box<dyn Fn(usize, usize, &str) + Send + Sync>,
}

impl Progress {
    /// Create a new progress reporter with the given callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(usize, usize, &str) + Send + Sync + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }

    /// Report progress.
    #[inline]
    pub fn report(&self, current: usize, total: usize, message: &str) {
        (self.callback)(current, total, message);
    }

    /// Create a no-op progress reporter that discards all updates.
    pub fn none() -> Self {
        Self::new(|_, _, _| {})
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::none()
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress").finish_non_exhaustive()
    }
}
