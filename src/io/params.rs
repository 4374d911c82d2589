//! Persistence of unwrap parameters.
//!
//! Parameters are stored as a flat JSON object with the four
//! [`UnwrapParams`] fields, so a file written by `unfold optimize
//! --save-params` can be passed back to `unfold unwrap --params`.
//!
//! ```json
//! {
//!   "angle_threshold": 30.0,
//!   "min_island_faces": 10,
//!   "pack_islands": true,
//!   "island_margin": 0.02
//! }
//! ```

use std::fs;
use std::io::Write;
use std::path::Path;

use tracing::debug;

use super::write_atomic;
use crate::algo::unwrap::UnwrapParams;
use crate::error::Result;

/// Write parameters as pretty-printed JSON.
pub fn save_params<P: AsRef<Path>>(params: &UnwrapParams, path: P) -> Result<()> {
    let path = path.as_ref();
    write_atomic(path, |w| {
        serde_json::to_writer_pretty(&mut *w, params)?;
        writeln!(w)?;
        Ok(())
    })?;
    debug!(path = %path.display(), "saved parameters");
    Ok(())
}

/// Read parameters back.
///
/// Missing fields take their default values. The result is validated, so an
/// edited file with an out-of-range value is rejected here.
pub fn load_params<P: AsRef<Path>>(path: P) -> Result<UnwrapParams> {
    let text = fs::read_to_string(path)?;
    let params: UnwrapParams = serde_json::from_str(&text)?;
    params.validate()?;
    Ok(params)
}
