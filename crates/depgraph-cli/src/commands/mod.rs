pub mod restore;
pub mod spec;
pub mod version;

use depgraph_core::restore::Solution;
use miette::{IntoDiagnostic, Result};
use std::path::Path;

/// Load the solution at `path`, or the nearest one above `cwd`.
pub fn load_solution(cwd: &Path, path: Option<&Path>) -> Result<Solution> {
    match path {
        Some(path) => Solution::load(&cwd.join(path)),
        None => Solution::discover(cwd),
    }
    .into_diagnostic()
}
