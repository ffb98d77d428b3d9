#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::return_self_not_must_use)]

pub mod config;
pub mod error;
pub mod paths;
pub mod restore;
pub mod version;

pub use config::Config;
pub use error::Error;
pub use restore::{
    build_spec, restore_async, CacheContext, GraphSpec, ProjectAdapter, ProjectMetadata,
    ProviderCache, RestoreError, RestoreSummary,
};
pub use version::VERSION;
