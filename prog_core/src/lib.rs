// prog_core/src/lib.rs

// This file defines the public modules of the library.
pub mod error;
pub mod estimation;
pub mod metrics;
pub mod models;
pub mod prediction;
pub mod prelude;
pub mod types;
pub mod uncertain_data;
pub mod utils;
