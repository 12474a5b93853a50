// prog_core/src/estimation/filters/mod.rs

pub mod kf;
pub mod pf;
pub mod ukf;
