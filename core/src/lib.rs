//! lgd-core: the credit-exposure reporting pipeline.
//!
//! Layers, bottom-up:
//!   - `temporal`: date patterns and date arithmetic on textual dates
//!   - `tabular`, `position`: rows in, typed position records, rows out
//!   - `reconciliation`, `classification`, `aggregation`: the three
//!     record-level transforms
//!   - `*_step`, `pipeline`: reporting steps and the engine that runs them

pub mod aggregation;
pub mod cicli_preview_step;
pub mod classification;
pub mod config;
pub mod error;
pub mod event;
pub mod frapp_puma_step;
pub mod pipeline;
pub mod position;
pub mod quad_fposi_step;
pub mod racc_inc_step;
pub mod reconciliation;
pub mod step;
pub mod tabular;
pub mod temporal;
pub mod types;

pub use error::{LgdError, LgdResult};
