//! Hardware seams.
//!
//! - `capabilities` - traits for every external system the core drives
//! - `mock` - simulated implementations that record their calls

pub mod capabilities;
pub mod mock;
