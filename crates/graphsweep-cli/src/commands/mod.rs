pub mod analyze;
pub mod clean;
pub mod input;
pub mod snapshots;
