pub mod error;
pub mod matrix_profile;
pub mod rolling_stats;
pub mod tracker;
