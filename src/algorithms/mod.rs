pub mod common;
pub mod mass;
pub mod mpdist;
pub mod stump;
