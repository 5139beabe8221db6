// lib/src/connectors/mod.rs

pub mod his;
pub mod mantys;

pub use his::HisClient;
pub use mantys::MantysClient;
