pub mod gb;
mod utils;

pub use gb::motherboard::Motherboard;
pub use gb::{EmulatorConfig, GBError, GBResult};
