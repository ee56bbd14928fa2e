pub mod chain;
pub mod stages;
