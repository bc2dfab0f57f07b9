pub mod allocation;
pub mod instrument;
pub mod portfolio;
