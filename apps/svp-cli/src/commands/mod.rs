pub mod audit;
pub mod batch;
pub mod catalog;
pub mod log;
