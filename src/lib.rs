pub mod analysis;
pub mod compare;
pub mod config;
pub mod fetch;
pub mod report;
pub mod store;
pub mod transform;
