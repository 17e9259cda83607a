pub mod json;
pub mod scan;
pub mod tracing_config;
