pub mod correlation;
pub mod resource;
pub mod runtime_config;
pub mod sampler;
pub mod stream;
pub mod trace;
pub mod utils;
pub mod writer;
