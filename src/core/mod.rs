// Core modules: boundary values, errors, the gateway and its engine adapters.
pub mod conf;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod logs;
pub mod native;
pub mod process;
pub mod recording;
pub mod request;
