use std::fmt::Debug;
use thiserror::Error;

use crate::renderer::shader::Stage;

#[derive(Debug, Error)]
pub enum RendererError {
    #[error("no graphics adapter available")]
    NoAdapter,

    #[error("no queue family supports both graphics and presentation")]
    NoQueueFamily,

    #[error("could not compile {stage} shader:\n{log}")]
    ShaderCompile { stage: Stage, log: String },

    #[error("{stage} shader produced invalid SPIR-V: {reason}")]
    Spirv { stage: Stage, reason: String },

    #[error("could not create {stage} shader module: {reason}")]
    ShaderModule { stage: Stage, reason: String },

    #[error("could not link program: {0}")]
    Link(String),

    #[error("no CPU-visible memory type accepts the buffer")]
    NoUploadMemory,

    #[error("{action} failed: {reason}")]
    Gpu { action: &'static str, reason: String },
}

/// Wraps a backend failure together with the action that produced it.
///
/// ```ignore
/// device.create_semaphore().map_err(gpu("create semaphore"))?;
/// ```
pub fn gpu<E: Debug>(action: &'static str) -> impl FnOnce(E) -> RendererError {
    move |err| RendererError::Gpu {
        action,
        reason: format!("{:?}", err),
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}={value:?} is not a valid number")]
    NotANumber { key: String, value: String },

    #[error("{key} is not valid unicode")]
    NotUnicode { key: String },

    #[error("{key} must be greater than zero")]
    Zero { key: String },
}
