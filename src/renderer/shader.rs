use gfx_hal::pso;
use std::fmt;
use std::io::{Cursor, Read};

use crate::error::RendererError;

pub const VERTEX_SOURCE: &str = include_str!("../data/triangle.vert");
pub const FRAGMENT_SOURCE: &str = include_str!("../data/triangle.frag");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Vertex,
    Fragment,
}

impl Stage {
    fn shader_type(self) -> glsl_to_spirv::ShaderType {
        match self {
            Stage::Vertex => glsl_to_spirv::ShaderType::Vertex,
            Stage::Fragment => glsl_to_spirv::ShaderType::Fragment,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Vertex => f.write_str("vertex"),
            Stage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Compiles GLSL source for `stage` into SPIR-V words.
pub fn compile(stage: Stage, source: &str) -> Result<Vec<u32>, RendererError> {
    let mut file = glsl_to_spirv::compile(source, stage.shader_type()).map_err(|message| {
        log::error!("could not compile {} shader:", stage);
        log::error!("{}", message);
        RendererError::ShaderCompile {
            stage,
            log: message,
        }
    })?;

    let mut bytes = vec![];
    file.read_to_end(&mut bytes)
        .map_err(|err| RendererError::Spirv {
            stage,
            reason: err.to_string(),
        })?;

    let spirv = pso::read_spirv(Cursor::new(&bytes[..])).map_err(|err| RendererError::Spirv {
        stage,
        reason: err.to_string(),
    })?;
    log::debug!("compiled {} shader: {} words", stage, spirv.len());
    Ok(spirv)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    #[test]
    fn embedded_shaders_compile() {
        for &(stage, source) in &[
            (Stage::Vertex, VERTEX_SOURCE),
            (Stage::Fragment, FRAGMENT_SOURCE),
        ] {
            let spirv = compile(stage, source).unwrap();
            assert_eq!(spirv[0], SPIRV_MAGIC, "{} stage", stage);
        }
    }

    #[test]
    fn shaders_declare_the_expected_interface() {
        assert!(VERTEX_SOURCE.contains("vPosition"));
        assert!(FRAGMENT_SOURCE.contains("uColor"));
    }

    #[test]
    fn broken_source_reports_its_stage() {
        let err = compile(Stage::Fragment, "#version 450\nvoid main() { nope }").unwrap_err();
        match err {
            RendererError::ShaderCompile { stage, ref log } => {
                assert_eq!(stage, Stage::Fragment);
                assert!(!log.is_empty());
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(err.to_string().starts_with("could not compile fragment shader"));
    }
}
