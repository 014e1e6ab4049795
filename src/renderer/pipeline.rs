use gfx_hal::{format as f, pass::Subpass, prelude::*, pso, Backend};
use std::mem::{self, ManuallyDrop};
use std::ptr;

use super::shader::{self, Stage};
use crate::error::{gpu, RendererError};

const ENTRY_NAME: &str = "main";

/// The linked program: both shader stages plus fixed-function state.
pub struct Pipeline<'a, B: Backend> {
    device: &'a B::Device,
    pub pipeline: ManuallyDrop<B::GraphicsPipeline>,
    pub pipeline_layout: ManuallyDrop<B::PipelineLayout>,
}

impl<'a, B: Backend> Pipeline<'a, B> {
    pub fn new<T>(
        device: &'a B::Device,
        vertex_source: &str,
        fragment_source: &str,
        render_pass: &B::RenderPass,
        set_layout: &B::DescriptorSetLayout,
    ) -> Result<Self, RendererError> {
        let vs_spirv = shader::compile(Stage::Vertex, vertex_source)?;
        let fs_spirv = shader::compile(Stage::Fragment, fragment_source)?;

        let pipeline_layout = unsafe { device.create_pipeline_layout(Some(set_layout), &[]) }
            .map_err(gpu("create pipeline layout"))?;

        let linked = Self::load_module(device, Stage::Vertex, &vs_spirv).and_then(|vs_module| {
            let linked = Self::load_module(device, Stage::Fragment, &fs_spirv).and_then(
                |fs_module| {
                    let linked =
                        Self::link::<T>(device, &vs_module, &fs_module, render_pass, &pipeline_layout);
                    unsafe { device.destroy_shader_module(fs_module) };
                    linked
                },
            );
            unsafe { device.destroy_shader_module(vs_module) };
            linked
        });

        match linked {
            Ok(pipeline) => Ok(Pipeline {
                device,
                pipeline: ManuallyDrop::new(pipeline),
                pipeline_layout: ManuallyDrop::new(pipeline_layout),
            }),
            Err(err) => {
                unsafe { device.destroy_pipeline_layout(pipeline_layout) };
                Err(err)
            }
        }
    }

    fn link<T>(
        device: &B::Device,
        vs_module: &B::ShaderModule,
        fs_module: &B::ShaderModule,
        render_pass: &B::RenderPass,
        pipeline_layout: &B::PipelineLayout,
    ) -> Result<B::GraphicsPipeline, RendererError> {
        let shader_entries = pso::GraphicsShaderSet {
            vertex: pso::EntryPoint {
                entry: ENTRY_NAME,
                module: vs_module,
                specialization: pso::Specialization::default(),
            },
            hull: None,
            domain: None,
            geometry: None,
            fragment: Some(pso::EntryPoint {
                entry: ENTRY_NAME,
                module: fs_module,
                specialization: pso::Specialization::default(),
            }),
        };

        let subpass = Subpass {
            index: 0,
            main_pass: render_pass,
        };

        let mut pipeline_desc = pso::GraphicsPipelineDesc::new(
            shader_entries,
            pso::Primitive::TriangleStrip,
            pso::Rasterizer::FILL,
            pipeline_layout,
            subpass,
        );
        pipeline_desc.blender.targets.push(pso::ColorBlendDesc {
            mask: pso::ColorMask::ALL,
            blend: None,
        });

        pipeline_desc.vertex_buffers.push(pso::VertexBufferDesc {
            binding: 0,
            stride: mem::size_of::<T>() as u32,
            rate: pso::VertexInputRate::Vertex,
        });

        // vPosition
        pipeline_desc.attributes.push(pso::AttributeDesc {
            location: 0,
            binding: 0,
            element: pso::Element {
                format: f::Format::Rg32Sfloat,
                offset: 0,
            },
        });

        unsafe { device.create_graphics_pipeline(&pipeline_desc, None) }.map_err(|err| {
            log::error!("could not link program: {:?}", err);
            RendererError::Link(format!("{:?}", err))
        })
    }

    fn load_module(
        device: &B::Device,
        stage: Stage,
        spirv: &[u32],
    ) -> Result<B::ShaderModule, RendererError> {
        unsafe { device.create_shader_module(spirv) }.map_err(|err| {
            log::error!("could not load {} shader module: {:?}", stage, err);
            RendererError::ShaderModule {
                stage,
                reason: format!("{:?}", err),
            }
        })
    }
}

impl<'a, B: Backend> Drop for Pipeline<'a, B> {
    fn drop(&mut self) {
        unsafe {
            self.device
                .destroy_graphics_pipeline(ManuallyDrop::into_inner(ptr::read(&self.pipeline)));
            self.device
                .destroy_pipeline_layout(ManuallyDrop::into_inner(ptr::read(
                    &self.pipeline_layout,
                )));
        }
    }
}
