use gfx_hal::{buffer as b, prelude::*, pso, Backend};
use std::iter;
use std::mem::ManuallyDrop;
use std::ptr;

use crate::error::{gpu, RendererError};

const FILL_COLOR_BINDING: pso::DescriptorBinding = 0;

const UNIFORM_BUFFER: pso::DescriptorType = pso::DescriptorType::Buffer {
    ty: pso::BufferDescriptorType::Uniform,
    format: pso::BufferDescriptorFormat::Structured {
        dynamic_offset: false,
    },
};

/// Single set exposing the fill color uniform to the fragment stage.
pub struct DescriptorSet<'a, B: Backend> {
    device: &'a B::Device,
    pub set_layout: ManuallyDrop<B::DescriptorSetLayout>,
    pool: ManuallyDrop<B::DescriptorPool>,
    pub set: B::DescriptorSet,
}

impl<'a, B: Backend> DescriptorSet<'a, B> {
    pub fn new(device: &'a B::Device, fill_color: &B::Buffer) -> Result<Self, RendererError> {
        let set_layout = Self::create_descriptor_set_layout(device)?;
        let mut pool = match Self::create_descriptor_pool(device) {
            Ok(pool) => pool,
            Err(err) => {
                unsafe { device.destroy_descriptor_set_layout(set_layout) };
                return Err(err);
            }
        };

        let set = match unsafe { pool.allocate_set(&set_layout) } {
            Ok(set) => set,
            Err(err) => {
                unsafe {
                    device.destroy_descriptor_pool(pool);
                    device.destroy_descriptor_set_layout(set_layout);
                }
                return Err(gpu("allocate descriptor set")(err));
            }
        };

        unsafe {
            device.write_descriptor_sets(iter::once(pso::DescriptorSetWrite {
                set: &set,
                binding: FILL_COLOR_BINDING,
                array_offset: 0,
                descriptors: iter::once(pso::Descriptor::Buffer(fill_color, b::SubRange::WHOLE)),
            }));
        }

        Ok(DescriptorSet {
            set_layout: ManuallyDrop::new(set_layout),
            pool: ManuallyDrop::new(pool),
            set,
            device,
        })
    }

    fn create_descriptor_set_layout(
        device: &B::Device,
    ) -> Result<B::DescriptorSetLayout, RendererError> {
        unsafe {
            device.create_descriptor_set_layout(
                &[pso::DescriptorSetLayoutBinding {
                    binding: FILL_COLOR_BINDING,
                    ty: UNIFORM_BUFFER,
                    count: 1,
                    stage_flags: pso::ShaderStageFlags::FRAGMENT,
                    immutable_samplers: false,
                }],
                &[],
            )
        }
        .map_err(gpu("create descriptor set layout"))
    }

    fn create_descriptor_pool(device: &B::Device) -> Result<B::DescriptorPool, RendererError> {
        unsafe {
            device.create_descriptor_pool(
                1,
                &[pso::DescriptorRangeDesc {
                    ty: UNIFORM_BUFFER,
                    count: 1,
                }],
                pso::DescriptorPoolCreateFlags::empty(),
            )
        }
        .map_err(gpu("create descriptor pool"))
    }
}

impl<'a, B: Backend> Drop for DescriptorSet<'a, B> {
    fn drop(&mut self) {
        unsafe {
            self.device
                .destroy_descriptor_pool(ManuallyDrop::into_inner(ptr::read(&self.pool)));
            self.device
                .destroy_descriptor_set_layout(ManuallyDrop::into_inner(ptr::read(
                    &self.set_layout,
                )));
        }
    }
}
