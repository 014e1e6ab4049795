use gfx_hal::{adapter::MemoryType, memory as m, prelude::*, Backend, MemoryTypeId};
use std::iter;
use std::mem::{self, ManuallyDrop};
use std::ptr;

use super::buffer::Buffer;
use crate::error::{gpu, RendererError};

/// A buffer bound to host-visible memory, filled once at creation.
pub struct Memory<'a, B: Backend> {
    pub buffer: ManuallyDrop<Buffer<'a, B>>,
    memory: ManuallyDrop<B::Memory>,
}

impl<'a, B: Backend> Memory<'a, B> {
    pub fn new<T: Copy>(
        mut buffer: Buffer<'a, B>,
        content: &[T],
        memory_types: &[MemoryType],
    ) -> Result<Self, RendererError> {
        let memory = Self::upload(&mut buffer, content, memory_types)?;
        Ok(Memory {
            buffer: ManuallyDrop::new(buffer),
            memory: ManuallyDrop::new(memory),
        })
    }

    fn upload<T: Copy>(
        buffer: &mut Buffer<'a, B>,
        content: &[T],
        memory_types: &[MemoryType],
    ) -> Result<B::Memory, RendererError> {
        let byte_len = content.len() * mem::size_of::<T>();
        assert!(byte_len as u64 <= buffer.len);

        let device = buffer.device;
        unsafe {
            let buffer_req = device.get_buffer_requirements(&buffer.buf);
            let upload_type =
                upload_type(memory_types, &buffer_req).ok_or(RendererError::NoUploadMemory)?;
            let memory = device
                .allocate_memory(upload_type, buffer_req.size)
                .map_err(gpu("allocate memory"))?;

            let filled = device
                .bind_buffer_memory(&memory, 0, &mut buffer.buf)
                .map_err(gpu("bind buffer memory"))
                .and_then(|()| {
                    device
                        .map_memory(&memory, m::Segment::ALL)
                        .map_err(gpu("map memory"))
                })
                .and_then(|mapping| {
                    ptr::copy_nonoverlapping(content.as_ptr() as *const u8, mapping, byte_len);
                    let flushed = device
                        .flush_mapped_memory_ranges(iter::once((&memory, m::Segment::ALL)))
                        .map_err(gpu("flush mapped memory"));
                    device.unmap_memory(&memory);
                    flushed
                });

            match filled {
                Ok(()) => Ok(memory),
                Err(err) => {
                    device.free_memory(memory);
                    Err(err)
                }
            }
        }
    }
}

/// First CPU-visible memory type the buffer accepts.
fn upload_type(properties: &[MemoryType], buffer_req: &m::Requirements) -> Option<MemoryTypeId> {
    properties
        .iter()
        .enumerate()
        .position(|(id, mem_type)| {
            buffer_req.type_mask & (1 << id) != 0
                && mem_type.properties.contains(m::Properties::CPU_VISIBLE)
        })
        .map(MemoryTypeId::from)
}

impl<'a, B: Backend> Drop for Memory<'a, B> {
    fn drop(&mut self) {
        unsafe {
            ManuallyDrop::drop(&mut self.buffer);
            self.buffer
                .device
                .free_memory(ManuallyDrop::into_inner(ptr::read(&self.memory)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem_type(properties: m::Properties) -> MemoryType {
        MemoryType {
            properties,
            heap_index: 0,
        }
    }

    fn requirements(type_mask: u32) -> m::Requirements {
        m::Requirements {
            size: 64,
            alignment: 4,
            type_mask: type_mask as _,
        }
    }

    #[test]
    fn picks_first_allowed_cpu_visible_type() {
        let types = [
            mem_type(m::Properties::DEVICE_LOCAL),
            mem_type(m::Properties::CPU_VISIBLE | m::Properties::COHERENT),
            mem_type(m::Properties::CPU_VISIBLE),
        ];

        let chosen = upload_type(&types, &requirements(0b111)).map(|id| id.0);
        assert_eq!(chosen, Some(1));

        let chosen = upload_type(&types, &requirements(0b101)).map(|id| id.0);
        assert_eq!(chosen, Some(2));
    }

    #[test]
    fn none_when_nothing_is_host_visible() {
        let types = [
            mem_type(m::Properties::DEVICE_LOCAL),
            mem_type(m::Properties::CPU_VISIBLE),
        ];
        assert!(upload_type(&types, &requirements(0b01)).is_none());
    }
}
