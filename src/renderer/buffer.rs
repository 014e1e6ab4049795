use gfx_hal::{buffer, prelude::*, Backend, Limits};
use std::mem::{self, ManuallyDrop};
use std::ptr;

use crate::error::{gpu, RendererError};

pub struct Buffer<'a, B: Backend> {
    pub device: &'a B::Device,
    pub buf: ManuallyDrop<B::Buffer>,
    pub len: u64,
}

impl<'a, B: Backend> Buffer<'a, B> {
    /// Creates a buffer large enough for `count` values of `T`.
    pub fn new<T>(
        device: &'a B::Device,
        count: usize,
        usage: buffer::Usage,
        limits: &Limits,
    ) -> Result<Self, RendererError> {
        let buffer_len = count as u64 * mem::size_of::<T>() as u64;
        assert_ne!(buffer_len, 0);
        let memory_size = padded_size(buffer_len, limits.non_coherent_atom_size as u64);

        let buf = unsafe { device.create_buffer(memory_size, usage) }
            .map_err(gpu("create buffer"))?;

        Ok(Buffer {
            device,
            buf: ManuallyDrop::new(buf),
            len: buffer_len,
        })
    }
}

fn padded_size(len: u64, atom: u64) -> u64 {
    let atom = atom.max(1);
    ((len + atom - 1) / atom) * atom
}

impl<'a, B: Backend> Drop for Buffer<'a, B> {
    fn drop(&mut self) {
        unsafe {
            self.device
                .destroy_buffer(ManuallyDrop::into_inner(ptr::read(&self.buf)))
        }
    }
}
