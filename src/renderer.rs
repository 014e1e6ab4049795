use gfx_hal::{
    adapter, buffer as b, command, format as f, image as i, pass, pool,
    prelude::*,
    queue::{family::QueueFamilyId, Submission},
    window, Backend,
};

use std::borrow::Borrow;
use std::iter;
use std::mem::ManuallyDrop;
use std::ptr;

mod buffer;
mod descriptor_set;
mod memory;
mod pipeline;
pub mod shader;
mod swapchain;
mod vertex;

use crate::config::Config;
use crate::error::{gpu, RendererError};
use buffer::Buffer;
use descriptor_set::DescriptorSet;
use memory::Memory;
use pipeline::Pipeline;
use swapchain::Swapchain;
use vertex::{Vertex, TRIANGLE};

const FRAMES_IN_FLIGHT: usize = 2;

pub struct Renderer<'a, B: Backend> {
    frame: usize,
    device: &'a B::Device,
    clear_color: [f32; 4],
    command_buffers: Vec<B::CommandBuffer>,
    submission_complete_semaphores: Vec<B::Semaphore>,
    submission_complete_fences: Vec<B::Fence>,
    framebuffers: Vec<Option<B::Framebuffer>>,
    command_pool: ManuallyDrop<B::CommandPool>,
    descriptor_set: ManuallyDrop<DescriptorSet<'a, B>>,
    fill_color: ManuallyDrop<Memory<'a, B>>,
    vertices: ManuallyDrop<Memory<'a, B>>,
    swapchain: ManuallyDrop<Swapchain<'a, B>>,
    render_pass: ManuallyDrop<B::RenderPass>,
    pipeline: ManuallyDrop<Pipeline<'a, B>>,
}

impl<'a, B> Renderer<'a, B>
where
    B: Backend,
{
    pub fn new(
        surface: &'a mut B::Surface,
        adapter: &'a adapter::Adapter<B>,
        device: &'a B::Device,
        family: QueueFamilyId,
        config: &Config,
    ) -> Result<Self, RendererError> {
        let memory_types = adapter.physical_device.memory_properties().memory_types;
        let limits = adapter.physical_device.limits();

        let vertex_buffer = Buffer::new::<Vertex>(device, TRIANGLE.len(), b::Usage::VERTEX, &limits)?;
        let vertices = Memory::new(vertex_buffer, &TRIANGLE, &memory_types)?;

        let uniform_buffer = Buffer::new::<[f32; 4]>(device, 1, b::Usage::UNIFORM, &limits)?;
        let fill_color = Memory::new(uniform_buffer, &[config.fill_color], &memory_types)?;

        let descriptor_set = DescriptorSet::<B>::new(device, &fill_color.buffer.buf)?;
        let swapchain = Swapchain::new(device, surface, adapter, config.dims)?;

        let render_pass = Self::create_render_pass(device, swapchain.format)?;
        let pipeline = match Pipeline::<B>::new::<Vertex>(
            device,
            shader::VERTEX_SOURCE,
            shader::FRAGMENT_SOURCE,
            &render_pass,
            &descriptor_set.set_layout,
        ) {
            Ok(pipeline) => pipeline,
            Err(err) => {
                unsafe { device.destroy_render_pass(render_pass) };
                return Err(err);
            }
        };

        let frame_resources = Self::create_command_pool(device, family).and_then(|mut pool| {
            match Self::create_sync_objects(device, FRAMES_IN_FLIGHT) {
                Ok((semaphores, fences)) => {
                    let buffers = Self::allocate_command_buffers(&mut pool, FRAMES_IN_FLIGHT);
                    Ok((pool, buffers, semaphores, fences))
                }
                Err(err) => {
                    unsafe { device.destroy_command_pool(pool) };
                    Err(err)
                }
            }
        });
        let (command_pool, command_buffers, submission_complete_semaphores, submission_complete_fences) =
            match frame_resources {
                Ok(resources) => resources,
                Err(err) => {
                    unsafe { device.destroy_render_pass(render_pass) };
                    return Err(err);
                }
            };
        let framebuffers = iter::repeat_with(|| None).take(FRAMES_IN_FLIGHT).collect();

        log::info!(
            "renderer ready: {}x{}, {} frames in flight",
            swapchain.dims.width,
            swapchain.dims.height,
            FRAMES_IN_FLIGHT
        );

        Ok(Renderer {
            device,
            clear_color: config.clear_color,
            submission_complete_semaphores,
            submission_complete_fences,
            framebuffers,
            command_pool: ManuallyDrop::new(command_pool),
            descriptor_set: ManuallyDrop::new(descriptor_set),
            fill_color: ManuallyDrop::new(fill_color),
            vertices: ManuallyDrop::new(vertices),
            swapchain: ManuallyDrop::new(swapchain),
            render_pass: ManuallyDrop::new(render_pass),
            pipeline: ManuallyDrop::new(pipeline),
            command_buffers,
            frame: 0,
        })
    }

    pub fn resize(&mut self, dims: window::Extent2D) -> Result<(), RendererError> {
        self.wait_idle()?;
        for framebuffer in self.framebuffers.iter_mut().filter_map(Option::take) {
            unsafe { self.device.destroy_framebuffer(framebuffer) };
        }
        self.swapchain.resize(dims)
    }

    pub fn render(&mut self, queue: &mut B::CommandQueue) -> Result<(), RendererError> {
        if !self.swapchain.is_drawable() {
            return Ok(());
        }

        let frame_idx = self.frame % FRAMES_IN_FLIGHT;

        unsafe {
            self.device
                .wait_for_fence(&self.submission_complete_fences[frame_idx], !0)
                .map_err(gpu("wait for fence"))?;
            if let Some(framebuffer) = self.framebuffers[frame_idx].take() {
                self.device.destroy_framebuffer(framebuffer);
            }
        }

        let surface_image = unsafe {
            match self.swapchain.surface.acquire_image(!0) {
                Ok((image, _)) => image,
                Err(err) => {
                    log::debug!("acquire failed ({:?}), recreating swapchain", err);
                    return self.swapchain.recreate();
                }
            }
        };

        // only reset once a submission is certain to signal it again
        unsafe {
            self.device
                .reset_fence(&self.submission_complete_fences[frame_idx])
                .map_err(gpu("reset fence"))?;
        }

        let framebuffer = unsafe {
            self.device.create_framebuffer(
                &self.render_pass,
                iter::once(surface_image.borrow()),
                i::Extent {
                    width: self.swapchain.dims.width,
                    height: self.swapchain.dims.height,
                    depth: 1,
                },
            )
        }
        .map_err(gpu("create framebuffer"))?;

        let cmd_buffer = &mut self.command_buffers[frame_idx];
        unsafe {
            cmd_buffer.reset(false);
            cmd_buffer.begin_primary(command::CommandBufferFlags::ONE_TIME_SUBMIT);
            cmd_buffer.set_viewports(0, &[self.swapchain.viewport.clone()]);
            cmd_buffer.set_scissors(0, &[self.swapchain.viewport.rect]);
            cmd_buffer.bind_graphics_pipeline(&self.pipeline.pipeline);
            cmd_buffer.bind_vertex_buffers(
                0,
                iter::once((&*self.vertices.buffer.buf, b::SubRange::WHOLE)),
            );
            cmd_buffer.bind_graphics_descriptor_sets(
                &self.pipeline.pipeline_layout,
                0,
                iter::once(&self.descriptor_set.set),
                &[],
            );
            cmd_buffer.begin_render_pass(
                &self.render_pass,
                &framebuffer,
                self.swapchain.viewport.rect,
                &[command::ClearValue {
                    color: command::ClearColor {
                        float32: self.clear_color,
                    },
                }],
                command::SubpassContents::Inline,
            );
            cmd_buffer.draw(0..TRIANGLE.len() as u32, 0..1);
            cmd_buffer.end_render_pass();
            cmd_buffer.finish();

            let submission = Submission {
                command_buffers: iter::once(&*cmd_buffer),
                wait_semaphores: None,
                signal_semaphores: iter::once(&self.submission_complete_semaphores[frame_idx]),
            };

            queue.submit(
                submission,
                Some(&self.submission_complete_fences[frame_idx]),
            );

            let result = queue.present_surface(
                &mut self.swapchain.surface,
                surface_image,
                Some(&self.submission_complete_semaphores[frame_idx]),
            );

            self.framebuffers[frame_idx] = Some(framebuffer);

            if let Err(err) = result {
                log::debug!("present failed ({:?}), recreating swapchain", err);
                self.swapchain.recreate()?;
            }
        }

        self.frame += 1;
        Ok(())
    }

    fn wait_idle(&self) -> Result<(), RendererError> {
        self.device.wait_idle().map_err(gpu("wait for device idle"))
    }

    fn create_render_pass(
        device: &B::Device,
        format: f::Format,
    ) -> Result<B::RenderPass, RendererError> {
        let attachment = pass::Attachment {
            format: Some(format),
            samples: 1,
            ops: pass::AttachmentOps::new(
                pass::AttachmentLoadOp::Clear,
                pass::AttachmentStoreOp::Store,
            ),
            stencil_ops: pass::AttachmentOps::DONT_CARE,
            layouts: i::Layout::Undefined..i::Layout::Present,
        };

        let subpass = pass::SubpassDesc {
            colors: &[(0, i::Layout::ColorAttachmentOptimal)],
            depth_stencil: None,
            inputs: &[],
            resolves: &[],
            preserves: &[],
        };

        unsafe { device.create_render_pass(&[attachment], &[subpass], &[]) }
            .map_err(gpu("create render pass"))
    }

    fn create_command_pool(
        device: &B::Device,
        family: QueueFamilyId,
    ) -> Result<B::CommandPool, RendererError> {
        unsafe { device.create_command_pool(family, pool::CommandPoolCreateFlags::RESET_INDIVIDUAL) }
            .map_err(gpu("create command pool"))
    }

    fn allocate_command_buffers(
        command_pool: &mut B::CommandPool,
        frames_in_flight: usize,
    ) -> Vec<B::CommandBuffer> {
        let mut v = Vec::with_capacity(frames_in_flight);
        for _ in 0..frames_in_flight {
            v.push(unsafe { command_pool.allocate_one(command::Level::Primary) });
        }
        v
    }

    fn create_sync_objects(
        device: &B::Device,
        frames_in_flight: usize,
    ) -> Result<(Vec<B::Semaphore>, Vec<B::Fence>), RendererError> {
        let semaphores = create_all(
            frames_in_flight,
            || device.create_semaphore().map_err(gpu("create semaphore")),
            |s| unsafe { device.destroy_semaphore(s) },
        )?;
        let fences = create_all(
            frames_in_flight,
            || device.create_fence(true).map_err(gpu("create fence")),
            |f| unsafe { device.destroy_fence(f) },
        );
        match fences {
            Ok(fences) => Ok((semaphores, fences)),
            Err(err) => {
                for s in semaphores {
                    unsafe { device.destroy_semaphore(s) };
                }
                Err(err)
            }
        }
    }
}

/// Creates `count` objects, destroying the ones already made if one fails.
fn create_all<T, E>(
    count: usize,
    mut create: impl FnMut() -> Result<T, E>,
    mut destroy: impl FnMut(T),
) -> Result<Vec<T>, E> {
    let mut created = Vec::with_capacity(count);
    for _ in 0..count {
        match create() {
            Ok(item) => created.push(item),
            Err(err) => {
                created.into_iter().for_each(&mut destroy);
                return Err(err);
            }
        }
    }
    Ok(created)
}

impl<'a, B: Backend> Drop for Renderer<'a, B> {
    fn drop(&mut self) {
        if let Err(err) = self.wait_idle() {
            log::error!("{}", err);
        }

        let device = &self.device;
        unsafe {
            for framebuffer in self.framebuffers.drain(..).flatten() {
                device.destroy_framebuffer(framebuffer);
            }
            ManuallyDrop::drop(&mut self.descriptor_set);
            ManuallyDrop::drop(&mut self.fill_color);
            ManuallyDrop::drop(&mut self.vertices);
            device.destroy_command_pool(ManuallyDrop::into_inner(ptr::read(&self.command_pool)));
            for s in self.submission_complete_semaphores.drain(..) {
                device.destroy_semaphore(s);
            }

            for f in self.submission_complete_fences.drain(..) {
                device.destroy_fence(f);
            }

            ManuallyDrop::drop(&mut self.pipeline);
            device.destroy_render_pass(ManuallyDrop::into_inner(ptr::read(&self.render_pass)));
            ManuallyDrop::drop(&mut self.swapchain);
        }
        log::debug!("renderer destroyed after {} frames", self.frame);
    }
}
