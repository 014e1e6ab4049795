#[cfg(feature = "metal")]
use gfx_backend_metal as back;

#[cfg(feature = "vulkan")]
use gfx_backend_vulkan as back;

mod config;
mod error;
mod frame_clock;
mod logging;
mod renderer;

use config::Config;
use error::{gpu, RendererError};
use frame_clock::FrameClock;
use renderer::Renderer;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Instant;

use gfx_hal::{prelude::*, window, Features};
use winit::event::{Event, KeyboardInput, VirtualKeyCode, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop, EventLoopProxy};

/// Sent by the render thread when it stops without being asked to.
#[derive(Debug)]
struct RenderStopped;

/// State shared between the event loop and the render thread.
struct Shared {
    should_close: AtomicBool,
    pending_resize: Mutex<Option<window::Extent2D>>,
}

impl Shared {
    fn new() -> Self {
        Shared {
            should_close: AtomicBool::new(false),
            pending_resize: Mutex::new(None),
        }
    }

    /// Only the latest size matters; earlier ones are overwritten.
    fn request_resize(&self, dims: window::Extent2D) {
        *self
            .pending_resize
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(dims);
    }

    fn take_resize(&self) -> Option<window::Extent2D> {
        self.pending_resize
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            logging::init(None);
            log::error!("invalid configuration: {}", err);
            std::process::exit(2);
        }
    };
    logging::init(config.log_filter.as_deref());
    log::info!("starting {:?} at {} fps", config.title, config.target_fps);

    let event_loop = EventLoop::<RenderStopped>::with_user_event();
    let wb = winit::window::WindowBuilder::new()
        .with_title(config.title.as_str())
        .with_inner_size(winit::dpi::Size::Physical(winit::dpi::PhysicalSize::new(
            config.dims.width,
            config.dims.height,
        )))
        .with_min_inner_size(winit::dpi::Size::Logical(winit::dpi::LogicalSize::new(
            64.0, 64.0,
        )));
    let window = match wb.build(&event_loop) {
        Ok(window) => window,
        Err(err) => {
            log::error!("failed to create window: {}", err);
            std::process::exit(1);
        }
    };

    let shared = Arc::new(Shared::new());

    let render_shared = Arc::clone(&shared);
    let proxy = event_loop.create_proxy();
    let handler = thread::spawn(move || {
        if let Err(err) = run_render_thread(&window, &config, &render_shared) {
            log::error!("render thread stopped: {}", err);
        }
        notify_stopped(&proxy);
    });

    let mut handler = Some(handler);

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Wait;
        match event {
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested
                | WindowEvent::KeyboardInput {
                    input:
                        KeyboardInput {
                            virtual_keycode: Some(VirtualKeyCode::Escape),
                            ..
                        },
                    ..
                } => {
                    shared.should_close.store(true, Ordering::Relaxed);
                    log::info!("closed");
                    join(&mut handler);
                    *control_flow = ControlFlow::Exit;
                }
                WindowEvent::Resized(size) => {
                    shared.request_resize(window::Extent2D {
                        width: size.width,
                        height: size.height,
                    });
                }
                _ => {}
            },
            Event::UserEvent(RenderStopped) => {
                join(&mut handler);
                *control_flow = ControlFlow::Exit;
            }
            _ => {}
        }
    });
}

fn notify_stopped(proxy: &EventLoopProxy<RenderStopped>) {
    // the event loop is already gone when the stop was requested by it
    let _ = proxy.send_event(RenderStopped);
}

fn join(handler: &mut Option<thread::JoinHandle<()>>) {
    if let Some(handler) = handler.take() {
        if handler.join().is_err() {
            log::error!("render thread panicked");
        }
    }
}

fn run_render_thread(
    window: &winit::window::Window,
    config: &Config,
    shared: &Shared,
) -> Result<(), RendererError> {
    let instance =
        back::Instance::create("gfx-rs triangle", 1).map_err(gpu("create backend instance"))?;
    let mut adapters = instance.enumerate_adapters();
    if adapters.is_empty() {
        return Err(RendererError::NoAdapter);
    }
    let adapter = adapters.remove(0);
    log::info!("using adapter: {}", adapter.info.name);

    let mut surface =
        unsafe { instance.create_surface(window) }.map_err(gpu("create surface"))?;

    let result = draw_until_closed(&mut surface, &adapter, config, shared);

    unsafe {
        instance.destroy_surface(surface);
    }
    result
}

fn draw_until_closed(
    surface: &mut <back::Backend as gfx_hal::Backend>::Surface,
    adapter: &gfx_hal::adapter::Adapter<back::Backend>,
    config: &Config,
    shared: &Shared,
) -> Result<(), RendererError> {
    let family = adapter
        .queue_families
        .iter()
        .find(|family| {
            surface.supports_queue_family(family) && family.queue_type().supports_graphics()
        })
        .ok_or(RendererError::NoQueueFamily)?;
    let mut gpu_handle = unsafe {
        adapter
            .physical_device
            .open(&[(family, &[1.0])], Features::empty())
    }
    .map_err(gpu("open device"))?;

    let mut queue_group = gpu_handle
        .queue_groups
        .pop()
        .ok_or(RendererError::NoQueueFamily)?;
    let queue = &mut queue_group.queues[0];
    let device = gpu_handle.device;

    let mut renderer = Renderer::new(surface, adapter, &device, queue_group.family, config)?;
    let mut clock = FrameClock::new(config.target_fps, Instant::now());
    match clock.interval() {
        Some(interval) => log::debug!("frame interval: {:?}", interval),
        None => log::debug!("frame rate uncapped"),
    }
    let mut fps_counter = fps_counter::FPSCounter::new();
    let report_every = config.target_fps.max(60) as usize;
    let mut frames = 0usize;

    while !shared.should_close.load(Ordering::Relaxed) {
        if let Some(dims) = shared.take_resize() {
            renderer.resize(dims)?;
        }

        renderer.render(queue)?;

        let fps = fps_counter.tick();
        frames += 1;
        if frames % report_every == 0 {
            log::debug!("frame {}: {} fps", frames, fps);
        }

        clock.wait();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> window::Extent2D {
        window::Extent2D { width, height }
    }

    #[test]
    fn take_resize_yields_the_latest_size_once() {
        let shared = Shared::new();
        assert_eq!(shared.take_resize(), None);

        shared.request_resize(extent(640, 480));
        shared.request_resize(extent(800, 0));
        assert_eq!(shared.take_resize(), Some(extent(800, 0)));
        assert_eq!(shared.take_resize(), None);
    }

    #[test]
    fn resizes_survive_a_poisoned_lock() {
        let shared = Arc::new(Shared::new());
        let poisoner = Arc::clone(&shared);
        let _ = thread::spawn(move || {
            let _guard = poisoner.pending_resize.lock().unwrap();
            panic!("render thread died holding the lock");
        })
        .join();
        assert!(shared.pending_resize.is_poisoned());

        shared.request_resize(extent(320, 240));
        assert_eq!(shared.take_resize(), Some(extent(320, 240)));
    }
}
