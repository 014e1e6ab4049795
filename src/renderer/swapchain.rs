use gfx_hal::{adapter::Adapter, format as f, prelude::*, pso, window, Backend};

use crate::error::{gpu, RendererError};

pub struct Swapchain<'a, B: Backend> {
    device: &'a B::Device,
    adapter: &'a Adapter<B>,
    pub viewport: pso::Viewport,
    pub dims: window::Extent2D,
    pub surface: &'a mut B::Surface,
    pub format: f::Format,
    configured: bool,
}

impl<'a, B: Backend> Swapchain<'a, B> {
    pub fn new(
        device: &'a B::Device,
        surface: &'a mut B::Surface,
        adapter: &'a Adapter<B>,
        dims: window::Extent2D,
    ) -> Result<Self, RendererError> {
        let format = pick_format(surface.supported_formats(&adapter.physical_device));
        log::info!("surface format: {:?}", format);

        let mut swapchain = Swapchain {
            device,
            surface,
            adapter,
            viewport: viewport(dims),
            format,
            dims,
            configured: false,
        };

        swapchain.recreate()?;
        Ok(swapchain)
    }

    /// Nothing can be presented while the surface has no area.
    pub fn is_drawable(&self) -> bool {
        drawable(self.configured, self.dims)
    }

    pub fn resize(&mut self, dims: window::Extent2D) -> Result<(), RendererError> {
        log::debug!("surface resized to {}x{}", dims.width, dims.height);
        self.dims = dims;
        self.recreate()
    }

    pub fn recreate(&mut self) -> Result<(), RendererError> {
        if !has_area(self.dims) {
            return Ok(());
        }

        let caps = self.surface.capabilities(&self.adapter.physical_device);
        let swap_config = swap_config(&caps, self.format, self.dims);
        let extent = swap_config.extent;

        unsafe {
            self.surface
                .configure_swapchain(&self.device, swap_config)
                .map_err(gpu("configure swapchain"))?;
        }
        self.configured = true;
        // the surface may not honour the requested size
        self.dims = extent;
        self.viewport = viewport(extent);
        Ok(())
    }
}

/// Prefers an sRGB format, then whatever the surface lists first.
fn pick_format(formats: Option<Vec<f::Format>>) -> f::Format {
    let formats = formats.unwrap_or_default();
    formats
        .iter()
        .find(|format| format.base_format().1 == f::ChannelType::Srgb)
        .or_else(|| formats.first())
        .copied()
        .unwrap_or(f::Format::Rgba8Srgb)
}

fn swap_config(
    caps: &window::SurfaceCapabilities,
    format: f::Format,
    requested: window::Extent2D,
) -> window::SwapchainConfig {
    let mut config = window::SwapchainConfig::from_caps(caps, format, requested);
    config.present_mode = window::PresentMode::FIFO;
    config
}

fn has_area(dims: window::Extent2D) -> bool {
    dims.width > 0 && dims.height > 0
}

fn drawable(configured: bool, dims: window::Extent2D) -> bool {
    configured && has_area(dims)
}

/// Covers the whole surface.
fn viewport(extent: window::Extent2D) -> pso::Viewport {
    pso::Viewport {
        rect: pso::Rect {
            x: 0,
            y: 0,
            w: extent.width as _,
            h: extent.height as _,
        },
        depth: 0.0..1.0,
    }
}

impl<'a, B: Backend> Drop for Swapchain<'a, B> {
    fn drop(&mut self) {
        if self.configured {
            unsafe { self.surface.unconfigure_swapchain(&self.device) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gfx_hal::image;

    fn extent(width: u32, height: u32) -> window::Extent2D {
        window::Extent2D { width, height }
    }

    fn caps(current: Option<window::Extent2D>) -> window::SurfaceCapabilities {
        window::SurfaceCapabilities {
            present_modes: window::PresentMode::FIFO,
            composite_alpha_modes: window::CompositeAlphaMode::OPAQUE,
            image_count: 2..=3,
            current_extent: current,
            extents: extent(1, 1)..=extent(4096, 4096),
            max_image_layers: 1,
            usage: image::Usage::COLOR_ATTACHMENT,
        }
    }

    #[test]
    fn zero_area_is_not_drawable() {
        assert!(!drawable(true, extent(0, 600)));
        assert!(!drawable(true, extent(800, 0)));
        assert!(!drawable(true, extent(0, 0)));
    }

    #[test]
    fn unconfigured_is_not_drawable() {
        assert!(!drawable(false, extent(800, 600)));
        assert!(drawable(true, extent(800, 600)));
    }

    #[test]
    fn surface_extent_wins_over_the_requested_size() {
        let config = swap_config(
            &caps(Some(extent(800, 600))),
            f::Format::Bgra8Srgb,
            extent(1024, 768),
        );
        assert_eq!(config.extent, extent(800, 600));
        assert_eq!(config.present_mode, window::PresentMode::FIFO);
    }

    #[test]
    fn prefers_srgb_formats() {
        let formats = vec![f::Format::Bgra8Unorm, f::Format::Bgra8Srgb];
        assert_eq!(pick_format(Some(formats)), f::Format::Bgra8Srgb);
    }

    #[test]
    fn falls_back_to_first_listed_format() {
        let formats = vec![f::Format::Bgra8Unorm, f::Format::Rgba8Unorm];
        assert_eq!(pick_format(Some(formats)), f::Format::Bgra8Unorm);
    }

    #[test]
    fn empty_or_missing_format_list_uses_default() {
        assert_eq!(pick_format(None), f::Format::Rgba8Srgb);
        assert_eq!(pick_format(Some(vec![])), f::Format::Rgba8Srgb);
    }

    #[test]
    fn viewport_spans_the_surface() {
        let vp = viewport(window::Extent2D {
            width: 800,
            height: 600,
        });
        assert_eq!((vp.rect.x, vp.rect.y), (0, 0));
        assert_eq!((vp.rect.w, vp.rect.h), (800, 600));
        assert_eq!(vp.depth, 0.0..1.0);
    }
}
