//! Logger setup.
//!
//! `RUST_LOG` always wins. Without it the filter handed in from the
//! configuration is used.

pub const DEFAULT_FILTER: &str = "info,gfx_backend_vulkan=warn";

/// Installs the global `env_logger`. Calling it again is a no-op.
pub fn init(filter: Option<&str>) {
    let env = env_logger::Env::default().default_filter_or(filter.unwrap_or(DEFAULT_FILTER));
    if env_logger::Builder::from_env(env).try_init().is_ok() {
        log::debug!("logging initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_twice_is_harmless() {
        init(Some("warn"));
        init(None);
        log::info!("still alive");
    }
}
