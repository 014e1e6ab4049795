use gfx_hal::window::Extent2D;
use std::env;
use std::ffi::OsString;

use crate::error::ConfigError;

pub const OPAQUE_RED: [f32; 4] = [1.0, 0.0, 0.0, 1.0];
pub const OPAQUE_GREEN: [f32; 4] = [0.0, 1.0, 0.0, 1.0];

/// Startup settings. Every field can be overridden through a `TRIANGLE_*`
/// environment variable.
#[derive(Debug, Clone)]
pub struct Config {
    pub title: String,
    pub dims: Extent2D,
    pub clear_color: [f32; 4],
    pub fill_color: [f32; 4],
    /// Frames per second, 0 for uncapped.
    pub target_fps: u32,
    pub log_filter: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            title: "triangle".to_owned(),
            dims: Extent2D {
                width: 1024,
                height: 768,
            },
            clear_color: OPAQUE_RED,
            fill_color: OPAQUE_GREEN,
            target_fps: 60,
            log_filter: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_vars(env::vars_os())
    }

    /// Applies `TRIANGLE_*` overrides. Keys that are not UTF-8 cannot be
    /// ours and are skipped.
    pub fn with_vars<I>(mut self, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        for (key, value) in vars {
            let key = match key.into_string() {
                Ok(key) if key.starts_with("TRIANGLE_") => key,
                _ => continue,
            };
            let value = value
                .into_string()
                .map_err(|_| ConfigError::NotUnicode { key: key.clone() })?;

            match key.as_str() {
                "TRIANGLE_TITLE" => self.title = value,
                "TRIANGLE_WIDTH" => self.dims.width = parse_extent(&key, &value)?,
                "TRIANGLE_HEIGHT" => self.dims.height = parse_extent(&key, &value)?,
                "TRIANGLE_FPS" => self.target_fps = parse_number(&key, &value)?,
                "TRIANGLE_LOG" => self.log_filter = Some(value),
                _ => {}
            }
        }
        Ok(self)
    }
}

fn parse_number(key: &str, value: &str) -> Result<u32, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::NotANumber {
            key: key.to_owned(),
            value: value.to_owned(),
        })
}

fn parse_extent(key: &str, value: &str) -> Result<u32, ConfigError> {
    match parse_number(key, value)? {
        0 => Err(ConfigError::Zero {
            key: key.to_owned(),
        }),
        n => Ok(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(OsString, OsString)> {
        pairs
            .iter()
            .map(|(k, v)| (OsString::from(k), OsString::from(v)))
            .collect()
    }

    #[test]
    fn defaults_draw_green_on_red_at_60fps() {
        let config = Config::default();
        assert_eq!(config.clear_color, OPAQUE_RED);
        assert_eq!(config.fill_color, OPAQUE_GREEN);
        assert_eq!(config.target_fps, 60);
        assert_eq!(config.dims.width, 1024);
        assert_eq!(config.dims.height, 768);
        assert!(config.log_filter.is_none());
    }

    #[test]
    fn overrides_apply_and_unrelated_vars_are_ignored() {
        let config = Config::default()
            .with_vars(vars(&[
                ("TRIANGLE_TITLE", "demo"),
                ("TRIANGLE_WIDTH", "640"),
                ("TRIANGLE_HEIGHT", " 480 "),
                ("TRIANGLE_FPS", "0"),
                ("TRIANGLE_LOG", "debug"),
                ("HOME", "/root"),
            ]))
            .unwrap();

        assert_eq!(config.title, "demo");
        assert_eq!(config.dims, Extent2D { width: 640, height: 480 });
        assert_eq!(config.target_fps, 0);
        assert_eq!(config.log_filter.as_deref(), Some("debug"));
    }

    #[test]
    fn rejects_garbage_numbers() {
        let err = Config::default()
            .with_vars(vars(&[("TRIANGLE_FPS", "fast")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::NotANumber {
                key: "TRIANGLE_FPS".to_owned(),
                value: "fast".to_owned(),
            }
        );
    }

    #[test]
    fn rejects_zero_sized_window() {
        let err = Config::default()
            .with_vars(vars(&[("TRIANGLE_WIDTH", "0")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Zero {
                key: "TRIANGLE_WIDTH".to_owned()
            }
        );
        assert_eq!(err.to_string(), "TRIANGLE_WIDTH must be greater than zero");
    }

    #[cfg(unix)]
    #[test]
    fn non_unicode_environment_is_tolerated() {
        use std::os::unix::ffi::OsStringExt;

        let garbage = || OsString::from_vec(vec![0xff, 0xfe]);
        let mut env = vars(&[("TRIANGLE_FPS", "30")]);
        env.push((OsString::from("UNRELATED"), garbage()));
        env.push((garbage(), OsString::from("x")));

        let config = Config::default().with_vars(env).unwrap();
        assert_eq!(config.target_fps, 30);
    }

    #[cfg(unix)]
    #[test]
    fn non_unicode_override_is_rejected() {
        use std::os::unix::ffi::OsStringExt;

        let env = vec![(
            OsString::from("TRIANGLE_TITLE"),
            OsString::from_vec(vec![0xff, 0xfe]),
        )];
        let err = Config::default().with_vars(env).unwrap_err();
        assert_eq!(
            err,
            ConfigError::NotUnicode {
                key: "TRIANGLE_TITLE".to_owned()
            }
        );
    }
}
