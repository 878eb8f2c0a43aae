//! Window/level settings and the preset table.
//!
//! A window maps a range of physical values (for CT, Hounsfield units) onto
//! the 0-255 display range. `width` is the size of that range and `center`
//! its midpoint.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RenderError, Result};

/// Window/level pair. Structurally equal values are interchangeable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowLevel {
    /// Visible intensity range; must be positive.
    pub width: f64,
    /// Midpoint of the visible range.
    pub center: f64,
}

impl WindowLevel {
    /// Soft-tissue window used when a frame carries no window of its own.
    pub const DEFAULT: WindowLevel = WindowLevel::new(400.0, 40.0);

    /// Create a window. Use [`validate`](Self::validate) before mapping.
    pub const fn new(width: f64, center: f64) -> Self {
        Self { width, center }
    }

    /// Reject non-positive or non-finite widths.
    pub fn validate(&self) -> Result<()> {
        if !self.width.is_finite() || self.width <= 0.0 || !self.center.is_finite() {
            return Err(RenderError::InvalidWindow(self.width));
        }
        Ok(())
    }

    /// Lower edge of the window.
    pub fn min(&self) -> f64 {
        self.center - self.width / 2.0
    }

    /// Upper edge of the window.
    pub fn max(&self) -> f64 {
        self.center + self.width / 2.0
    }

    /// Apply a brightness/contrast drag. Width never drops below 1.
    pub fn adjusted(&self, delta_width: f64, delta_center: f64) -> Self {
        Self {
            width: (self.width + delta_width).max(1.0),
            center: self.center + delta_center,
        }
    }

    /// Precompute the per-pixel mapping for this window.
    pub fn mapper(&self) -> Result<WindowMapper> {
        self.validate()?;
        Ok(WindowMapper {
            min: self.min(),
            max: self.max(),
            scale: 255.0 / self.width,
        })
    }
}

impl Default for WindowLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for WindowLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "W:{} L:{}", self.width, self.center)
    }
}

/// Validated window with its edges and scale precomputed.
#[derive(Debug, Clone, Copy)]
pub struct WindowMapper {
    min: f64,
    max: f64,
    scale: f64,
}

impl WindowMapper {
    /// Map a physical value to a display byte.
    ///
    /// Both edges are closed: `v <= min` is 0 and `v >= max` is 255. Inside
    /// the window the value is floored, never rounded.
    #[inline]
    pub fn map(&self, v: f64) -> u8 {
        if v <= self.min {
            0
        } else if v >= self.max {
            255
        } else {
            ((v - self.min) * self.scale).floor().clamp(0.0, 255.0) as u8
        }
    }
}

/// Named window presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    /// CT abdomen, 400/40
    CtAbdomen,
    /// CT lung, 1500/-600
    CtLung,
    /// CT bone, 2000/500
    CtBone,
    /// CT brain, 80/40
    CtBrain,
    /// CT liver, 150/30
    CtLiver,
    /// CT mediastinum, 350/50
    CtMediastinum,
    /// MR default, 800/400
    MrDefault,
    /// MR T1, 600/300
    MrT1,
    /// MR T2, 1000/500
    MrT2,
}

impl Preset {
    /// Every preset, CT first.
    pub const ALL: [Preset; 9] = [
        Preset::CtAbdomen,
        Preset::CtLung,
        Preset::CtBone,
        Preset::CtBrain,
        Preset::CtLiver,
        Preset::CtMediastinum,
        Preset::MrDefault,
        Preset::MrT1,
        Preset::MrT2,
    ];

    /// The window this preset stands for.
    pub const fn window_level(self) -> WindowLevel {
        match self {
            Preset::CtAbdomen => WindowLevel::new(400.0, 40.0),
            Preset::CtLung => WindowLevel::new(1500.0, -600.0),
            Preset::CtBone => WindowLevel::new(2000.0, 500.0),
            Preset::CtBrain => WindowLevel::new(80.0, 40.0),
            Preset::CtLiver => WindowLevel::new(150.0, 30.0),
            Preset::CtMediastinum => WindowLevel::new(350.0, 50.0),
            Preset::MrDefault => WindowLevel::new(800.0, 400.0),
            Preset::MrT1 => WindowLevel::new(600.0, 300.0),
            Preset::MrT2 => WindowLevel::new(1000.0, 500.0),
        }
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Preset::CtAbdomen => "CT Abdomen",
            Preset::CtLung => "CT Lung",
            Preset::CtBone => "CT Bone",
            Preset::CtBrain => "CT Brain",
            Preset::CtLiver => "CT Liver",
            Preset::CtMediastinum => "CT Mediastinum",
            Preset::MrDefault => "MR Default",
            Preset::MrT1 => "MR T1",
            Preset::MrT2 => "MR T2",
        }
    }

    /// Kebab-case identifier accepted by [`FromStr`].
    pub fn key(self) -> String {
        self.name().to_lowercase().replace(' ', "-")
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase().replace(['_', ' '], "-");
        Preset::ALL
            .into_iter()
            .find(|p| p.key() == wanted)
            .ok_or_else(|| RenderError::Config(format!("Unknown window preset: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_edges() {
        let wl = WindowLevel::new(256.0, 128.0);
        assert_eq!(wl.min(), 0.0);
        assert_eq!(wl.max(), 256.0);
    }

    #[test]
    fn test_validate_rejects_bad_width() {
        assert!(WindowLevel::new(0.0, 40.0).validate().is_err());
        assert!(WindowLevel::new(-10.0, 40.0).validate().is_err());
        assert!(WindowLevel::new(f64::NAN, 40.0).validate().is_err());
        assert!(WindowLevel::new(f64::INFINITY, 40.0).validate().is_err());
        assert!(WindowLevel::new(1.0, 40.0).validate().is_ok());
    }

    #[test]
    fn test_mapper_closed_edges() {
        let mapper = WindowLevel::new(400.0, 40.0).mapper().unwrap();
        assert_eq!(mapper.map(-160.0), 0);
        assert_eq!(mapper.map(-1000.0), 0);
        assert_eq!(mapper.map(240.0), 255);
        assert_eq!(mapper.map(3000.0), 255);
        // 200 HU into the window: floor(200 * 0.6375) = 127
        assert_eq!(mapper.map(40.0), 127);
    }

    #[test]
    fn test_mapper_floors() {
        let mapper = WindowLevel::new(256.0, 128.0).mapper().unwrap();
        assert_eq!(mapper.map(128.0), 127);
        assert_eq!(mapper.map(64.0), 63);
        assert_eq!(mapper.map(255.0), 254);
    }

    #[test]
    fn test_mapper_monotonic() {
        let mapper = WindowLevel::new(350.0, 50.0).mapper().unwrap();
        let mut last = 0u8;
        let mut v = -400.0;
        while v <= 400.0 {
            let out = mapper.map(v);
            assert!(out >= last, "not monotonic at {}", v);
            last = out;
            v += 0.25;
        }
        assert_eq!(last, 255);
    }

    #[test]
    fn test_adjusted_keeps_width_positive() {
        let wl = WindowLevel::new(10.0, 0.0).adjusted(-50.0, 20.0);
        assert_eq!(wl.width, 1.0);
        assert_eq!(wl.center, 20.0);
    }

    #[test]
    fn test_preset_table() {
        assert_eq!(Preset::CtLung.window_level(), WindowLevel::new(1500.0, -600.0));
        assert_eq!(Preset::CtBrain.window_level(), WindowLevel::new(80.0, 40.0));
        assert_eq!(Preset::MrT2.window_level(), WindowLevel::new(1000.0, 500.0));
        assert_eq!(Preset::ALL.len(), 9);
        assert_eq!(Preset::CtAbdomen.window_level(), WindowLevel::DEFAULT);
        for preset in Preset::ALL {
            assert!(preset.window_level().validate().is_ok());
        }
    }

    #[test]
    fn test_preset_from_str() {
        assert_eq!("ct-lung".parse::<Preset>().unwrap(), Preset::CtLung);
        assert_eq!("MR T1".parse::<Preset>().unwrap(), Preset::MrT1);
        assert_eq!("ct_mediastinum".parse::<Preset>().unwrap(), Preset::CtMediastinum);
        assert!("pet-hot".parse::<Preset>().is_err());
    }
}
