use crate::format::Resolution;

/// Lowest vertical position the engine will ever write to the device.
///
/// Some capture cards report a minimum below this but corrupt the image when
/// such a value is actually set.
pub const MIN_VER_POS: i32 = 2;

/// Per-mode color controls, bounded by driver-reported min/max values.
///
/// # Example
/// ```rust
/// use scanline_core::prelude::ColorParams;
///
/// let c = ColorParams { bright: 10, ..ColorParams::default() };
/// assert_eq!(c.bright, 10);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColorParams {
    pub bright: i32,
    pub contr: i32,
    pub red_bright: i32,
    pub green_bright: i32,
    pub blue_bright: i32,
    pub red_contr: i32,
    pub green_contr: i32,
    pub blue_contr: i32,
}

/// Per-mode signal geometry controls, bounded by driver-reported min/max
/// values. `ver_pos` additionally honors [`MIN_VER_POS`] on writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeometryParams {
    pub phase: i32,
    pub black_level: i32,
    pub hor_pos: i32,
    pub ver_pos: i32,
    pub hor_scale: i32,
}

/// The full parameter set stored for one capture mode.
///
/// Identity is the resolution's width and height; bit depth is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModeParams {
    pub resolution: Resolution,
    pub color: ColorParams,
    pub geometry: GeometryParams,
}

/// A resolution that stands in for another: whenever the device reports
/// `from`, the engine forces it into `to` instead.
///
/// # Example
/// ```rust
/// use scanline_core::prelude::{Resolution, ResolutionAlias};
///
/// let alias = ResolutionAlias {
///     from: Resolution::new(640, 480, 0),
///     to: Resolution::new(1024, 768, 0),
/// };
/// assert!(alias.matches(&Resolution::new(640, 480, 32)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResolutionAlias {
    pub from: Resolution,
    pub to: Resolution,
}

impl ResolutionAlias {
    /// Whether this alias applies to the given capture resolution.
    pub fn matches(&self, r: &Resolution) -> bool {
        self.from.same_extent(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_matches_on_extent_only() {
        let alias = ResolutionAlias {
            from: Resolution::new(800, 600, 0),
            to: Resolution::new(1024, 768, 0),
        };
        assert!(alias.matches(&Resolution::new(800, 600, 16)));
        assert!(!alias.matches(&Resolution::new(800, 601, 16)));
    }
}
