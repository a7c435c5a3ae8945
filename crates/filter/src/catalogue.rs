//! The closed set of filter types and their parameter-blob layouts.
//!
//! Every filter instance carries a fixed-width byte blob; the catalogue
//! declares, per filter kind, which typed fields live at which offsets. A
//! shell that wants to edit parameters builds its controls from
//! [`schema`](FilterKind::schema) instead of linking against widget types.

use crate::GraphError;

/// Fixed width of every filter's parameter blob.
pub const PARAM_BLOB_LEN: usize = 64;

/// Read a little-endian `u16` field out of a parameter blob.
pub fn read_u16(params: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([params[offset], params[offset + 1]])
}

/// Write a little-endian `u16` field into a parameter blob.
pub fn write_u16(params: &mut [u8], offset: usize, value: u16) {
    params[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

/// Read a little-endian `i16` field out of a parameter blob.
pub fn read_i16(params: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([params[offset], params[offset + 1]])
}

/// Write a little-endian `i16` field into a parameter blob.
pub fn write_i16(params: &mut [u8], offset: usize, value: i16) {
    params[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

/// The filter catalogue. Closed and known at build time; gates are the two
/// sentinel kinds that delimit chains in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    Blur,
    Rotate,
    InputGate,
    OutputGate,
    Crop,
    Flip,
    Median,
    DenoiseTemporal,
    DenoiseNonlocalMeans,
    Sharpen,
    UnsharpMask,
    Decimate,
    DeltaHistogram,
    UniqueCount,
}

/// Blur field offsets.
pub mod blur {
    pub const KERNEL_SIZE: usize = 0;
    pub const TYPE: usize = 1;
    pub const TYPE_BOX: u8 = 0;
    pub const TYPE_GAUSSIAN: u8 = 1;
}

/// Rotate field offsets. Angle is stored ×10, scale ×100.
pub mod rotate {
    pub const ANGLE: usize = 0;
    pub const SCALE: usize = 2;
}

/// Gate field offsets (shared by input and output gates). A zero dimension
/// is a wildcard for that axis during chain selection.
pub mod gate {
    pub const WIDTH: usize = 0;
    pub const HEIGHT: usize = 2;
}

/// Crop field offsets.
pub mod crop {
    pub const X: usize = 0;
    pub const Y: usize = 2;
    pub const WIDTH: usize = 4;
    pub const HEIGHT: usize = 6;
    pub const SCALER: usize = 8;
    pub const SCALER_LINEAR: u8 = 0;
    pub const SCALER_NEAREST: u8 = 1;
    pub const SCALER_NONE: u8 = 2;
}

/// Flip field offsets.
pub mod flip {
    pub const AXIS: usize = 0;
    pub const AXIS_VERTICAL: u8 = 0;
    pub const AXIS_HORIZONTAL: u8 = 1;
    pub const AXIS_BOTH: u8 = 2;
}

/// Median field offsets.
pub mod median {
    pub const KERNEL_SIZE: usize = 0;
}

/// Temporal denoise field offsets.
pub mod denoise_temporal {
    pub const THRESHOLD: usize = 0;
}

/// Non-local-means denoise field offsets.
pub mod denoise_nlm {
    pub const H: usize = 0;
    pub const H_COLOR: usize = 1;
    pub const TEMPLATE_WINDOW: usize = 2;
    pub const SEARCH_WINDOW: usize = 3;
}

/// Unsharp-mask field offsets. Radius is stored ×10.
pub mod unsharp_mask {
    pub const STRENGTH: usize = 0;
    pub const RADIUS: usize = 1;
}

/// Decimate field offsets.
pub mod decimate {
    pub const FACTOR: usize = 0;
    pub const TYPE: usize = 1;
    pub const TYPE_NEAREST: u8 = 0;
    pub const TYPE_AVERAGE: u8 = 1;
}

/// Unique-count field offsets.
pub mod unique_count {
    pub const THRESHOLD: usize = 0;
    pub const CORNER: usize = 1;
    pub const CORNER_TOP_LEFT: u8 = 0;
    pub const CORNER_TOP_RIGHT: u8 = 1;
    pub const CORNER_BOTTOM_RIGHT: u8 = 2;
    pub const CORNER_BOTTOM_LEFT: u8 = 3;
}

/// Field value types a parameter blob can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    U8,
    U16,
    I16,
}

/// How a shell should present a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiHint {
    /// Numeric spin box.
    SpinBox,
    /// Choice among the listed labels; the stored value is the index.
    Dropdown(&'static [&'static str]),
    /// Value divided by ten for display.
    TenthsSpinBox,
    /// Value divided by one hundred for display.
    HundredthsSpinBox,
}

/// One typed field inside a parameter blob.
#[derive(Debug, Clone, Copy)]
pub struct ParamField {
    pub name: &'static str,
    pub offset: usize,
    pub kind: FieldKind,
    pub min: i32,
    pub max: i32,
    pub hint: UiHint,
}

impl FilterKind {
    /// All catalogue entries, gates first.
    pub const ALL: [FilterKind; 14] = [
        FilterKind::InputGate,
        FilterKind::OutputGate,
        FilterKind::Blur,
        FilterKind::Rotate,
        FilterKind::Crop,
        FilterKind::Flip,
        FilterKind::Median,
        FilterKind::DenoiseTemporal,
        FilterKind::DenoiseNonlocalMeans,
        FilterKind::Sharpen,
        FilterKind::UnsharpMask,
        FilterKind::Decimate,
        FilterKind::DeltaHistogram,
        FilterKind::UniqueCount,
    ];

    /// Human (and file) name of the filter type.
    pub fn name(self) -> &'static str {
        match self {
            FilterKind::Blur => "Blur",
            FilterKind::Rotate => "Rotate",
            FilterKind::InputGate => "Input gate",
            FilterKind::OutputGate => "Output gate",
            FilterKind::Crop => "Crop",
            FilterKind::Flip => "Flip",
            FilterKind::Median => "Median",
            FilterKind::DenoiseTemporal => "Denoise (temporal)",
            FilterKind::DenoiseNonlocalMeans => "Denoise (non-local means)",
            FilterKind::Sharpen => "Sharpen",
            FilterKind::UnsharpMask => "Unsharp mask",
            FilterKind::Decimate => "Decimate",
            FilterKind::DeltaHistogram => "Delta histogram",
            FilterKind::UniqueCount => "Unique count",
        }
    }

    /// Look a filter type up by its name.
    pub fn from_name(name: &str) -> Result<Self, GraphError> {
        FilterKind::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| GraphError::UnknownFilterName(name.to_string()))
    }

    /// Whether this kind is one of the chain-delimiting sentinels.
    pub fn is_gate(self) -> bool {
        matches!(self, FilterKind::InputGate | FilterKind::OutputGate)
    }

    /// The blob a freshly created instance of this kind starts with.
    pub fn default_params(self) -> [u8; PARAM_BLOB_LEN] {
        let mut p = [0u8; PARAM_BLOB_LEN];
        match self {
            FilterKind::Blur => {
                p[blur::KERNEL_SIZE] = 10;
                p[blur::TYPE] = blur::TYPE_GAUSSIAN;
            }
            FilterKind::Rotate => {
                write_i16(&mut p, rotate::ANGLE, 0);
                write_i16(&mut p, rotate::SCALE, 100);
            }
            FilterKind::InputGate => {
                write_u16(&mut p, gate::WIDTH, 640);
                write_u16(&mut p, gate::HEIGHT, 480);
            }
            FilterKind::OutputGate => {
                write_u16(&mut p, gate::WIDTH, 1920);
                write_u16(&mut p, gate::HEIGHT, 1080);
            }
            FilterKind::Crop => {
                write_u16(&mut p, crop::X, 0);
                write_u16(&mut p, crop::Y, 0);
                write_u16(&mut p, crop::WIDTH, 640);
                write_u16(&mut p, crop::HEIGHT, 480);
                p[crop::SCALER] = crop::SCALER_LINEAR;
            }
            FilterKind::Flip => {
                p[flip::AXIS] = flip::AXIS_VERTICAL;
            }
            FilterKind::Median => {
                p[median::KERNEL_SIZE] = 3;
            }
            FilterKind::DenoiseTemporal => {
                p[denoise_temporal::THRESHOLD] = 5;
            }
            FilterKind::DenoiseNonlocalMeans => {
                p[denoise_nlm::H] = 10;
                p[denoise_nlm::H_COLOR] = 10;
                p[denoise_nlm::TEMPLATE_WINDOW] = 7;
                p[denoise_nlm::SEARCH_WINDOW] = 21;
            }
            FilterKind::Sharpen | FilterKind::DeltaHistogram => {}
            FilterKind::UnsharpMask => {
                p[unsharp_mask::STRENGTH] = 50;
                p[unsharp_mask::RADIUS] = 10;
            }
            FilterKind::Decimate => {
                p[decimate::FACTOR] = 2;
                p[decimate::TYPE] = decimate::TYPE_AVERAGE;
            }
            FilterKind::UniqueCount => {
                p[unique_count::THRESHOLD] = 20;
                p[unique_count::CORNER] = unique_count::CORNER_TOP_LEFT;
            }
        }
        p
    }

    /// Typed field layout for this kind; a shell builds its edit controls
    /// from this instead of knowing filter internals.
    pub fn schema(self) -> &'static [ParamField] {
        match self {
            FilterKind::Blur => &[
                ParamField {
                    name: "Radius",
                    offset: blur::KERNEL_SIZE,
                    kind: FieldKind::U8,
                    min: 1,
                    max: 250,
                    hint: UiHint::TenthsSpinBox,
                },
                ParamField {
                    name: "Type",
                    offset: blur::TYPE,
                    kind: FieldKind::U8,
                    min: 0,
                    max: 1,
                    hint: UiHint::Dropdown(&["Box", "Gaussian"]),
                },
            ],
            FilterKind::Rotate => &[
                ParamField {
                    name: "Angle",
                    offset: rotate::ANGLE,
                    kind: FieldKind::I16,
                    min: -3600,
                    max: 3600,
                    hint: UiHint::TenthsSpinBox,
                },
                ParamField {
                    name: "Scale",
                    offset: rotate::SCALE,
                    kind: FieldKind::I16,
                    min: 0,
                    max: 2000,
                    hint: UiHint::HundredthsSpinBox,
                },
            ],
            FilterKind::InputGate | FilterKind::OutputGate => &[
                ParamField {
                    name: "Width",
                    offset: gate::WIDTH,
                    kind: FieldKind::U16,
                    min: 0,
                    max: u16::MAX as i32,
                    hint: UiHint::SpinBox,
                },
                ParamField {
                    name: "Height",
                    offset: gate::HEIGHT,
                    kind: FieldKind::U16,
                    min: 0,
                    max: u16::MAX as i32,
                    hint: UiHint::SpinBox,
                },
            ],
            FilterKind::Crop => &[
                ParamField {
                    name: "X",
                    offset: crop::X,
                    kind: FieldKind::U16,
                    min: 0,
                    max: u16::MAX as i32,
                    hint: UiHint::SpinBox,
                },
                ParamField {
                    name: "Y",
                    offset: crop::Y,
                    kind: FieldKind::U16,
                    min: 0,
                    max: u16::MAX as i32,
                    hint: UiHint::SpinBox,
                },
                ParamField {
                    name: "Width",
                    offset: crop::WIDTH,
                    kind: FieldKind::U16,
                    min: 1,
                    max: u16::MAX as i32,
                    hint: UiHint::SpinBox,
                },
                ParamField {
                    name: "Height",
                    offset: crop::HEIGHT,
                    kind: FieldKind::U16,
                    min: 1,
                    max: u16::MAX as i32,
                    hint: UiHint::SpinBox,
                },
                ParamField {
                    name: "Scaler",
                    offset: crop::SCALER,
                    kind: FieldKind::U8,
                    min: 0,
                    max: 2,
                    hint: UiHint::Dropdown(&["Linear", "Nearest", "(Don't scale)"]),
                },
            ],
            FilterKind::Flip => &[ParamField {
                name: "Axis",
                offset: flip::AXIS,
                kind: FieldKind::U8,
                min: 0,
                max: 2,
                hint: UiHint::Dropdown(&["Vertical", "Horizontal", "Both"]),
            }],
            FilterKind::Median => &[ParamField {
                name: "Radius",
                offset: median::KERNEL_SIZE,
                kind: FieldKind::U8,
                min: 0,
                max: 199,
                hint: UiHint::SpinBox,
            }],
            FilterKind::DenoiseTemporal => &[ParamField {
                name: "Threshold",
                offset: denoise_temporal::THRESHOLD,
                kind: FieldKind::U8,
                min: 0,
                max: 255,
                hint: UiHint::SpinBox,
            }],
            FilterKind::DenoiseNonlocalMeans => &[
                ParamField {
                    name: "Color",
                    offset: denoise_nlm::H_COLOR,
                    kind: FieldKind::U8,
                    min: 0,
                    max: 255,
                    hint: UiHint::SpinBox,
                },
                ParamField {
                    name: "Luminance",
                    offset: denoise_nlm::H,
                    kind: FieldKind::U8,
                    min: 0,
                    max: 255,
                    hint: UiHint::SpinBox,
                },
                ParamField {
                    name: "Search wnd.",
                    offset: denoise_nlm::SEARCH_WINDOW,
                    kind: FieldKind::U8,
                    min: 0,
                    max: 255,
                    hint: UiHint::SpinBox,
                },
                ParamField {
                    name: "Template wnd.",
                    offset: denoise_nlm::TEMPLATE_WINDOW,
                    kind: FieldKind::U8,
                    min: 0,
                    max: 255,
                    hint: UiHint::SpinBox,
                },
            ],
            FilterKind::Sharpen | FilterKind::DeltaHistogram => &[],
            FilterKind::UnsharpMask => &[
                ParamField {
                    name: "Strength",
                    offset: unsharp_mask::STRENGTH,
                    kind: FieldKind::U8,
                    min: 0,
                    max: 255,
                    hint: UiHint::SpinBox,
                },
                ParamField {
                    name: "Radius",
                    offset: unsharp_mask::RADIUS,
                    kind: FieldKind::U8,
                    min: 0,
                    max: 255,
                    hint: UiHint::TenthsSpinBox,
                },
            ],
            FilterKind::Decimate => &[
                ParamField {
                    name: "Factor",
                    offset: decimate::FACTOR,
                    kind: FieldKind::U8,
                    min: 2,
                    max: 16,
                    hint: UiHint::Dropdown(&["2", "4", "8", "16"]),
                },
                ParamField {
                    name: "Sampling",
                    offset: decimate::TYPE,
                    kind: FieldKind::U8,
                    min: 0,
                    max: 1,
                    hint: UiHint::Dropdown(&["Nearest", "Average"]),
                },
            ],
            FilterKind::UniqueCount => &[
                ParamField {
                    name: "Corner",
                    offset: unique_count::CORNER,
                    kind: FieldKind::U8,
                    min: 0,
                    max: 3,
                    hint: UiHint::Dropdown(&[
                        "Top left",
                        "Top right",
                        "Bottom right",
                        "Bottom left",
                    ]),
                },
                ParamField {
                    name: "Threshold",
                    offset: unique_count::THRESHOLD,
                    kind: FieldKind::U8,
                    min: 0,
                    max: 255,
                    hint: UiHint::SpinBox,
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_for_the_whole_catalogue() {
        for kind in FilterKind::ALL {
            assert_eq!(FilterKind::from_name(kind.name()).unwrap(), kind);
        }
        assert!(FilterKind::from_name("Emboss").is_err());
    }

    #[test]
    fn schema_fields_fit_the_blob() {
        for kind in FilterKind::ALL {
            for field in kind.schema() {
                let width = match field.kind {
                    FieldKind::U8 => 1,
                    FieldKind::U16 | FieldKind::I16 => 2,
                };
                assert!(field.offset + width <= PARAM_BLOB_LEN);
            }
        }
    }

    #[test]
    fn gate_defaults_carry_their_resolutions() {
        let input = FilterKind::InputGate.default_params();
        assert_eq!(read_u16(&input, gate::WIDTH), 640);
        assert_eq!(read_u16(&input, gate::HEIGHT), 480);
        let output = FilterKind::OutputGate.default_params();
        assert_eq!(read_u16(&output, gate::WIDTH), 1920);
        assert_eq!(read_u16(&output, gate::HEIGHT), 1080);
    }

    #[test]
    fn rotate_defaults_to_unit_scale() {
        let p = FilterKind::Rotate.default_params();
        assert_eq!(read_i16(&p, rotate::ANGLE), 0);
        assert_eq!(read_i16(&p, rotate::SCALE), 100);
    }
}
