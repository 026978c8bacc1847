//! Job parameters accepted by the primitive service, with defaults and
//! validation.
//!
//! Field names on the wire are the single-letter flags of the underlying
//! `primitive` tool (`n`, `m`, `s`, ...). [`JobParameters::form_fields`]
//! produces them in the order the service documents.

use std::fmt;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

pub const DEFAULT_SHAPE_COUNT: u32 = 100;
pub const DEFAULT_OUTPUT_SIZE: u32 = 1024;
pub const DEFAULT_RESAMPLE_SIZE: u32 = 256;
pub const DEFAULT_ALPHA: u8 = 128;
/// Highest verbosity level the service understands.
pub const MAX_VERBOSITY: u8 = 2;

/// Upload extensions the service accepts (lower-case, with dot).
pub const ALLOWED_UPLOAD_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg"];

/// Wire value asking the service to start from the average input colour.
pub const BACKGROUND_AVERAGE: &str = "avg";

// ---------------------------------------------------------------------------
// Shape mode
// ---------------------------------------------------------------------------

/// Shape family the fitter draws with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ShapeMode {
    /// Mix of all shape families.
    Combo = 0,
    #[default]
    Triangle = 1,
    Rectangle = 2,
    Ellipse = 3,
    Circle = 4,
    RotatedRectangle = 5,
    Beziers = 6,
    RotatedEllipse = 7,
    Polygon = 8,
}

impl ShapeMode {
    /// Numeric mode sent in the `m` field.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ShapeMode {
    type Error = CoreError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Combo,
            1 => Self::Triangle,
            2 => Self::Rectangle,
            3 => Self::Ellipse,
            4 => Self::Circle,
            5 => Self::RotatedRectangle,
            6 => Self::Beziers,
            7 => Self::RotatedEllipse,
            8 => Self::Polygon,
            other => {
                return Err(CoreError::Validation(format!(
                    "Invalid shape mode {other}. Must be between 0 and 8"
                )))
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Background
// ---------------------------------------------------------------------------

/// Initial canvas colour.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Background {
    /// Average colour of the input image.
    #[default]
    Average,
    /// Explicit colour, passed through verbatim (e.g. `FFFFFF`).
    Color(String),
}

impl Background {
    /// Parse the wire form: `avg` selects [`Background::Average`], anything
    /// else is taken as an explicit colour.
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case(BACKGROUND_AVERAGE) {
            Self::Average
        } else {
            Self::Color(trimmed.to_string())
        }
    }

    /// Value sent in the `bg` field.
    pub fn as_wire(&self) -> &str {
        match self {
            Self::Average => BACKGROUND_AVERAGE,
            Self::Color(c) => c,
        }
    }
}

impl fmt::Display for Background {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Configuration for one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobParameters {
    /// Number of shapes to fit (`n`, >= 1).
    pub shape_count: u32,
    /// Shape family (`m`).
    pub shape_mode: ShapeMode,
    /// Pixel size of the rendered output (`s`, >= 1).
    pub output_size: u32,
    /// Pixel size the input is rescaled to before fitting (`r`, >= 1).
    pub resample_size: u32,
    /// Shape opacity (`a`); 0 lets the algorithm pick per shape.
    pub alpha: u8,
    /// Starting background (`bg`).
    pub background: Background,
    /// Extra shapes attempted per iteration (`rep`).
    pub repeat_count: u32,
    /// Save a frame every N shapes (`nth`). `None` persists no frames.
    pub frame_interval: Option<u32>,
    /// Desired parallelism (`j`); 0 means all available cores.
    pub worker_count: u32,
    /// Log detail requested from the service (`v`, 0-2).
    pub verbosity: u8,
}

impl Default for JobParameters {
    fn default() -> Self {
        Self {
            shape_count: DEFAULT_SHAPE_COUNT,
            shape_mode: ShapeMode::default(),
            output_size: DEFAULT_OUTPUT_SIZE,
            resample_size: DEFAULT_RESAMPLE_SIZE,
            alpha: DEFAULT_ALPHA,
            background: Background::default(),
            repeat_count: 0,
            frame_interval: None,
            worker_count: 0,
            verbosity: 0,
        }
    }
}

impl JobParameters {
    /// Check every constraint, failing on the first violated one.
    pub fn validate(&self) -> Result<(), CoreError> {
        require_positive("shape_count", self.shape_count)?;
        require_positive("output_size", self.output_size)?;
        require_positive("resample_size", self.resample_size)?;
        if let Some(nth) = self.frame_interval {
            require_positive("frame_interval", nth)?;
        }
        if self.verbosity > MAX_VERBOSITY {
            return Err(CoreError::Validation(format!(
                "verbosity must be between 0 and {MAX_VERBOSITY}, got {}",
                self.verbosity
            )));
        }
        if let Background::Color(color) = &self.background {
            if color.is_empty() || color.chars().any(char::is_whitespace) {
                return Err(CoreError::Validation(format!(
                    "background colour '{color}' must be a non-empty value without whitespace"
                )));
            }
        }
        Ok(())
    }

    /// Stringified multipart fields, in wire order. `nth` is omitted when no
    /// frame interval is set.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("n", self.shape_count.to_string()),
            ("m", self.shape_mode.as_u8().to_string()),
            ("s", self.output_size.to_string()),
            ("r", self.resample_size.to_string()),
            ("a", self.alpha.to_string()),
            ("bg", self.background.to_string()),
            ("rep", self.repeat_count.to_string()),
        ];
        if let Some(nth) = self.frame_interval {
            fields.push(("nth", nth.to_string()));
        }
        fields.push(("j", self.worker_count.to_string()));
        fields.push(("v", self.verbosity.to_string()));
        fields
    }
}

fn require_positive(field: &str, value: u32) -> Result<(), CoreError> {
    if value == 0 {
        return Err(CoreError::Validation(format!(
            "{field} must be at least 1"
        )));
    }
    Ok(())
}

/// Reject uploads whose extension the service would refuse.
pub fn validate_upload_filename(filename: &str) -> Result<(), CoreError> {
    let lower = filename.to_ascii_lowercase();
    if ALLOWED_UPLOAD_EXTENSIONS
        .iter()
        .any(|ext| lower.ends_with(ext) && lower.len() > ext.len())
    {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Unsupported upload '{filename}'. Must end with one of: {}",
            ALLOWED_UPLOAD_EXTENSIONS.join(", ")
        )))
    }
}
