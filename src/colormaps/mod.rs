//! Color-scale handling for legends and client-rendered layers.
//!
//! Named palettes are resolved through a fixed registry; literal color
//! arrays are interpolated directly. Both regimes feed the legend
//! builder and the selector payloads handed to the rendering collaborator.

pub mod legend;
pub mod palette;

pub use legend::{build_legend, ColorSpec, Legend, Swatch};
pub use palette::{all_color_scales, named_gradient, sample_rgb};
