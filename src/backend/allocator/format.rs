//! Format info tables for DRM formats.
//!
//! [`has_alpha`] returns true if the format has an alpha channel.
//!
//! ```
//! # use plane_allocator::backend::allocator::Fourcc;
//! # use plane_allocator::backend::allocator::format::has_alpha;
//! assert!(has_alpha(Fourcc::Argb8888));
//! assert!(!has_alpha(Fourcc::Xrgb8888));
//! ```
//!
//! [`get_bpp`] returns the number of bits per pixel of a format.

use indexmap::IndexSet;

use super::{Format, Fourcc, Modifier};

/// Set of fourcc/modifier pairs, in advertisement order
pub type FormatSet = IndexSet<Format>;

macro_rules! format_tables {
    ($($fourcc: ident { alpha: $alpha: expr, bpp: $bpp: expr $(,)? }),* $(,)?) => {
        /// Returns true if the format has an alpha channel.
        ///
        /// Unknown formats will always return `false`.
        pub const fn has_alpha(fourcc: Fourcc) -> bool {
            match fourcc {
                $(Fourcc::$fourcc => $alpha,)*
                _ => false,
            }
        }

        /// Returns the bits per pixel of the specified format.
        ///
        /// Unknown formats will always return [`None`].
        pub const fn get_bpp(fourcc: Fourcc) -> Option<usize> {
            match fourcc {
                $(Fourcc::$fourcc => Some($bpp),)*
                _ => None,
            }
        }
    };
}

format_tables! {
    Rgb565 { alpha: false, bpp: 16 },
    Argb1555 { alpha: true, bpp: 16 },
    Xrgb1555 { alpha: false, bpp: 16 },
    Argb4444 { alpha: true, bpp: 16 },
    Xrgb4444 { alpha: false, bpp: 16 },
    Rgb888 { alpha: false, bpp: 24 },
    Bgr888 { alpha: false, bpp: 24 },
    Argb8888 { alpha: true, bpp: 32 },
    Xrgb8888 { alpha: false, bpp: 32 },
    Abgr8888 { alpha: true, bpp: 32 },
    Xbgr8888 { alpha: false, bpp: 32 },
    Rgba8888 { alpha: true, bpp: 32 },
    Rgbx8888 { alpha: false, bpp: 32 },
    Bgra8888 { alpha: true, bpp: 32 },
    Bgrx8888 { alpha: false, bpp: 32 },
    Argb2101010 { alpha: true, bpp: 32 },
    Xrgb2101010 { alpha: false, bpp: 32 },
    Abgr2101010 { alpha: true, bpp: 32 },
    Xbgr2101010 { alpha: false, bpp: 32 },
    Abgr16161616f { alpha: true, bpp: 64 },
    Xbgr16161616f { alpha: false, bpp: 64 },
}

/// Whether `formats` can handle a buffer of `format`
///
/// Buffers with an implicit modifier ([`Modifier::Invalid`]) are accepted by any
/// entry with the same fourcc, the driver picks the layout in that case.
pub fn format_supported(formats: &FormatSet, format: Format) -> bool {
    if format.modifier == Modifier::Invalid {
        formats.iter().any(|f| f.code == format.code)
    } else {
        formats.contains(&format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn implicit_modifier_matches_any_layout() {
        let formats: FormatSet = [Format {
            code: Fourcc::Xrgb8888,
            modifier: Modifier::Linear,
        }]
        .into_iter()
        .collect();

        assert!(format_supported(
            &formats,
            Format {
                code: Fourcc::Xrgb8888,
                modifier: Modifier::Invalid
            }
        ));
        assert!(!format_supported(
            &formats,
            Format {
                code: Fourcc::Xrgb8888,
                modifier: Modifier::I915_x_tiled
            }
        ));
        assert!(!format_supported(
            &formats,
            Format {
                code: Fourcc::Argb8888,
                modifier: Modifier::Invalid
            }
        ));
    }

    #[test]
    fn alpha_table() {
        assert!(has_alpha(Fourcc::Argb8888));
        assert!(!has_alpha(Fourcc::Xrgb8888));
        assert_eq!(get_bpp(Fourcc::Rgb565), Some(16));
    }
}
