//! Annotation colors.
//!
//! The vision extractor cycles through a fixed bank when outlining
//! regions so adjacent regions stay visually distinct. `parse_color`
//! additionally accepts `#rrggbb` hex strings for user-supplied colors.

use image::Rgb;

use crate::error::CoreError;

/// Named colors cycled through when annotating regions.
pub const COLOR_BANK: &[(&str, Rgb<u8>)] = &[
    ("blue", Rgb([0, 0, 255])),
    ("orange", Rgb([255, 165, 0])),
    ("green", Rgb([0, 128, 0])),
    ("purple", Rgb([128, 0, 128])),
    ("pink", Rgb([255, 192, 203])),
    ("cyan", Rgb([0, 255, 255])),
];

/// Outline color for bounding boxes.
pub const BOX_OUTLINE: Rgb<u8> = Rgb([255, 0, 0]);

/// Pick a bank color for the region at `index` (wraps around).
pub fn bank_color(index: usize) -> Rgb<u8> {
    COLOR_BANK[index % COLOR_BANK.len()].1
}

/// Parse a color string: a bank name or a `#rrggbb` hex triplet.
pub fn parse_color(input: &str) -> Result<Rgb<u8>, CoreError> {
    let trimmed = input.trim();
    if let Some(hex) = trimmed.strip_prefix('#') {
        if hex.len() == 6 {
            if let (Ok(r), Ok(g), Ok(b)) = (
                u8::from_str_radix(&hex[0..2], 16),
                u8::from_str_radix(&hex[2..4], 16),
                u8::from_str_radix(&hex[4..6], 16),
            ) {
                return Ok(Rgb([r, g, b]));
            }
        }
        return Err(CoreError::UnknownColor(input.to_string()));
    }

    let lower = trimmed.to_ascii_lowercase();
    COLOR_BANK
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, rgb)| *rgb)
        .ok_or_else(|| CoreError::UnknownColor(input.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn named_colors_resolve() {
        assert_eq!(parse_color("cyan").unwrap(), Rgb([0, 255, 255]));
        assert_eq!(parse_color(" Blue ").unwrap(), Rgb([0, 0, 255]));
    }

    #[test]
    fn hex_colors_resolve() {
        assert_eq!(parse_color("#ff8000").unwrap(), Rgb([255, 128, 0]));
    }

    #[test]
    fn invalid_colors_rejected() {
        assert_matches!(parse_color("chartreuse"), Err(CoreError::UnknownColor(_)));
        assert_matches!(parse_color("#zzz"), Err(CoreError::UnknownColor(_)));
    }

    #[test]
    fn bank_wraps() {
        assert_eq!(bank_color(0), bank_color(COLOR_BANK.len()));
    }
}
