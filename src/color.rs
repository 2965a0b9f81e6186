use std::fmt;

/// An opaque sRGB color, snapshotted from markup or configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const TEXT: Color = Color::rgb(0x1f, 0x1f, 0x1f);
    pub const MUTED: Color = Color::rgb(0x6b, 0x6b, 0x6b);
    pub const LINK: Color = Color::rgb(0x1a, 0x4f, 0x8b);
    pub const RULE: Color = Color::rgb(0xd0, 0xd0, 0xd0);
    pub const CODE_BACKGROUND: Color = Color::rgb(0xf6, 0xf8, 0xfa);
    pub const INLINE_CODE_BACKGROUND: Color = Color::rgb(0xec, 0xee, 0xf1);
    pub const BUBBLE_BACKGROUND: Color = Color::rgb(0xf4, 0xf4, 0xf4);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse a CSS color value. Fully transparent colors resolve to `None`,
    /// which callers treat the same as an unset property.
    pub fn parse(value: &str) -> Option<Color> {
        let value = value.trim();
        if value.is_empty()
            || value.eq_ignore_ascii_case("transparent")
            || value.eq_ignore_ascii_case("inherit")
            || value.eq_ignore_ascii_case("initial")
            || value.eq_ignore_ascii_case("currentcolor")
        {
            return None;
        }
        let parsed = csscolorparser::parse(value).ok()?;
        let [r, g, b, a] = parsed.to_rgba8();
        if a == 0 {
            return None;
        }
        Some(Color::rgb(r, g, b))
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
