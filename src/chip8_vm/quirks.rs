use std::env;

/// Behaviours where ROMs written for this interpreter disagree with the
/// canonical CHIP-8 reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chip8Quirks {
    /// `Bnnn` adds `nnn + V0` to the already advanced program counter
    /// instead of jumping to `nnn + V0`.
    pub jump_adds_to_pc: bool,
    /// `Fx29` points `I` at `FONT_START + Vx` instead of `FONT_START + Vx * 5`.
    pub font_glyph_unscaled: bool,
    /// `Ex9E` skips when the key is up and `ExA1` skips when it is down.
    pub key_skip_inverted: bool,
}

pub const ORIGINAL_QUIRKS: Chip8Quirks = Chip8Quirks {
    jump_adds_to_pc: true,
    font_glyph_unscaled: true,
    key_skip_inverted: true,
};

pub const MODERN_QUIRKS: Chip8Quirks = Chip8Quirks {
    jump_adds_to_pc: false,
    font_glyph_unscaled: false,
    key_skip_inverted: false,
};

impl Default for Chip8Quirks {
    fn default() -> Self {
        ORIGINAL_QUIRKS
    }
}

pub fn load_quirks_profile(profile: &str) -> Result<Chip8Quirks, String> {
    match profile.trim().to_ascii_lowercase().as_str() {
        "original" => Ok(ORIGINAL_QUIRKS),
        "modern" => Ok(MODERN_QUIRKS),
        other => Err(format!(
            "invalid quirks profile '{other}', expected one of: modern, original"
        )),
    }
}

pub fn load_quirks_profile_from_env() -> Result<(String, Chip8Quirks), String> {
    let profile = env::var("CHIP8_QUIRKS").unwrap_or_else(|_| "original".to_owned());
    let normalized = profile.trim().to_ascii_lowercase();
    let quirks = load_quirks_profile(&normalized)?;
    Ok((normalized, quirks))
}
