use thiserror::Error;

/// Rendered when a bulb is powered off, regardless of its color state.
pub const OFF_COLOR: u32 = 0x888888;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ColorError {
    #[error("color temperature must be at least 600")]
    ColorTemperatureTooLow,
    #[error("hue must be in 0..=359 and sat in 0..=100")]
    HueSatOutOfRange,
}

/**
Approximates the RGB color of a black body at the given temperature (kelvin).

The red channel is pinned at `0xff`; green and blue follow logarithmic
curves of the temperature expressed in hundreds of kelvin. Below a
1900K-equivalent the blue channel floors at zero. Temperatures under 600K
are rejected.
*/
pub fn color_temperature_to_rgb(color_temperature: i64) -> Result<u32, ColorError> {
    if color_temperature < 600 {
        return Err(ColorError::ColorTemperatureTooLow);
    }

    // Hundreds of kelvin, truncated.
    let coeff = color_temperature / 100;

    let green = 99.4708025861 * (coeff as f64).ln() - 161.1195681661;
    let blue = if coeff > 19 {
        138.5177312231 * ((coeff - 10) as f64).ln() - 305.0447927307
    } else {
        0.0
    };

    Ok(0xff0000 | (round_channel(green) << 8) | round_channel(blue))
}

/**
Converts a hue (0..=359 degrees) and a saturation (0..=100 percent) into an
RGB value using the classic six-sector HSV decomposition at full value.

The sector coefficients stay in the 0..=100 percentage domain and are only
scaled to 0..=255 at the end, so the output is deterministic integer math.
*/
pub fn huesat_to_rgb(hue: i64, sat: i64) -> Result<u32, ColorError> {
    if !(0..=359).contains(&hue) || !(0..=100).contains(&sat) {
        return Err(ColorError::HueSatOutOfRange);
    }

    let hi = (hue / 60) % 6;
    let vmin = 100 - sat;
    let a = (100 - vmin) * (hue % 60) / 60;
    let vinc = vmin + a;
    let vdec = 100 - a;

    let [red, green, blue] = match hi {
        0 => [100, vinc, vmin],
        1 => [vdec, 100, vmin],
        2 => [vmin, 100, vinc],
        3 => [vmin, vdec, 100],
        4 => [vinc, vmin, 100],
        _ => [100, vmin, vdec],
    };

    Ok((scale_channel(red) << 16) | (scale_channel(green) << 8) | scale_channel(blue))
}

fn round_channel(value: f64) -> u32 {
    value.round().clamp(0.0, 255.0) as u32
}

fn scale_channel(percentage: i64) -> u32 {
    (percentage * 255 / 100) as u32
}
