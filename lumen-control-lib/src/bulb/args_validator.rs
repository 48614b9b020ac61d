//! Stateless range and shape checks for every command parameter.
//!
//! Each check fails with [`BulbError::InvalidArgument`] naming the violated
//! constraint; nothing here touches the network or the cache.

use std::collections::HashMap;
use std::net::IpAddr;

use super::BulbError;

pub fn check_initial_data(data: &HashMap<String, String>) -> Result<(), BulbError> {
    for key in ["id", "Location", "support"] {
        match data.get(key) {
            Some(value) if !value.trim().is_empty() => {}
            _ => {
                return Err(BulbError::WrongDataFormat(format!(
                    "the advertisement carries no {}",
                    key
                )))
            }
        }
    }
    Ok(())
}

pub fn check_duration(duration: i64) -> Result<(), BulbError> {
    if duration >= 0 {
        return Ok(());
    }
    Err(BulbError::InvalidArgument(
        "duration must be an integer >= 0".to_string(),
    ))
}

pub fn check_brightness(brightness: i64) -> Result<(), BulbError> {
    if (1..=100).contains(&brightness) {
        return Ok(());
    }
    Err(BulbError::InvalidArgument(
        "brightness must be in 1..=100".to_string(),
    ))
}

pub fn check_color_temperature(color_temperature: i64) -> Result<(), BulbError> {
    if (1700..=6500).contains(&color_temperature) {
        return Ok(());
    }
    Err(BulbError::InvalidArgument(
        "color temperature must be in 1700..=6500".to_string(),
    ))
}

pub fn check_hue(hue: i64) -> Result<(), BulbError> {
    if (0..=359).contains(&hue) {
        return Ok(());
    }
    Err(BulbError::InvalidArgument(
        "hue must be in 0..=359".to_string(),
    ))
}

pub fn check_sat(sat: i64) -> Result<(), BulbError> {
    if (0..=100).contains(&sat) {
        return Ok(());
    }
    Err(BulbError::InvalidArgument(
        "sat must be in 0..=100".to_string(),
    ))
}

pub fn check_rgb(rgb: i64) -> Result<(), BulbError> {
    if (0x000001..=0xffffff).contains(&rgb) {
        return Ok(());
    }
    Err(BulbError::InvalidArgument(
        "rgb must be in 0x000001..=0xffffff".to_string(),
    ))
}

/// Delayed-shutdown delay; zero means "cancel".
pub fn check_timeout(minutes: i64) -> Result<(), BulbError> {
    if (0..=1440).contains(&minutes) {
        return Ok(());
    }
    Err(BulbError::InvalidArgument(
        "minutes must be in 0..=1440".to_string(),
    ))
}

pub fn check_percentage(percentage: i64) -> Result<(), BulbError> {
    if (-100..=100).contains(&percentage) && percentage != 0 {
        return Ok(());
    }
    Err(BulbError::InvalidArgument(
        "percentage must be in -100..=-1 or 1..=100".to_string(),
    ))
}

pub fn check_cf_count(count: i64) -> Result<(), BulbError> {
    if count >= 0 {
        return Ok(());
    }
    Err(BulbError::InvalidArgument(
        "flow count must be >= 0".to_string(),
    ))
}

/**
Validates a color-flow expression: a flat sequence of
`duration, mode, value, brightness` quadruples. The value slot is checked as
an RGB when the mode is color (1) and as a color temperature when the mode
is temperature (2); the brightness slot is ignored for sleep (7) steps.
*/
pub fn check_cf_expression(expression: &[i64]) -> Result<(), BulbError> {
    if expression.is_empty() {
        return Err(BulbError::InvalidArgument(
            "flow expression must not be blank".to_string(),
        ));
    }
    if expression.len() % 4 != 0 {
        return Err(BulbError::InvalidArgument(
            "flow expression must contain n*4 elements".to_string(),
        ));
    }

    for slice in expression.chunks_exact(4) {
        let (duration, mode, value, brightness) = (slice[0], slice[1], slice[2], slice[3]);
        check_cf_duration(duration)?;
        check_cf_mode(mode)?;
        match mode {
            1 => check_rgb(value)?,
            2 => check_color_temperature(value)?,
            _ => {}
        }
        if mode != 7 {
            check_cf_brightness(brightness)?;
        }
    }
    Ok(())
}

fn check_cf_duration(duration: i64) -> Result<(), BulbError> {
    if duration >= 50 {
        return Ok(());
    }
    Err(BulbError::InvalidArgument(
        "flow step duration must be an integer >= 50".to_string(),
    ))
}

fn check_cf_mode(mode: i64) -> Result<(), BulbError> {
    if [1, 2, 7].contains(&mode) {
        return Ok(());
    }
    Err(BulbError::InvalidArgument(
        "flow step mode must be 1, 2 or 7".to_string(),
    ))
}

fn check_cf_brightness(brightness: i64) -> Result<(), BulbError> {
    if (-1..=100).contains(&brightness) {
        return Ok(());
    }
    Err(BulbError::InvalidArgument(
        "flow step brightness must be in -1..=100".to_string(),
    ))
}

pub fn check_host(host: &str) -> Result<(), BulbError> {
    if host.parse::<IpAddr>().is_ok() {
        return Ok(());
    }
    Err(BulbError::InvalidArgument(format!(
        "'{}' is not a valid host address",
        host
    )))
}

pub fn check_port(port: u16) -> Result<(), BulbError> {
    if port >= 1 {
        return Ok(());
    }
    Err(BulbError::InvalidArgument(
        "port must be in 1..=65535".to_string(),
    ))
}
