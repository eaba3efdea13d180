//! Device selection expressions
//!
//! `"all"` or a comma separated list of `micN` and `micA-micB` tokens.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::DeviceSelection;
use crate::error::ValidationError;

const ALL: &str = "all";

static TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^mic(\d{1,3})(?:-mic(\d{1,3}))?$").expect("device token pattern is valid")
});

/// Expand `expression` into the devices it names among `total` detected ones
pub fn expand(expression: &str, total: u32) -> Result<DeviceSelection, ValidationError> {
    let expression = expression.trim();
    if expression == ALL {
        return Ok(DeviceSelection::from_sorted(0..total));
    }

    let tokens: Vec<&str> = expression.split(',').map(str::trim).collect();
    if tokens.contains(&ALL) {
        return Err(ValidationError::AllCombined);
    }

    let invalid: Vec<String> = tokens
        .iter()
        .filter(|t| !TOKEN.is_match(t))
        .map(|t| format!("'{}'", t))
        .collect();
    if !invalid.is_empty() {
        return Err(ValidationError::InvalidDeviceList(invalid));
    }

    let mut indices = BTreeSet::new();
    for token in tokens {
        let (lo, hi) = bounds(token)?;
        if hi >= total {
            return Err(ValidationError::DeviceOutOfRange);
        }
        indices.extend(lo..=hi);
    }

    debug!(expression, ?indices, "expanded device selection");
    Ok(DeviceSelection::from_sorted(indices))
}

/// Inclusive ordinal range of one token, swapped when reversed
fn bounds(token: &str) -> Result<(u32, u32), ValidationError> {
    let invalid = || ValidationError::InvalidDeviceList(vec![format!("'{}'", token)]);
    let caps = TOKEN.captures(token).ok_or_else(invalid)?;

    let first: u32 = caps[1].parse().map_err(|_| invalid())?;
    let second: u32 = match caps.get(2) {
        Some(m) => m.as_str().parse().map_err(|_| invalid())?,
        None => first,
    };
    Ok((first.min(second), first.max(second)))
}
