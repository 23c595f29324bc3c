//! Pure derived-metric functions. No I/O, no state: every channel here is
//! computed fresh on read from the raw reading.

const COMPASS_POINTS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

/// 16-point compass direction for a heading in degrees.
pub fn cardinal_direction(deg: f64) -> &'static str {
    let normalized = ((deg % 360.0) + 360.0) % 360.0;
    let index = (((normalized + 11.25) / 22.5).floor() as i64).rem_euclid(16) as usize;
    COMPASS_POINTS[index]
}

/// Dew point in °F via the Magnus-Tetens approximation, computed in Celsius.
pub fn dew_point_f(temp_f: f64, rh_pct: f64) -> f64 {
    let temp_c = (temp_f - 32.0) * 5.0 / 9.0;
    let rh = rh_pct.clamp(0.1, 100.0);
    const A: f64 = 17.27;
    const B: f64 = 237.7;
    let alpha = (A * temp_c) / (B + temp_c) + (rh / 100.0).ln();
    let dew_c = (B * alpha) / (A - alpha);
    dew_c * 9.0 / 5.0 + 32.0
}

/// NWS wind chill, valid for `temp_f <= 50` and `wind_mph >= 3`.
fn wind_chill_f(temp_f: f64, wind_mph: f64) -> f64 {
    let v = wind_mph.powf(0.16);
    35.74 + 0.6215 * temp_f - 35.75 * v + 0.4275 * temp_f * v
}

/// Rothfusz heat index regression, valid for `temp_f >= 80`.
fn heat_index_f(temp_f: f64, rh_pct: f64) -> f64 {
    let t = temp_f;
    let r = rh_pct;
    -42.379 + 2.04901523 * t + 10.14333127 * r - 0.22475541 * t * r - 0.00683783 * t * t
        - 0.05481717 * r * r
        + 0.00122874 * t * t * r
        + 0.00085282 * t * r * r
        - 0.00000199 * t * t * r * r
}

/// Apparent temperature: wind chill when cold and windy, heat index when hot,
/// the raw reading otherwise.
pub fn feels_like(temp_f: f64, rh_pct: f64, wind_mph: f64) -> f64 {
    if temp_f <= 50.0 && wind_mph >= 3.0 {
        wind_chill_f(temp_f, wind_mph)
    } else if temp_f >= 80.0 {
        heat_index_f(temp_f, rh_pct)
    } else {
        temp_f
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkyCondition {
    Night,
    Unknown,
    Clear,
    PartlyCloudy,
    Cloudy,
}

impl SkyCondition {
    pub fn as_str(self) -> &'static str {
        match self {
            SkyCondition::Night => "NIGHT",
            SkyCondition::Unknown => "UNKNOWN",
            SkyCondition::Clear => "CLEAR",
            SkyCondition::PartlyCloudy => "PARTLY_CLOUDY",
            SkyCondition::Cloudy => "CLOUDY",
        }
    }
}

/// Classify sky condition from solar radiation against the clear-sky potential
/// for the current sun angle.
pub fn sky_condition(radiation: f64, potential_radiation: f64) -> SkyCondition {
    if potential_radiation < 10.0 {
        return SkyCondition::Night;
    }
    if radiation <= 0.0 {
        return SkyCondition::Unknown;
    }
    let pct = 100.0 * radiation / potential_radiation;
    if pct >= 80.0 {
        SkyCondition::Clear
    } else if pct >= 40.0 {
        SkyCondition::PartlyCloudy
    } else {
        SkyCondition::Cloudy
    }
}

struct Breakpoint {
    c_lo: f64,
    c_hi: f64,
    i_lo: f64,
    i_hi: f64,
}

const PM25_BREAKPOINTS: [Breakpoint; 7] = [
    Breakpoint { c_lo: 0.0, c_hi: 12.0, i_lo: 0.0, i_hi: 50.0 },
    Breakpoint { c_lo: 12.1, c_hi: 35.4, i_lo: 51.0, i_hi: 100.0 },
    Breakpoint { c_lo: 35.5, c_hi: 55.4, i_lo: 101.0, i_hi: 150.0 },
    Breakpoint { c_lo: 55.5, c_hi: 150.4, i_lo: 151.0, i_hi: 200.0 },
    Breakpoint { c_lo: 150.5, c_hi: 250.4, i_lo: 201.0, i_hi: 300.0 },
    Breakpoint { c_lo: 250.5, c_hi: 350.4, i_lo: 301.0, i_hi: 400.0 },
    Breakpoint { c_lo: 350.5, c_hi: 500.4, i_lo: 401.0, i_hi: 500.0 },
];

const PM10_BREAKPOINTS: [Breakpoint; 7] = [
    Breakpoint { c_lo: 0.0, c_hi: 54.0, i_lo: 0.0, i_hi: 50.0 },
    Breakpoint { c_lo: 55.0, c_hi: 154.0, i_lo: 51.0, i_hi: 100.0 },
    Breakpoint { c_lo: 155.0, c_hi: 254.0, i_lo: 101.0, i_hi: 150.0 },
    Breakpoint { c_lo: 255.0, c_hi: 354.0, i_lo: 151.0, i_hi: 200.0 },
    Breakpoint { c_lo: 355.0, c_hi: 424.0, i_lo: 201.0, i_hi: 300.0 },
    Breakpoint { c_lo: 425.0, c_hi: 504.0, i_lo: 301.0, i_hi: 400.0 },
    Breakpoint { c_lo: 505.0, c_hi: 604.0, i_lo: 401.0, i_hi: 500.0 },
];

fn aqi_from_breakpoints(conc: f64, table: &[Breakpoint]) -> f64 {
    if conc <= 0.0 {
        return 0.0;
    }
    for bp in table {
        if conc <= bp.c_hi {
            return (bp.i_hi - bp.i_lo) / (bp.c_hi - bp.c_lo) * (conc - bp.c_lo) + bp.i_lo;
        }
    }
    let top = &table[table.len() - 1];
    (top.i_hi - top.i_lo) / (top.c_hi - top.c_lo) * (conc - top.c_lo) + top.i_lo
}

/// EPA AQI for PM2.5. Callers should prefer a pre-computed `aqi_pm25` channel
/// on the reading when present; this is the fallback.
pub fn aqi_pm25(conc_ugm3: f64) -> f64 {
    aqi_from_breakpoints(conc_ugm3, &PM25_BREAKPOINTS)
}

/// EPA AQI for PM10.
pub fn aqi_pm10(conc_ugm3: f64) -> f64 {
    aqi_from_breakpoints(conc_ugm3, &PM10_BREAKPOINTS)
}

const MM_PER_INCH: f64 = 25.4;

pub fn mm_to_in(mm: f64) -> f64 {
    mm / MM_PER_INCH
}

pub fn in_to_mm(inches: f64) -> f64 {
    inches * MM_PER_INCH
}

/// Current-reading mm→in conversion with a 0.1" noise floor: anything below
/// the floor reports as zero rather than showing sensor jitter. Totals never
/// use this — they convert with [`mm_to_in`] directly.
pub fn mm_to_in_reading(mm: f64) -> f64 {
    let inches = mm_to_in(mm);
    if inches.abs() < 0.1 {
        0.0
    } else {
        inches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cardinal_direction_boundaries() {
        assert_eq!(cardinal_direction(0.0), "N");
        assert_eq!(cardinal_direction(11.24), "N");
        assert_eq!(cardinal_direction(11.26), "NNE");
        assert_eq!(cardinal_direction(180.0), "S");
        assert_eq!(cardinal_direction(359.0), "N");
    }

    #[test]
    fn feels_like_picks_regime() {
        assert_eq!(feels_like(30.0, 50.0, 0.0), 30.0);
        assert!(feels_like(30.0, 50.0, 10.0) < 30.0);
        assert!(feels_like(90.0, 60.0, 5.0) > 90.0);
        assert_eq!(feels_like(65.0, 40.0, 5.0), 65.0);
    }

    #[test]
    fn sky_condition_thresholds() {
        assert_eq!(sky_condition(0.0, 5.0), SkyCondition::Night);
        assert_eq!(sky_condition(0.0, 500.0), SkyCondition::Unknown);
        assert_eq!(sky_condition(450.0, 500.0), SkyCondition::Clear);
        assert_eq!(sky_condition(250.0, 500.0), SkyCondition::PartlyCloudy);
        assert_eq!(sky_condition(50.0, 500.0), SkyCondition::Cloudy);
    }

    #[test]
    fn aqi_zero_at_zero() {
        assert_eq!(aqi_pm25(0.0), 0.0);
        assert_eq!(aqi_pm10(-5.0), 0.0);
    }

    #[test]
    fn aqi_continuous_at_breakpoint() {
        let just_below = aqi_pm25(12.0);
        let just_above = aqi_pm25(12.1);
        assert!((just_below - 50.0).abs() < 0.5);
        assert!((just_above - 51.0).abs() < 0.5);
    }

    #[test]
    fn mm_in_round_trip() {
        assert!((mm_to_in(in_to_mm(2.5)) - 2.5).abs() < 1e-9);
    }

    #[test]
    fn mm_to_in_reading_noise_floor() {
        assert_eq!(mm_to_in_reading(1.0), 0.0);
        assert!(mm_to_in_reading(5.0) > 0.0);
    }
}
