//! Metric formulas.
//!
//! Pure functions of their inputs. Undefined results are `None`, never
//! infinity or NaN.

use serde::Serialize;

/// Minutes in a service day.
pub const MINUTES_PER_DAY: f64 = 1440.0;

/// Weight of the deprivation need component in the equity index.
pub const DEPRIVATION_WEIGHT: f64 = 0.6;

/// Weight of the car-free households need component in the equity index.
pub const CAR_FREE_WEIGHT: f64 = 0.4;

/// Need used when no demographic need component is available.
pub const NEUTRAL_NEED: f64 = 0.5;

/// Approximate headway in minutes: `1440 / trips_per_day`.
///
/// Assumes trips are spread uniformly over the whole day. This is an
/// approximation of service frequency, not a scheduled headway.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn approximate_headway_minutes(trips_per_day: usize) -> Option<f64> {
    (trips_per_day > 0).then(|| MINUTES_PER_DAY / trips_per_day as f64)
}

/// Active stops per 1 000 residents relative to `saturation`, clipped to
/// `[0, 1]`. `None` when the population is unknown or not positive.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn coverage_score(active_stops: usize, population: Option<f64>, saturation: f64) -> Option<f64> {
    let population = population.filter(|p| *p > 0.0)?;
    if saturation <= 0.0 || !saturation.is_finite() {
        return None;
    }
    let per_thousand = active_stops as f64 / population * 1000.0;
    Some((per_thousand / saturation).clamp(0.0, 1.0))
}

/// Composite equity score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EquityScore {
    /// Index in `[0, 1]`.
    pub value: f64,
    /// Set when one or more need components were missing.
    pub low_confidence: bool,
}

/// `coverage × (0.5 + 0.5 × need)`.
///
/// Need is the weighted mean of the available components: deprivation
/// `(10 − decile) / 9` (decile 1 is the most deprived) and car-free
/// households `pct / 100`. Missing components are left out of the mean
/// and flag the score as low confidence; with none available need is
/// [`NEUTRAL_NEED`]. `None` when coverage is undefined.
#[must_use]
pub fn equity_index(
    coverage: Option<f64>,
    deprivation_decile: Option<f64>,
    car_free_pct: Option<f64>,
) -> Option<EquityScore> {
    let coverage = coverage?;
    let components = [
        deprivation_decile.map(|d| ((10.0 - d.clamp(1.0, 10.0)) / 9.0, DEPRIVATION_WEIGHT)),
        car_free_pct.map(|p| (p.clamp(0.0, 100.0) / 100.0, CAR_FREE_WEIGHT)),
    ];
    let (weighted, weights) = components
        .iter()
        .flatten()
        .fold((0.0, 0.0), |(sum, total), (need, weight)| {
            (need.mul_add(*weight, sum), total + weight)
        });
    let need = if weights > 0.0 {
        weighted / weights
    } else {
        NEUTRAL_NEED
    };
    Some(EquityScore {
        value: (coverage * 0.5f64.mul_add(need, 0.5)).clamp(0.0, 1.0),
        low_confidence: components.iter().any(Option::is_none),
    })
}

/// Urban/rural composition of an area's active stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UrbanRuralSplit {
    /// Urban stops.
    pub urban: usize,
    /// Rural stops.
    pub rural: usize,
    /// Stops without a classification.
    pub unclassified: usize,
    /// `urban / (urban + rural)`; `None` without classified stops.
    pub urban_pct: Option<f64>,
    /// `rural / (urban + rural)`; `None` without classified stops.
    pub rural_pct: Option<f64>,
    /// Fewer classified stops than the reliability minimum.
    pub unreliable: bool,
}

/// Computes the split, flagging it unreliable below `min_reliable_stops`
/// classified stops.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn urban_rural(
    urban: usize,
    rural: usize,
    unclassified: usize,
    min_reliable_stops: usize,
) -> UrbanRuralSplit {
    let classified = urban + rural;
    let (urban_pct, rural_pct) = if classified == 0 {
        (None, None)
    } else {
        let u = urban as f64 / classified as f64;
        (Some(u), Some(1.0 - u))
    };
    UrbanRuralSplit {
        urban,
        rural,
        unclassified,
        urban_pct,
        rural_pct,
        unreliable: classified < min_reliable_stops,
    }
}
