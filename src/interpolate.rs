//! Linear densification of sparse station points for heatmap rendering.

use crate::models::PollutionPoint;
use std::collections::HashMap;

/// Number of segments each adjacent pair is divided into.
pub const STEPS: usize = 10;

/// Inserts `STEPS - 1` synthetic points between each adjacent pair of points
/// sharing a `(unit, pollutant)` group.
///
/// Groups are emitted in order of first appearance. Within a group the path
/// follows the input order, so the result depends on how the input is
/// ordered. Synthetic points take `lat`, `lon` and `value` from a linear blend
/// of their neighbours, have no `id`, and are named after the point they
/// follow. A group of `n >= 2` points becomes `STEPS * (n - 1) + 1` points.
pub fn interpolate(points: &[PollutionPoint]) -> Vec<PollutionPoint> {
    let mut groups: Vec<Vec<&PollutionPoint>> = Vec::new();
    let mut index: HashMap<(&str, &str), usize> = HashMap::new();

    for point in points {
        let key = (point.unit.as_str(), point.pollutant.as_str());
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(point);
    }

    let mut out = Vec::with_capacity(points.len() * STEPS);
    for group in groups {
        for pair in group.windows(2) {
            let (from, to) = (pair[0], pair[1]);
            out.push(from.clone());
            for k in 1..STEPS {
                out.push(blend(from, to, k));
            }
        }
        if let Some(last) = group.last() {
            out.push((*last).clone());
        }
    }
    out
}

fn blend(from: &PollutionPoint, to: &PollutionPoint, k: usize) -> PollutionPoint {
    let t = k as f64 / STEPS as f64;
    PollutionPoint {
        id: None,
        name: format!("{}-interpolated-{}", from.name, k),
        lat: from.lat + t * (to.lat - from.lat),
        lon: from.lon + t * (to.lon - from.lon),
        pollutant: from.pollutant.clone(),
        value: from.value + t * (to.value - from.value),
        unit: from.unit.clone(),
    }
}
