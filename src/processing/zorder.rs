use std::collections::BTreeMap;

use crate::error::DataQualityWarning;
use crate::io::ModelContour;

/// A value together with the data-quality warnings raised while computing it.
/// Callers decide how warnings are surfaced.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub value: T,
    pub warnings: Vec<DataQualityWarning>,
}

impl<T> Resolved<T> {
    pub fn clean(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }
}

/// Most frequent slice index among `values` (rounded to the nearest slice).
/// Ties go to the numerically lowest z. Returns the winner and the distinct
/// slice indices seen, ascending.
pub fn majority_z(values: &[f64]) -> Option<(i64, Vec<i64>)> {
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for z in values {
        *counts.entry(z.round() as i64).or_default() += 1;
    }

    let mut best: Option<(i64, usize)> = None;
    for (&z, &count) in &counts {
        match best {
            Some((_, best_count)) if count <= best_count => {}
            _ => best = Some((z, count)),
        }
    }
    best.map(|(z, _)| (z, counts.keys().copied().collect()))
}

/// Slice of a boundary contour. A contour spanning several slices is resolved by
/// majority vote and reported as [`DataQualityWarning::MixedZ`].
pub fn resolve_contour_z(contour: &ModelContour) -> Option<Resolved<i64>> {
    let (z, distinct) = majority_z(&contour.z_values())?;
    if distinct.len() == 1 {
        return Some(Resolved::clean(z));
    }
    Some(Resolved {
        value: z,
        warnings: vec![DataQualityWarning::MixedZ {
            object: contour.object,
            contour: contour.contour,
            values: distinct,
            resolved: z,
        }],
    })
}

/// Slice sequence of the boundary model in its own contour order, with repeated
/// slices (several contours on one slice) collapsed.
pub fn canonical_z_order(contours: &[ModelContour]) -> Resolved<Vec<i64>> {
    let mut order: Vec<i64> = Vec::new();
    let mut warnings = Vec::new();
    for contour in contours {
        let Some(resolved) = resolve_contour_z(contour) else {
            continue;
        };
        warnings.extend(resolved.warnings);
        if order.last() != Some(&resolved.value) {
            order.push(resolved.value);
        }
    }
    Resolved {
        value: order,
        warnings,
    }
}

/// One warning per place where the next slice of `object` is not the previous slice + 1.
pub fn check_continuity(object: u32, order: &[i64]) -> Vec<DataQualityWarning> {
    order
        .windows(2)
        .filter(|w| w[1] != w[0] + 1)
        .map(|w| DataQualityWarning::NonContiguousSlice {
            object,
            previous: w[0],
            next: w[1],
        })
        .collect()
}

/// Z-order warnings of a boundary model. Every object is its own contour
/// sequence, so objects are ordered and checked independently; each object's
/// mixed-z warnings come before its continuity warnings.
pub fn check_boundary_order(contours: &[ModelContour]) -> Vec<DataQualityWarning> {
    let mut objects: Vec<(u32, Vec<ModelContour>)> = Vec::new();
    for contour in contours {
        match objects.iter_mut().find(|(id, _)| *id == contour.object) {
            Some((_, members)) => members.push(contour.clone()),
            None => objects.push((contour.object, vec![contour.clone()])),
        }
    }

    let mut warnings = Vec::new();
    for (object, members) in &objects {
        let order = canonical_z_order(members);
        warnings.extend(order.warnings);
        warnings.extend(check_continuity(*object, &order.value));
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::PointRow;

    fn contour(id: u32, zs: &[f64]) -> ModelContour {
        object_contour(1, id, zs)
    }

    fn object_contour(object: u32, id: u32, zs: &[f64]) -> ModelContour {
        ModelContour {
            object,
            contour: id,
            points: zs
                .iter()
                .map(|&z| PointRow {
                    object,
                    contour: id,
                    x: 0.0,
                    y: 0.0,
                    z,
                })
                .collect(),
        }
    }

    #[test]
    fn test_majority_wins() {
        let resolved = resolve_contour_z(&contour(1, &[5.0, 5.0, 5.0, 6.0])).unwrap();
        assert_eq!(resolved.value, 5);
        assert_eq!(resolved.warnings.len(), 1);
    }

    #[test]
    fn test_tie_goes_to_lowest_z() {
        let resolved = resolve_contour_z(&contour(3, &[6.0, 5.0])).unwrap();
        assert_eq!(resolved.value, 5);
        assert_eq!(
            resolved.warnings,
            vec![DataQualityWarning::MixedZ {
                object: 1,
                contour: 3,
                values: vec![5, 6],
                resolved: 5
            }]
        );
    }

    #[test]
    fn test_single_z_has_no_warning() {
        let resolved = resolve_contour_z(&contour(1, &[7.0, 7.0, 7.0])).unwrap();
        assert_eq!(resolved, Resolved::clean(7));
        assert!(resolve_contour_z(&contour(2, &[])).is_none());
    }

    #[test]
    fn test_one_gap_one_warning() {
        let warnings = check_continuity(1, &[1, 2, 4, 5]);
        assert_eq!(
            warnings,
            vec![DataQualityWarning::NonContiguousSlice {
                object: 1,
                previous: 2,
                next: 4
            }]
        );
        assert!(check_continuity(1, &[3, 4, 5]).is_empty());
        assert!(check_continuity(1, &[]).is_empty());
    }

    #[test]
    fn test_canonical_order_collapses_repeats() {
        let contours = vec![
            contour(1, &[1.0]),
            contour(2, &[2.0]),
            contour(3, &[2.0]),
            contour(4, &[4.0, 4.0, 3.0]),
        ];
        let order = canonical_z_order(&contours);
        assert_eq!(order.value, vec![1, 2, 4]);
        assert_eq!(order.warnings.len(), 1);
        assert_eq!(check_continuity(1, &order.value).len(), 1);
    }

    #[test]
    fn test_objects_are_checked_separately() {
        // cell and nucleus both start over at z = 0
        let contours: Vec<ModelContour> = [1, 2]
            .iter()
            .flat_map(|&object| {
                (0..3).map(move |z| object_contour(object, z as u32 + 1, &[z as f64]))
            })
            .collect();
        assert!(check_boundary_order(&contours).is_empty());
    }

    #[test]
    fn test_gap_is_attributed_to_its_object() {
        let contours = vec![
            object_contour(1, 1, &[0.0]),
            object_contour(2, 1, &[0.0]),
            object_contour(1, 2, &[1.0]),
            object_contour(2, 2, &[2.0]),
        ];
        assert_eq!(
            check_boundary_order(&contours),
            vec![DataQualityWarning::NonContiguousSlice {
                object: 2,
                previous: 0,
                next: 2
            }]
        );
    }
}
