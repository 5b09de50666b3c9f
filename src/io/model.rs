use std::collections::BTreeMap;

use serde::Serialize;

use super::points::PointRow;

/// Contour count of one object in a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ObjectSummary {
    pub object: u32,
    pub contours: usize,
}

/// Object/contour view of a model, built from its exported point listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModelSummary {
    pub objects: Vec<ObjectSummary>,
}

impl ModelSummary {
    pub fn from_rows(rows: &[PointRow]) -> Self {
        let mut contours: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
        for row in rows {
            let ids = contours.entry(row.object).or_default();
            if !ids.contains(&row.contour) {
                ids.push(row.contour);
            }
        }
        Self {
            objects: contours
                .into_iter()
                .map(|(object, ids)| ObjectSummary {
                    object,
                    contours: ids.len(),
                })
                .collect(),
        }
    }

    pub fn total_contours(&self) -> usize {
        self.objects.iter().map(|o| o.contours).sum()
    }

    /// Objects that survive removal of everything with `threshold` contours or fewer.
    #[cfg(test)]
    pub fn pruned(&self, threshold: u32) -> Self {
        Self {
            objects: self
                .objects
                .iter()
                .copied()
                .filter(|o| o.contours > threshold as usize)
                .collect(),
        }
    }
}

/// Points of one contour of a model, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelContour {
    pub object: u32,
    pub contour: u32,
    pub points: Vec<PointRow>,
}

impl ModelContour {
    pub fn z_values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.z).collect()
    }
}

/// Splits a listing into contours, keeping the order in which each
/// (object, contour) pair first appears.
pub fn group_contours(rows: &[PointRow]) -> Vec<ModelContour> {
    let mut contours: Vec<ModelContour> = Vec::new();
    for row in rows {
        match contours.last_mut() {
            Some(last) if last.object == row.object && last.contour == row.contour => {
                last.points.push(*row)
            }
            _ => {
                if let Some(existing) = contours
                    .iter_mut()
                    .find(|c| c.object == row.object && c.contour == row.contour)
                {
                    existing.points.push(*row);
                } else {
                    contours.push(ModelContour {
                        object: row.object,
                        contour: row.contour,
                        points: vec![*row],
                    });
                }
            }
        }
    }
    contours
}
