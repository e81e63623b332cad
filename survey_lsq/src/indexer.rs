//! Column indices of the unknowns.
//!
//! Finite coordinates are numbered row by row over the control table (x, y, z
//! within a point), followed by one orientation unknown per station that has
//! an orientation constant.

use crate::dataset::{Axis, Dataset};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateIndexer {
    point_ids: Vec<String>,
    station_keys: Vec<String>,
    coordinates: Vec<[Option<usize>; 3]>,
    orientations: Vec<Option<usize>>,
    point_lookup: HashMap<String, usize>,
    station_lookup: HashMap<String, usize>,
    n_coordinates: usize,
    n_orientations: usize,
}

impl CoordinateIndexer {
    pub fn new(dataset: &Dataset) -> Self {
        let mut next = 0;
        let coordinates: Vec<[Option<usize>; 3]> = dataset
            .controls
            .iter()
            .map(|point| {
                point.coordinates().map(|value| {
                    value.map(|_| {
                        next += 1;
                        next - 1
                    })
                })
            })
            .collect();
        let n_coordinates = next;

        let orientations: Vec<Option<usize>> = dataset
            .stations
            .iter()
            .map(|station| {
                station.orientation.filter(|o| o.is_finite()).map(|_| {
                    next += 1;
                    next - 1
                })
            })
            .collect();
        let n_orientations = next - n_coordinates;

        Self {
            point_ids: dataset.controls.iter().map(|c| c.id.clone()).collect(),
            station_keys: dataset.stations.iter().map(|s| s.key.clone()).collect(),
            point_lookup: dataset
                .controls
                .iter()
                .enumerate()
                .map(|(i, c)| (c.id.clone(), i))
                .collect(),
            station_lookup: dataset
                .stations
                .iter()
                .enumerate()
                .map(|(i, s)| (s.key.clone(), i))
                .collect(),
            coordinates,
            orientations,
            n_coordinates,
            n_orientations,
        }
    }

    /// Whether the index space still matches the dataset's finite
    /// coordinates and orientation constants.
    pub fn is_current_for(&self, dataset: &Dataset) -> bool {
        dataset.controls.len() == self.coordinates.len()
            && dataset.stations.len() == self.orientations.len()
            && dataset
                .controls
                .iter()
                .zip(&self.point_ids)
                .zip(&self.coordinates)
                .all(|((point, id), columns)| {
                    point.id == *id
                        && point
                            .coordinates()
                            .iter()
                            .zip(columns)
                            .all(|(value, column)| value.is_some() == column.is_some())
                })
            && dataset
                .stations
                .iter()
                .zip(&self.station_keys)
                .zip(&self.orientations)
                .all(|((station, key), column)| {
                    station.key == *key
                        && station.orientation.is_some_and(f64::is_finite) == column.is_some()
                })
    }

    /// Position of a point in the control table.
    pub fn point_position(&self, id: &str) -> Option<usize> {
        self.point_lookup.get(id).copied()
    }

    pub fn station_position(&self, key: &str) -> Option<usize> {
        self.station_lookup.get(key).copied()
    }

    /// Column of a point's coordinate by table position.
    pub fn column_at(&self, position: usize, axis: Axis) -> Option<usize> {
        self.coordinates
            .get(position)
            .and_then(|columns| columns[axis.index()])
    }

    pub fn coordinate_column(&self, id: &str, axis: Axis) -> Option<usize> {
        self.point_position(id)
            .and_then(|position| self.column_at(position, axis))
    }

    pub fn orientation_column(&self, key: &str) -> Option<usize> {
        self.station_position(key)
            .and_then(|position| self.orientations[position])
    }

    pub fn orientation_column_at(&self, position: usize) -> Option<usize> {
        self.orientations.get(position).copied().flatten()
    }

    /// Iterates over `(point position, axis, column)` of every coordinate
    /// unknown in column order.
    pub fn coordinate_columns(&self) -> impl Iterator<Item = (usize, Axis, usize)> + '_ {
        self.coordinates.iter().enumerate().flat_map(|(position, columns)| {
            Axis::ALL
                .into_iter()
                .filter_map(move |axis| columns[axis.index()].map(|c| (position, axis, c)))
        })
    }

    /// `(point position, column)` of every coordinate unknown on `axis`.
    pub fn axis_columns(&self, axis: Axis) -> Vec<(usize, usize)> {
        self.coordinates
            .iter()
            .enumerate()
            .filter_map(|(position, columns)| columns[axis.index()].map(|c| (position, c)))
            .collect()
    }

    /// Iterates over `(station position, column)` of every orientation unknown.
    pub fn orientation_columns(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.orientations
            .iter()
            .enumerate()
            .filter_map(|(position, column)| column.map(|c| (position, c)))
    }

    pub fn n_coordinates(&self) -> usize {
        self.n_coordinates
    }

    pub fn n_orientations(&self) -> usize {
        self.n_orientations
    }

    pub fn n_unknowns(&self) -> usize {
        self.n_coordinates + self.n_orientations
    }
}
