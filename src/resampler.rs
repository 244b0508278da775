//! Resampling of scattered projected samples onto a regular grid.
//!
//! The grid covers the projected envelope of a [`GeoPointSet`]. Row 0 is
//! the southernmost row and column 0 the westernmost, so a cell index is
//! `row * cols + col` with rows growing northwards. Use
//! [`ProjectedGrid::north_up_rows`] or [`ProjectedGrid::geo_transform`] when
//! handing the grid to a raster writer that expects north-up order.
//!
//! Binning runs in fixed-size batches. Each batch accumulates into its own
//! sparse `(sum, count)` table and the tables are merged in batch order, so
//! parallel and sequential runs produce bit-identical grids.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use geo::{coord, Coord, Rect};
use rayon::prelude::*;
use rstar::primitives::GeomWithData;
use rstar::RTree;
use tracing::debug;

use crate::error::{GridError, Result};
use crate::point_set::GeoPointSet;
use crate::projection::UtmZone;

/// Sentinel stored in cells that received no value.
pub const DEFAULT_NODATA: f64 = -9999.0;
pub const MAX_GRID_CELLS: usize = 100_000_000;
pub const DEFAULT_BATCH_SIZE: usize = 65_536;

/// How a cell value is derived from the samples.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Aggregation {
    /// Arithmetic mean of the samples falling inside the cell.
    #[default]
    Mean,
    /// Value of the sample nearest to the cell centre.
    Nearest { max_distance: Option<f64> },
    /// Inverse-distance weighting of the `neighbours` nearest samples.
    InverseDistance {
        power: f64,
        neighbours: usize,
        max_distance: Option<f64>,
    },
}

#[derive(Debug, Clone)]
pub struct ResampleOptions {
    pub aggregation: Aggregation,
    pub nodata: f64,
    /// Samples per batch; cancellation is checked between batches
    pub batch_size: usize,
    pub parallel: bool,
}

impl Default for ResampleOptions {
    fn default() -> Self {
        Self {
            aggregation: Aggregation::Mean,
            nodata: DEFAULT_NODATA,
            batch_size: DEFAULT_BATCH_SIZE,
            parallel: true,
        }
    }
}

impl ResampleOptions {
    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(GridError::InvalidOptions("batch size must be at least 1".into()));
        }
        let max_distance = match self.aggregation {
            Aggregation::Mean => None,
            Aggregation::Nearest { max_distance } => max_distance,
            Aggregation::InverseDistance {
                power,
                neighbours,
                max_distance,
            } => {
                if !(power.is_finite() && power >= 0.0) {
                    return Err(GridError::InvalidOptions(format!(
                        "inverse distance power {} must be finite and non-negative",
                        power
                    )));
                }
                if neighbours == 0 {
                    return Err(GridError::InvalidOptions(
                        "inverse distance needs at least one neighbour".into(),
                    ));
                }
                max_distance
            }
        };
        if let Some(d) = max_distance {
            if !(d.is_finite() && d > 0.0) {
                return Err(GridError::InvalidOptions(format!(
                    "max distance {} must be a positive number of meters",
                    d
                )));
            }
        }
        Ok(())
    }
}

/// Shared flag for cancelling an in-flight resample from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A regular grid of cell values in projected coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedGrid {
    zone: UtmZone,
    // South-west corner of the grid
    origin: Coord<f64>,
    resolution: f64,
    rows: usize,
    cols: usize,
    nodata: f64,
    values: Vec<f64>,
    counts: Vec<u32>,
}

impl ProjectedGrid {
    pub fn zone(&self) -> UtmZone {
        self.zone
    }

    pub fn origin(&self) -> Coord<f64> {
        self.origin
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn nodata(&self) -> f64 {
        self.nodata
    }

    /// Cell values, row-major with row 0 in the south.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of samples binned into each cell, same layout as `values`.
    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.rows && col < self.cols {
            Some(self.values[row * self.cols + col])
        } else {
            None
        }
    }

    pub fn count(&self, row: usize, col: usize) -> Option<u32> {
        if row < self.rows && col < self.cols {
            Some(self.counts[row * self.cols + col])
        } else {
            None
        }
    }

    pub fn is_nodata(&self, row: usize, col: usize) -> bool {
        self.get(row, col).map_or(false, |v| v == self.nodata)
    }

    pub fn occupied_cells(&self) -> usize {
        self.counts.iter().filter(|&&c| c > 0).count()
    }

    pub fn extent(&self) -> Rect<f64> {
        Rect::new(
            self.origin,
            coord! {
                x: self.origin.x + self.cols as f64 * self.resolution,
                y: self.origin.y + self.rows as f64 * self.resolution,
            },
        )
    }

    /// Projected coordinate of the centre of a cell.
    pub fn cell_center(&self, row: usize, col: usize) -> Coord<f64> {
        coord! {
            x: self.origin.x + (col as f64 + 0.5) * self.resolution,
            y: self.origin.y + (row as f64 + 0.5) * self.resolution,
        }
    }

    /// Six-coefficient affine transform for a north-up raster:
    /// `[top_left_x, pixel_width, 0, top_left_y, 0, -pixel_height]`.
    pub fn geo_transform(&self) -> [f64; 6] {
        [
            self.origin.x,
            self.resolution,
            0.0,
            self.origin.y + self.rows as f64 * self.resolution,
            0.0,
            -self.resolution,
        ]
    }

    /// Rows from north to south, matching `geo_transform`.
    pub fn north_up_rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.values.chunks(self.cols).rev()
    }
}

#[derive(Debug, Clone, Copy)]
struct GridShape {
    origin: Coord<f64>,
    resolution: f64,
    rows: usize,
    cols: usize,
}

impl GridShape {
    fn covering(bounds: Rect<f64>, resolution: f64) -> Result<Self> {
        let cols = (bounds.width() / resolution).ceil().max(1.0);
        let rows = (bounds.height() / resolution).ceil().max(1.0);
        if !(cols * rows <= MAX_GRID_CELLS as f64) {
            return Err(GridError::GridTooLarge {
                rows: rows as usize,
                cols: cols as usize,
                limit: MAX_GRID_CELLS,
            });
        }
        Ok(Self {
            origin: bounds.min(),
            resolution,
            rows: rows as usize,
            cols: cols as usize,
        })
    }

    fn cells(&self) -> usize {
        self.rows * self.cols
    }

    // Upper boundary maps to the last row/column
    fn cell_index(&self, c: Coord<f64>) -> usize {
        let col = ((c.x - self.origin.x) / self.resolution).floor().max(0.0) as usize;
        let row = ((c.y - self.origin.y) / self.resolution).floor().max(0.0) as usize;
        row.min(self.rows - 1) * self.cols + col.min(self.cols - 1)
    }

    fn cell_center(&self, index: usize) -> [f64; 2] {
        let row = index / self.cols;
        let col = index % self.cols;
        [
            self.origin.x + (col as f64 + 0.5) * self.resolution,
            self.origin.y + (row as f64 + 0.5) * self.resolution,
        ]
    }
}

type BatchSums = HashMap<usize, (f64, u32)>;

type IndexedSample = GeomWithData<[f64; 2], f64>;

type ProgressFn<'a> = Box<dyn Fn(usize, usize) + Send + Sync + 'a>;

pub struct GridResampler<'a> {
    points: &'a GeoPointSet,
    options: ResampleOptions,
    cancel: Option<CancelFlag>,
    progress: Option<ProgressFn<'a>>,
}

impl<'a> GridResampler<'a> {
    pub fn new(points: &'a GeoPointSet, options: ResampleOptions) -> Self {
        Self {
            points,
            options,
            cancel: None,
            progress: None,
        }
    }

    /// Check `flag` between batches and stop with `Cancelled` once it is set.
    pub fn with_cancel(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Call `progress(binned, total)` after each batch of samples is binned.
    pub fn with_progress<F>(mut self, progress: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'a,
    {
        self.progress = Some(Box::new(progress));
        self
    }

    pub fn resample(&self, resolution: f64) -> Result<ProjectedGrid> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(GridError::InvalidResolution(resolution));
        }
        self.options.validate()?;

        let shape = GridShape::covering(self.points.projected_bounds(), resolution)?;
        debug!(
            rows = shape.rows,
            cols = shape.cols,
            resolution,
            aggregation = ?self.options.aggregation,
            "Resampling {} points",
            self.points.len()
        );

        let (sums, counts) = self.bin(&shape)?;

        let values = match self.options.aggregation {
            Aggregation::Mean => sums
                .iter()
                .zip(counts.iter())
                .map(|(&sum, &count)| {
                    if count > 0 {
                        sum / count as f64
                    } else {
                        self.options.nodata
                    }
                })
                .collect(),
            Aggregation::Nearest { max_distance } => {
                self.interpolate(&shape, |tree, center| nearest(tree, center, max_distance))?
            }
            Aggregation::InverseDistance {
                power,
                neighbours,
                max_distance,
            } => self.interpolate(&shape, |tree, center| {
                inverse_distance(tree, center, power, neighbours, max_distance)
            })?,
        };

        Ok(ProjectedGrid {
            zone: self.points.zone(),
            origin: shape.origin,
            resolution,
            rows: shape.rows,
            cols: shape.cols,
            nodata: self.options.nodata,
            values,
            counts,
        })
    }

    fn check_cancelled(&self, stage: &'static str, processed: usize, total: usize) -> Result<()> {
        match &self.cancel {
            Some(flag) if flag.is_cancelled() => Err(GridError::Cancelled {
                stage,
                processed,
                total,
            }),
            _ => Ok(()),
        }
    }

    fn bin(&self, shape: &GridShape) -> Result<(Vec<f64>, Vec<u32>)> {
        let projected = self.points.projected();
        let values = self.points.values();
        let batch_size = self.options.batch_size;
        let batches = (projected.len() + batch_size - 1) / batch_size;

        let bin_batch = |batch: usize| -> Result<BatchSums> {
            let start = batch * batch_size;
            self.check_cancelled("binning", start, projected.len())?;
            let end = (start + batch_size).min(projected.len());

            let mut sums = BatchSums::new();
            for (c, &value) in projected[start..end].iter().zip(&values[start..end]) {
                let entry = sums.entry(shape.cell_index(*c)).or_insert((0.0, 0));
                entry.0 += value;
                entry.1 += 1;
            }
            debug!(batch, cells = sums.len(), "Binned batch");
            if let Some(progress) = &self.progress {
                progress(end, projected.len());
            }
            Ok(sums)
        };

        let partials: Vec<BatchSums> = if self.options.parallel {
            (0..batches).into_par_iter().map(bin_batch).collect::<Result<_>>()?
        } else {
            (0..batches).map(bin_batch).collect::<Result<_>>()?
        };

        let mut sums = vec![0.0; shape.cells()];
        let mut counts = vec![0u32; shape.cells()];
        for partial in partials {
            for (index, (sum, count)) in partial {
                sums[index] += sum;
                counts[index] += count;
            }
        }
        Ok((sums, counts))
    }

    // Evaluate `cell_value` at every cell centre against an R-tree of samples
    fn interpolate<F>(&self, shape: &GridShape, cell_value: F) -> Result<Vec<f64>>
    where
        F: Fn(&RTree<IndexedSample>, [f64; 2]) -> Option<f64> + Sync,
    {
        let samples: Vec<IndexedSample> = self
            .points
            .projected()
            .iter()
            .zip(self.points.values())
            .map(|(c, &v)| GeomWithData::new([c.x, c.y], v))
            .collect();
        let tree = RTree::bulk_load(samples);
        let nodata = self.options.nodata;

        let fill_row = |(row, out): (usize, &mut [f64])| -> Result<()> {
            self.check_cancelled("interpolation", row * shape.cols, shape.cells())?;
            for (col, cell) in out.iter_mut().enumerate() {
                let center = shape.cell_center(row * shape.cols + col);
                *cell = cell_value(&tree, center).unwrap_or(nodata);
            }
            Ok(())
        };

        let mut values = vec![nodata; shape.cells()];
        if self.options.parallel {
            values
                .par_chunks_mut(shape.cols)
                .enumerate()
                .try_for_each(fill_row)?;
        } else {
            values
                .chunks_mut(shape.cols)
                .enumerate()
                .try_for_each(fill_row)?;
        }
        Ok(values)
    }
}

fn planar_distance(a: &[f64; 2], b: &[f64; 2]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
}

fn nearest(tree: &RTree<IndexedSample>, center: [f64; 2], max_distance: Option<f64>) -> Option<f64> {
    let sample = tree.nearest_neighbor(&center)?;
    match max_distance {
        Some(limit) if planar_distance(sample.geom(), &center) > limit => None,
        _ => Some(sample.data),
    }
}

fn inverse_distance(
    tree: &RTree<IndexedSample>,
    center: [f64; 2],
    power: f64,
    neighbours: usize,
    max_distance: Option<f64>,
) -> Option<f64> {
    let mut weighted = 0.0;
    let mut weights = 0.0;
    let mut closest = None;
    for sample in tree.nearest_neighbor_iter(&center).take(neighbours) {
        let d = planar_distance(sample.geom(), &center);
        if max_distance.map_or(false, |limit| d > limit) {
            break;
        }
        if d == 0.0 {
            return Some(sample.data);
        }
        // Weights relative to the closest sample stay in (0, 1] for any power
        let d0 = *closest.get_or_insert(d);
        let w = (d0 / d).powf(power);
        weighted += w * sample.data;
        weights += w;
    }
    if weights > 0.0 {
        Some(weighted / weights)
    } else {
        None
    }
}
