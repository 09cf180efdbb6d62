//! Dimension universe
//!
//! The universe is the read-only registry every coordinate is validated
//! against. It knows which dimensions exist, which dimensions each one
//! requires, and how to compute a sky [`Region`] for spatial dimensions.
//!
//! ```rust,ignore
//! let universe = DimensionUniverse::builder()
//!     .dimension("instrument", &[])
//!     .spatial("visit", &["instrument"])
//!     .dimension("skymap", &[])
//!     .dimension("tract", &["skymap"])
//!     .spatial("patch", &["tract"])
//!     .skypix("htm7", 7)
//!     .region("patch", "A", patch_a_region)
//!     .build()?;
//! ```

use crate::coordinate::{DataCoordinate, DimensionValue};
use crate::error::DimensionError;
use crate::region::{Pixelization, Region};
use std::collections::{BTreeMap, BTreeSet};

/// How a spatial dimension maps values to regions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialKind {
    /// Values are pixel indices of a pixelization at a fixed level
    SkyPix(Pixelization),
    /// Regions are registered per value
    Registered,
}

#[derive(Debug, Clone)]
struct Dimension {
    requires: Vec<String>,
    spatial: Option<SpatialKind>,
}

/// Immutable set of dimensions, shared behind `Arc` once built
#[derive(Debug, Clone)]
pub struct DimensionUniverse {
    dimensions: BTreeMap<String, Dimension>,
    regions: BTreeMap<String, BTreeMap<DimensionValue, Region>>,
}

impl DimensionUniverse {
    #[inline]
    #[must_use]
    pub fn builder() -> DimensionUniverseBuilder {
        DimensionUniverseBuilder::default()
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, dimension: &str) -> bool {
        self.dimensions.contains_key(dimension)
    }

    /// All dimension names, ordered.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.dimensions.keys().map(String::as_str)
    }

    /// Dimensions directly required by `dimension`.
    #[must_use]
    pub fn requires(&self, dimension: &str) -> &[String] {
        self.dimensions
            .get(dimension)
            .map_or(&[], |d| d.requires.as_slice())
    }

    #[must_use]
    pub fn spatial_kind(&self, dimension: &str) -> Option<SpatialKind> {
        self.dimensions.get(dimension).and_then(|d| d.spatial)
    }

    /// `dimensions` plus everything they transitively require.
    ///
    /// # Errors
    /// Returns [`DimensionError::UnknownDimension`] for names not in the universe.
    pub fn expand(&self, dimensions: &BTreeSet<String>) -> Result<BTreeSet<String>, DimensionError> {
        let mut out = BTreeSet::new();
        let mut stack: Vec<&str> = dimensions.iter().map(String::as_str).collect();
        while let Some(name) = stack.pop() {
            let dim = self
                .dimensions
                .get(name)
                .ok_or_else(|| DimensionError::UnknownDimension(name.to_string()))?;
            if out.insert(name.to_string()) {
                stack.extend(dim.requires.iter().map(String::as_str));
            }
        }
        Ok(out)
    }

    /// Whether any of `dimensions` is spatial. Unknown names are ignored.
    #[must_use]
    pub fn is_spatial(&self, dimensions: &BTreeSet<String>) -> bool {
        dimensions
            .iter()
            .any(|d| self.spatial_kind(d).is_some())
    }

    /// Validate a coordinate against the universe.
    ///
    /// # Errors
    /// Fails on unknown dimension keys or when a present dimension's
    /// requirement is missing from the coordinate.
    pub fn normalize(&self, coordinate: &DataCoordinate) -> Result<DataCoordinate, DimensionError> {
        for (name, _) in coordinate.iter() {
            let dim = self
                .dimensions
                .get(name)
                .ok_or_else(|| DimensionError::UnknownDimension(name.to_string()))?;
            if let Some(missing) = dim.requires.iter().find(|r| coordinate.get(r).is_none()) {
                return Err(DimensionError::MissingRequired {
                    dimension: name.to_string(),
                    required: missing.clone(),
                });
            }
        }
        Ok(coordinate.clone())
    }

    /// Region of a single dimension value, if known.
    #[must_use]
    pub fn region_of_value(&self, dimension: &str, value: &DimensionValue) -> Option<Region> {
        match self.spatial_kind(dimension)? {
            SpatialKind::SkyPix(pix) => match value {
                DimensionValue::Int(i) => u64::try_from(*i).ok().and_then(|i| pix.pixel(i)),
                DimensionValue::Str(_) => None,
            },
            SpatialKind::Registered => self.regions.get(dimension)?.get(value).cloned(),
        }
    }

    /// Region of a coordinate: the intersection of the regions of its spatial
    /// dimensions. `None` when no spatial dimension has a known region.
    #[must_use]
    pub fn region_of(&self, coordinate: &DataCoordinate) -> Option<Region> {
        coordinate
            .iter()
            .filter_map(|(name, value)| self.region_of_value(name, value))
            .reduce(|acc, r| acc.intersection(&r))
    }
}

/// Builder for [`DimensionUniverse`]
#[derive(Debug, Default)]
pub struct DimensionUniverseBuilder {
    order: Vec<(String, Dimension)>,
    regions: Vec<(String, DimensionValue, Region)>,
}

impl DimensionUniverseBuilder {
    fn push(mut self, name: &str, requires: &[&str], spatial: Option<SpatialKind>) -> Self {
        self.order.push((
            name.to_string(),
            Dimension {
                requires: requires.iter().map(|r| (*r).to_string()).collect(),
                spatial,
            },
        ));
        self
    }

    /// Declare a non-spatial dimension
    #[must_use]
    pub fn dimension(self, name: &str, requires: &[&str]) -> Self {
        self.push(name, requires, None)
    }

    /// Declare a spatial dimension whose per-value regions are registered
    #[must_use]
    pub fn spatial(self, name: &str, requires: &[&str]) -> Self {
        self.push(name, requires, Some(SpatialKind::Registered))
    }

    /// Declare a sky-pixelization dimension at `level`
    #[must_use]
    pub fn skypix(self, name: &str, level: u8) -> Self {
        self.push(name, &[], Some(SpatialKind::SkyPix(Pixelization::new(level))))
    }

    /// Register the region for one value of a spatial dimension
    #[must_use]
    pub fn region(mut self, dimension: &str, value: impl Into<DimensionValue>, region: Region) -> Self {
        self.regions.push((dimension.to_string(), value.into(), region));
        self
    }

    /// Freeze the universe.
    ///
    /// # Errors
    /// Fails on duplicate declarations, requirements naming undeclared
    /// dimensions, or regions registered on non-spatial dimensions.
    pub fn build(self) -> Result<DimensionUniverse, DimensionError> {
        let mut dimensions = BTreeMap::new();
        for (name, dim) in self.order {
            if dimensions.insert(name.clone(), dim).is_some() {
                return Err(DimensionError::DuplicateDimension(name));
            }
        }
        for dim in dimensions.values() {
            if let Some(unknown) = dim.requires.iter().find(|r| !dimensions.contains_key(*r)) {
                return Err(DimensionError::UnknownDimension(unknown.clone()));
            }
        }

        let mut regions: BTreeMap<String, BTreeMap<DimensionValue, Region>> = BTreeMap::new();
        for (name, value, region) in self.regions {
            match dimensions.get(&name).map(|d: &Dimension| d.spatial) {
                None => return Err(DimensionError::UnknownDimension(name)),
                Some(Some(SpatialKind::Registered)) => {
                    regions.entry(name).or_default().insert(value, region);
                }
                Some(_) => return Err(DimensionError::NotSpatial(name)),
            }
        }

        tracing::debug!(
            dimensions = dimensions.len(),
            regions = regions.values().map(BTreeMap::len).sum::<usize>(),
            "dimension universe built"
        );
        Ok(DimensionUniverse { dimensions, regions })
    }
}
