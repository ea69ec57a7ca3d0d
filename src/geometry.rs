//! Fundamental geometric types for tensegrity modelling.

use nalgebra::Vector3;

use crate::errors::ConfigurationError;

/// Largest supported dimensionality.
pub const MAX_DIM: usize = 3;

/// Number of rigid-body modes (translations plus rotations) in `dim` dimensions.
///
/// # Examples
/// ```
/// use tensegrity_sim::rigid_body_modes;
///
/// assert_eq!(rigid_body_modes(2), 3);
/// assert_eq!(rigid_body_modes(3), 6);
/// ```
#[must_use]
pub const fn rigid_body_modes(dim: usize) -> usize {
    dim * (dim + 1) / 2
}

/// Check a coordinate list and pack it into a vector, padding planar input with zero.
fn pack(values: &[f64]) -> Result<Vector3<f64>, ConfigurationError> {
    if values.len() != 2 && values.len() != MAX_DIM {
        return Err(ConfigurationError::InvalidDimension(values.len()));
    }
    if let Some(bad) = values.iter().find(|value| !value.is_finite()) {
        return Err(ConfigurationError::NonFiniteCoordinate(*bad));
    }
    let mut packed = Vector3::zeros();
    packed.as_mut_slice()[..values.len()].copy_from_slice(values);
    Ok(packed)
}

/// Position of a node in two or three dimensional space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    /// Coordinates, with unused trailing axes held at zero.
    coords: Vector3<f64>,
    /// Number of meaningful coordinates.
    dim: usize,
}

impl Point {
    /// Create a two dimensional [`Point`].
    #[must_use]
    pub const fn planar(x: f64, y: f64) -> Self {
        Self {
            coords: Vector3::new(x, y, 0.0),
            dim: 2,
        }
    }

    /// Create a three dimensional [`Point`].
    #[must_use]
    pub const fn spatial(x: f64, y: f64, z: f64) -> Self {
        Self {
            coords: Vector3::new(x, y, z),
            dim: 3,
        }
    }

    /// Create a [`Point`] from a list of two or three coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidDimension`] for any other length and
    /// [`ConfigurationError::NonFiniteCoordinate`] for NaN or infinite values.
    pub fn from_slice(values: &[f64]) -> Result<Self, ConfigurationError> {
        Ok(Self {
            coords: pack(values)?,
            dim: values.len(),
        })
    }

    /// Rebuild a point of dimensionality `dim` from an algebraic vector.
    #[must_use]
    pub fn from_vector(vector: Vector3<f64>, dim: usize) -> Self {
        let mut coords = vector;
        for axis in dim..MAX_DIM {
            coords[axis] = 0.0;
        }
        Self { coords, dim }
    }

    /// Number of coordinates of the point.
    #[must_use]
    pub const fn dim(&self) -> usize {
        self.dim
    }

    /// The meaningful coordinates of the point.
    #[must_use]
    pub fn coords(&self) -> &[f64] {
        &self.coords.as_slice()[..self.dim]
    }

    /// Reject NaN or infinite coordinates, which the `const` helpers let through.
    pub(crate) fn ensure_finite(&self) -> Result<(), ConfigurationError> {
        match self.coords().iter().find(|value| !value.is_finite()) {
            Some(bad) => Err(ConfigurationError::NonFiniteCoordinate(*bad)),
            None => Ok(()),
        }
    }

    /// Convert the point into an algebraic vector.
    #[must_use]
    pub fn to_vector(self) -> Vector3<f64> {
        self.coords
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(&self, other: &Point) -> f64 {
        (self.coords - other.coords).norm()
    }
}

impl From<Point> for Vector3<f64> {
    fn from(value: Point) -> Self {
        value.to_vector()
    }
}

/// Force acting on a node, in two or three dimensions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Force {
    /// Components, with unused trailing axes held at zero.
    components: Vector3<f64>,
    /// Number of meaningful components.
    dim: usize,
}

impl Force {
    /// Create a two dimensional [`Force`].
    #[must_use]
    pub const fn planar(x: f64, y: f64) -> Self {
        Self {
            components: Vector3::new(x, y, 0.0),
            dim: 2,
        }
    }

    /// Create a three dimensional [`Force`].
    #[must_use]
    pub const fn spatial(x: f64, y: f64, z: f64) -> Self {
        Self {
            components: Vector3::new(x, y, z),
            dim: 3,
        }
    }

    /// Create a [`Force`] from a list of two or three components.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidDimension`] for any other length and
    /// [`ConfigurationError::NonFiniteCoordinate`] for NaN or infinite values.
    pub fn from_slice(values: &[f64]) -> Result<Self, ConfigurationError> {
        Ok(Self {
            components: pack(values)?,
            dim: values.len(),
        })
    }

    /// Rebuild a force of dimensionality `dim` from an algebraic vector.
    #[must_use]
    pub fn from_vector(vector: Vector3<f64>, dim: usize) -> Self {
        let mut components = vector;
        for axis in dim..MAX_DIM {
            components[axis] = 0.0;
        }
        Self { components, dim }
    }

    /// Number of components of the force.
    #[must_use]
    pub const fn dim(&self) -> usize {
        self.dim
    }

    /// The meaningful components of the force.
    #[must_use]
    pub fn components(&self) -> &[f64] {
        &self.components.as_slice()[..self.dim]
    }

    /// Largest absolute component.
    #[must_use]
    pub fn max_abs(&self) -> f64 {
        self.components().iter().fold(0.0, |acc, value| acc.max(value.abs()))
    }

    /// Convert the force into an algebraic vector.
    #[must_use]
    pub fn to_vector(self) -> Vector3<f64> {
        self.components
    }
}

impl From<Force> for Vector3<f64> {
    fn from(value: Force) -> Self {
        value.to_vector()
    }
}

/// Convenience helper for creating planar [`Point`] instances.
///
/// # Examples
/// ```
/// use tensegrity_sim::point2;
///
/// let origin = point2(0.0, 0.0);
/// assert_eq!(origin.dim(), 2);
/// ```
#[must_use]
pub const fn point2(x: f64, y: f64) -> Point {
    Point::planar(x, y)
}

/// Convenience helper for creating spatial [`Point`] instances.
#[must_use]
pub const fn point3(x: f64, y: f64, z: f64) -> Point {
    Point::spatial(x, y, z)
}

/// Convenience helper for creating planar [`Force`] instances.
#[must_use]
pub const fn force2(x: f64, y: f64) -> Force {
    Force::planar(x, y)
}

/// Convenience helper for creating spatial [`Force`] instances.
///
/// # Examples
/// ```
/// use tensegrity_sim::force3;
///
/// let load = force3(1.0, 0.0, -5.0);
/// assert_eq!(load.components(), &[1.0, 0.0, -5.0]);
/// ```
#[must_use]
pub const fn force3(x: f64, y: f64, z: f64) -> Force {
    Force::spatial(x, y, z)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planar_point_pads_with_zero() {
        let point = Point::from_slice(&[1.0, 2.0]).expect("two coordinates accepted");
        assert_eq!(point.dim(), 2);
        assert_eq!(point.coords(), &[1.0, 2.0]);
        assert_eq!(point.to_vector(), Vector3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn invalid_coordinate_lists_are_rejected() {
        assert_eq!(
            Point::from_slice(&[1.0]),
            Err(ConfigurationError::InvalidDimension(1))
        );
        assert_eq!(
            Force::from_slice(&[0.0, 0.0, 0.0, 0.0]),
            Err(ConfigurationError::InvalidDimension(4))
        );
        assert!(matches!(
            Point::from_slice(&[f64::NAN, 0.0]),
            Err(ConfigurationError::NonFiniteCoordinate(_))
        ));
    }

    #[test]
    fn from_vector_clears_unused_axes() {
        let point = Point::from_vector(Vector3::new(1.0, 2.0, 3.0), 2);
        assert_eq!(point, point2(1.0, 2.0));
        let force = Force::from_vector(Vector3::new(-1.0, 0.5, 4.0), 3);
        assert_eq!(force, force3(-1.0, 0.5, 4.0));
        assert_eq!(force.max_abs(), 4.0);
    }

    #[test]
    fn distance_is_euclidean() {
        assert_eq!(point3(0.0, 0.0, 0.0).distance(&point3(2.0, 3.0, 6.0)), 7.0);
    }
}
