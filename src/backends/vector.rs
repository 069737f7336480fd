/// A trait for vector-like types that can be bound to array variables of code objects.
///
/// Arrays are copied into [`Bindings`](crate::codegen::Bindings) from any implementor
/// and copied back out into any implementor, so state can be kept in a plain `Vec`,
/// a fixed-size array, or (with the matching features enabled) an ndarray or nalgebra
/// vector.
///
/// # Examples
///
/// ```rust
/// use diffeq_codegen::prelude::{Bindings, Vector};
///
/// let v: Vec<f64> = Vector::zeros(3);
/// let bindings = Bindings::new().with_array("_array_v", &v);
/// assert_eq!(bindings.array("_array_v").unwrap().len(), 3);
///
/// let back: [f64; 3] = bindings.array_as("_array_v").unwrap();
/// assert_eq!(back, [0.0; 3]);
/// ```
pub trait Vector {
    /// Returns a reference to the vector's data as a slice.
    fn as_slice(&self) -> &[f64];

    /// Returns a mutable reference to the vector's data as a slice.
    fn as_mut_slice(&mut self) -> &mut [f64];

    /// Creates a new vector of the specified length filled with zeros.
    ///
    /// # Arguments
    /// * `len` - The length of the vector to create
    fn zeros(len: usize) -> Self;

    /// Returns the length of the vector.
    fn len(&self) -> usize;

    /// Creates a vector holding a copy of `values`, or `None` if the type cannot hold
    /// that many elements.
    fn from_slice(values: &[f64]) -> Option<Self>
    where
        Self: Sized,
    {
        let mut result = Self::zeros(values.len());
        result.as_mut_slice().copy_from_slice(values);
        Some(result)
    }

    /// Checks if the vector is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Vector for Vec<f64> {
    fn as_slice(&self) -> &[f64] {
        self
    }

    fn as_mut_slice(&mut self) -> &mut [f64] {
        self
    }

    fn zeros(len: usize) -> Self {
        vec![0.0; len]
    }

    fn len(&self) -> usize {
        self.len()
    }
}

/// Requires a contiguous array in standard layout, which is what `zeros` creates.
///
/// # Examples
///
/// ```rust
/// use diffeq_codegen::prelude::{Bindings, Vector};
/// use ndarray::Array1;
///
/// let v = Array1::from(vec![1.0, 2.0]);
/// let bindings = Bindings::new().with_array("_array_v", &v);
/// let back: Array1<f64> = bindings.array_as("_array_v").unwrap();
/// assert_eq!(back, v);
/// ```
#[cfg(feature = "ndarray")]
impl Vector for ndarray::Array1<f64> {
    fn as_slice(&self) -> &[f64] {
        self.as_slice()
            .expect("Array1 bound to a code object must be contiguous")
    }

    fn as_mut_slice(&mut self) -> &mut [f64] {
        self.as_slice_mut()
            .expect("Array1 bound to a code object must be contiguous")
    }

    fn zeros(len: usize) -> Self {
        ndarray::Array1::zeros(len)
    }

    fn len(&self) -> usize {
        self.len()
    }
}

/// # Examples
///
/// ```rust
/// use diffeq_codegen::prelude::{Bindings, Vector};
/// use nalgebra::DVector;
///
/// let v = DVector::from_vec(vec![1.0, 2.0]);
/// let bindings = Bindings::new().with_array("_array_v", &v);
/// let back: DVector<f64> = bindings.array_as("_array_v").unwrap();
/// assert_eq!(back, v);
/// ```
#[cfg(feature = "nalgebra")]
impl Vector for nalgebra::DVector<f64> {
    fn as_slice(&self) -> &[f64] {
        self.as_slice()
    }

    fn as_mut_slice(&mut self) -> &mut [f64] {
        self.as_mut_slice()
    }

    fn zeros(len: usize) -> Self {
        nalgebra::DVector::zeros(len)
    }

    fn len(&self) -> usize {
        self.len()
    }
}

/// The array size is fixed by the const generic parameter `N`.
///
/// # Panics
/// `zeros` panics if `len` differs from `N`. `from_slice` returns `None` instead.
impl<const N: usize> Vector for [f64; N] {
    fn as_slice(&self) -> &[f64] {
        self
    }

    fn as_mut_slice(&mut self) -> &mut [f64] {
        self
    }

    fn zeros(len: usize) -> Self {
        assert_eq!(len, N, "Array length must match const generic size");
        [0.0; N]
    }

    fn len(&self) -> usize {
        N
    }

    fn from_slice(values: &[f64]) -> Option<Self> {
        <[f64; N]>::try_from(values).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec() {
        let mut v = <Vec<f64> as Vector>::zeros(2);
        Vector::as_mut_slice(&mut v)[1] = 3.0;
        assert_eq!(Vector::as_slice(&v), &[0.0, 3.0]);
        assert!(!Vector::is_empty(&v));
    }

    #[test]
    fn test_fixed_size_from_slice() {
        assert_eq!(<[f64; 2] as Vector>::from_slice(&[1.0, 2.0]), Some([1.0, 2.0]));
        assert_eq!(<[f64; 3] as Vector>::from_slice(&[1.0, 2.0]), None);
        assert_eq!(<Vec<f64> as Vector>::from_slice(&[1.0]), Some(vec![1.0]));
    }

    #[test]
    #[should_panic(expected = "Array length must match const generic size")]
    fn test_fixed_size_mismatch() {
        let _ = <[f64; 3] as Vector>::zeros(2);
    }
}
