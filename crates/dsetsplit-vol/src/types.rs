//! Element types and dataspaces.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VolError};

/// Fixed-size element type of a dataset or attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Datatype {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

impl Datatype {
    /// Size of one element in bytes.
    pub const fn size(self) -> usize {
        match self {
            Datatype::I8 | Datatype::U8 => 1,
            Datatype::I16 | Datatype::U16 => 2,
            Datatype::I32 | Datatype::U32 | Datatype::F32 => 4,
            Datatype::I64 | Datatype::U64 | Datatype::F64 => 8,
        }
    }
}

/// Shape of a dataset or attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dataspace {
    /// A single element.
    Scalar,
    /// An n-dimensional array with fixed dimensions.
    Simple(Vec<u64>),
}

impl Dataspace {
    pub fn simple(dims: &[u64]) -> Self {
        Dataspace::Simple(dims.to_vec())
    }

    pub fn rank(&self) -> usize {
        match self {
            Dataspace::Scalar => 0,
            Dataspace::Simple(dims) => dims.len(),
        }
    }

    pub fn dims(&self) -> &[u64] {
        match self {
            Dataspace::Scalar => &[],
            Dataspace::Simple(dims) => dims,
        }
    }

    /// Element count, saturating at `u64::MAX`.
    pub fn num_elements(&self) -> u64 {
        self.dims()
            .iter()
            .try_fold(1u64, |acc, &d| acc.checked_mul(d))
            .unwrap_or(u64::MAX)
    }

    /// Number of bytes needed to hold every element of `dtype`.
    pub fn byte_len(&self, dtype: Datatype) -> Result<usize> {
        usize::try_from(self.num_elements())
            .ok()
            .and_then(|n| n.checked_mul(dtype.size()))
            .ok_or_else(|| VolError::DataError(format!("dataspace {:?} is too large", self.dims())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_has_one_element() {
        let s = Dataspace::Scalar;
        assert_eq!(s.rank(), 0);
        assert_eq!(s.num_elements(), 1);
        assert_eq!(s.byte_len(Datatype::I32).unwrap(), 4);
    }

    #[test]
    fn simple_byte_len() {
        let s = Dataspace::simple(&[20000, 20]);
        assert_eq!(s.rank(), 2);
        assert_eq!(s.num_elements(), 400_000);
        assert_eq!(s.byte_len(Datatype::I32).unwrap(), 1_600_000);
        assert_eq!(Dataspace::simple(&[3, 0]).num_elements(), 0);
    }

    #[test]
    fn oversized_dataspace_is_rejected() {
        let s = Dataspace::simple(&[u64::MAX, 4]);
        assert!(s.byte_len(Datatype::F64).is_err());
    }

    #[test]
    fn datatype_sizes() {
        assert_eq!(Datatype::U8.size(), 1);
        assert_eq!(Datatype::I16.size(), 2);
        assert_eq!(Datatype::F32.size(), 4);
        assert_eq!(Datatype::U64.size(), 8);
    }
}
