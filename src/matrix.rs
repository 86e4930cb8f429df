use tracing::debug;

use crate::bitmatrix::{self, BitMatrix};
use crate::galois::GaloisField;
use crate::{Error, MAX_FRAGMENTS};

/// The geometry of a stripe: `dn` data fragments followed by `pn` parity fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StripeConfig {
    dn: usize,
    pn: usize,
}

impl StripeConfig {
    /// Validate a stripe geometry.
    ///
    /// # Requires
    /// - `dn >= 1` and `pn >= 1`
    /// - `dn + pn <= MAX_FRAGMENTS`
    pub fn new(dn: usize, pn: usize) -> Result<Self, Error> {
        if dn < 1 {
            return Err(Error::config("dn must be greater than 0"));
        }
        if pn < 1 {
            return Err(Error::config("pn must be greater than 0"));
        }
        if dn + pn > MAX_FRAGMENTS {
            return Err(Error::config(format!(
                "dn + pn({}) must be less or equal than {MAX_FRAGMENTS}",
                dn + pn
            )));
        }
        Ok(Self { dn, pn })
    }

    /// Return the number of data fragments.
    pub fn data_count(&self) -> usize {
        self.dn
    }

    /// Return the number of parity fragments.
    pub fn parity_count(&self) -> usize {
        self.pn
    }

    /// Return `dn + pn`.
    pub fn total(&self) -> usize {
        self.dn + self.pn
    }

    /// Whether `index` addresses a data fragment.
    pub fn is_data(&self, index: usize) -> bool {
        index < self.dn
    }
}

/// The `pn × dn` encoding matrix and its bit-matrix expansion.
///
/// A pure function of the stripe geometry: the same `(dn, pn)` always yields
/// bit-identical matrices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingMatrix {
    config: StripeConfig,
    elements: Vec<u8>,
    bitmatrix: BitMatrix,
}

impl EncodingMatrix {
    pub fn build(gf: &GaloisField, config: StripeConfig) -> Result<Self, Error> {
        let (dn, pn) = (config.dn, config.pn);
        let mut elements = Vec::with_capacity(dn * pn);
        for i in 0..pn {
            for j in 0..dn {
                // i < pn <= pn + j, so the divisor is non-zero
                let x = u8::try_from(i ^ (pn + j))
                    .map_err(|_| Error::config("stripe exceeds the field size"))?;
                elements.push(gf.divide(1, x)?);
            }
        }
        let bitmatrix = bitmatrix::expand(gf, dn, pn, &elements)?;
        debug!(dn, pn, bits = bitmatrix.as_slice().len(), "built encoding matrix");
        Ok(Self {
            config,
            elements,
            bitmatrix,
        })
    }

    pub fn config(&self) -> StripeConfig {
        self.config
    }

    /// Return element `(row, col)` of the field matrix.
    pub fn element(&self, row: usize, col: usize) -> Option<u8> {
        if row >= self.config.pn || col >= self.config.dn {
            return None;
        }
        Some(self.elements[row * self.config.dn + col])
    }

    /// The field matrix in row-major order.
    pub fn elements(&self) -> &[u8] {
        &self.elements
    }

    pub fn bitmatrix(&self) -> &BitMatrix {
        &self.bitmatrix
    }
}
