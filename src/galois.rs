use std::sync::Once;

use crate::{Error, WORD_SIZE};

/// Guards the first touch of the tables `gf-complete` shares across the process.
static TABLES: Once = Once::new();

/// The `GaloisField` struct is the arithmetic context for GF(2^8).
///
/// `gf-complete` keeps its multiplication and division tables in process-wide
/// state that is filled on first use. Constructing the context fills them under
/// a one-time guard, so no later call can race on their initialization. Build
/// one field at startup and lend it to every [`ErasureCode`](crate::ErasureCode)
/// by reference.
///
/// Once constructed, every method here is lock-free.
#[derive(Debug)]
pub struct GaloisField {
    _tables: (),
}

impl GaloisField {
    /// Creates the field context and initializes the shared tables.
    pub fn new() -> Self {
        let gf = GaloisField { _tables: () };
        gf.ensure_init();
        gf
    }

    /// Returns the word size of the field, always [`WORD_SIZE`].
    pub fn w(&self) -> usize {
        WORD_SIZE
    }

    pub(crate) fn ensure_init(&self) {
        TABLES.call_once(|| unsafe {
            jerasure_sys::jerasure::galois_init_default_field(WORD_SIZE as i32);
        });
    }

    /// Returns the inverse of `a` in the GF(2^8).
    /// # Example
    /// ```
    /// # use stripe_ec::GaloisField;
    /// let gf = GaloisField::new();
    /// assert_eq!(gf.inverse(142).unwrap(), 2);
    /// ```
    pub fn inverse(&self, a: u8) -> Result<u8, Error> {
        self.divide(1, a)
    }

    /// Returns the result of `a * b` in the GF(2^8).
    /// # Example
    /// ```
    /// # use stripe_ec::GaloisField;
    /// let gf = GaloisField::new();
    /// assert_eq!(gf.multiply(24, 84), 179);
    /// ```
    /// # Note: This is not the same as `a * b` in normal arithmetic.
    pub fn multiply(&self, a: u8, b: u8) -> u8 {
        self.ensure_init();
        let r = unsafe {
            jerasure_sys::jerasure::galois_single_multiply(a.into(), b.into(), WORD_SIZE as i32)
        };
        // the product of two w-bit elements is a w-bit element
        r as u8
    }

    /// Returns the result of `a / b` in the GF(2^8).
    /// # Example
    /// ```
    /// # use stripe_ec::GaloisField;
    /// let gf = GaloisField::new();
    /// assert_eq!(gf.divide(23, 74).unwrap(), 91);
    /// assert!(gf.divide(23, 0).is_err());
    /// ```
    /// # Note: This is not the same as `a / b` in normal arithmetic.
    pub fn divide(&self, a: u8, b: u8) -> Result<u8, Error> {
        if b == 0 {
            return Err(Error::invalid_range(format!("division of {a} by zero")));
        }
        self.ensure_init();
        let r = unsafe {
            jerasure_sys::jerasure::galois_single_divide(a.into(), b.into(), WORD_SIZE as i32)
        };
        Ok(r as u8)
    }
}

impl Default for GaloisField {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::GaloisField;

    #[test]
    fn test_ctor() {
        let gf = GaloisField::new();
        assert_eq!(gf.w(), 8);
        let gf = GaloisField::default();
        assert_eq!(gf.multiply(1, 77), 77);
    }

    #[test]
    fn test_divide_inverts_multiply() {
        let gf = GaloisField::new();
        for a in 1..=255_u8 {
            let inv = gf.inverse(a).unwrap();
            assert_eq!(gf.multiply(a, inv), 1, "a = {a}");
        }
        assert_eq!(gf.divide(0, 9).unwrap(), 0);
        assert!(gf.inverse(0).is_err());
    }

    #[test]
    fn test_shared_across_threads() {
        let gf = GaloisField::default();
        let results: Vec<u8> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| gf.divide(1, 3).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(results.iter().all(|&r| r == 244));
    }
}
