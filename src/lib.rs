/// The `galois` module provides the finite-field context every engine borrows.
///
/// Galois field arithmetic is delegated to the `gf-complete` library; the context
/// owns the one-time initialization of its shared lookup tables.
pub mod galois;

/// The `bitmatrix` module wraps the XOR-only kernels of the `jerasure` library.
///
/// A bit-matrix is the binary expansion of a GF(2^w) matrix: every field element
/// becomes a `w × w` block of zeros and ones, so that encoding and reconstruction
/// need nothing but XOR over `packet_size`-byte chunks. Every kernel aborts the
/// process on a misaligned size, so the wrappers check sizes and buffer lengths
/// before any raw call.
///
/// For more information, see the [jerasure documentation](https://github.com/tsuraan/Jerasure/blob/414c96ef2b9934953b6facb31d803d79b1dd1405/Manual.pdf)
pub mod bitmatrix;

/// The `matrix` module builds the systematic encoding matrix of a stripe.
///
/// Parity row `i` and data column `j` hold `1 / (i ^ (pn + j))` in GF(2^8): a
/// Cauchy matrix over the disjoint sets `{0..pn}` and `{pn..pn+dn}`, so every
/// square sub-matrix is invertible and the divisor is never zero.
pub mod matrix;

/// The `decoding` module describes erasure patterns and caches the matching
/// reconstruction matrix.
pub mod decoding;

/// The `fragment` module records the caller's buffers for each stripe column.
pub mod fragment;

/// The `erasure` module provides the coding engine of a stripe.
///
/// An [`ErasureCode`] is configured with a stripe geometry (and, for decoding,
/// an [`ErasureMap`]), has the caller's fragment buffers bound to it, and then
/// encodes parity or rebuilds lost fragments in place.
///
/// ```
/// # use stripe_ec::{ErasureCode, GaloisField, STRIPE_ALIGNMENT};
/// # fn main() -> Result<(), stripe_ec::Error> {
/// let gf = GaloisField::new();
/// let mut stripe = vec![vec![7_u8; STRIPE_ALIGNMENT]; 6];
///
/// let mut ec = ErasureCode::new(&gf);
/// ec.configure(4, 2, None)?;
/// ec.bind_all(stripe.iter_mut().map(Vec::as_mut_slice));
/// ec.encode(STRIPE_ALIGNMENT)?;
/// # Ok(())
/// # }
/// ```
pub mod erasure;

pub use decoding::{DecodingMatrix, ErasureMap, FragmentState};
pub use erasure::{EngineState, ErasureCode};
pub use galois::GaloisField;
pub use matrix::{EncodingMatrix, StripeConfig};

/// Width of a field element in bits, GF(2^8).
pub const WORD_SIZE: usize = 8;

/// Byte granularity of the XOR accumulation inside the kernels.
pub const PACKET_SIZE: usize = 1024;

/// Upper bound of `data + parity` fragments in one stripe.
pub const MAX_FRAGMENTS: usize = 54;

/// Every encode/decode size must be a positive multiple of this many bytes.
pub const STRIPE_ALIGNMENT: usize = WORD_SIZE * PACKET_SIZE;

/// The `Error` enum defines the possible errors that this crate can occur.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Config: the stripe geometry or erasure map is invalid.
    #[error("Invalid Config: {0}")]
    Config(String),
    /// NotEnoughFragments: fewer than `dn` fragments survive, decoding is impossible.
    #[error("Not Enough Fragments: {alive} alive, {needed} needed")]
    NotEnoughFragments { alive: usize, needed: usize },
    /// SingularMatrix: the surviving fragments induce a non-invertible matrix.
    #[error("Singular Matrix: can't make decoding bitmatrix")]
    SingularMatrix,
    /// NotConfigured: the engine has no matrix for the requested operation.
    #[error("Not Configured: {0}")]
    NotConfigured(&'static str),
    /// Validation: misaligned size, or a missing or undersized fragment.
    #[error("Validation Failed: {0}")]
    Validation(String),
    /// InvalidRange: an argument to a field operation is out of range.
    #[error("Invalid Range: {0}")]
    InvalidRange(String),
}

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub(crate) fn invalid_range(msg: impl Into<String>) -> Self {
        Error::InvalidRange(msg.into())
    }
}
