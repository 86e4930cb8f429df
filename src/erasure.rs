use tracing::{debug, warn};

use crate::bitmatrix;
use crate::decoding::{DecodingMatrix, ErasureMap};
use crate::fragment::FragmentBinder;
use crate::galois::GaloisField;
use crate::matrix::{EncodingMatrix, StripeConfig};
use crate::Error;

/// The lifecycle of an [`ErasureCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No stripe geometry; every operation but `configure` fails.
    Unconfigured,
    /// The encoding matrix is built; `encode` is possible.
    Configured,
    /// A decoding matrix is cached as well; `decode` is possible.
    DecodeReady,
}

#[derive(Debug, Default)]
enum DecodeCache {
    #[default]
    Empty,
    Ready(DecodingMatrix),
    Singular,
}

/// The coding engine.
///
/// The engine owns its matrices and borrows everything else: the field context
/// and the fragment buffers live at least as long as `'a`. Buffers handed to
/// [`bind`](Self::bind) can be taken back with [`unbind`](Self::unbind).
///
/// Engines share nothing mutable, so independent instances may encode and
/// decode concurrently on disjoint buffers.
pub struct ErasureCode<'a> {
    gf: &'a GaloisField,
    encoding: Option<EncodingMatrix>,
    decoding: DecodeCache,
    fragments: FragmentBinder<'a>,
}

impl<'a> ErasureCode<'a> {
    /// Create an unconfigured engine on top of `gf`.
    pub fn new(gf: &'a GaloisField) -> Self {
        Self {
            gf,
            encoding: None,
            decoding: DecodeCache::Empty,
            fragments: FragmentBinder::default(),
        }
    }

    /// Configure the stripe geometry and, when `erasures` is given, cache the
    /// decoding matrix of that erasure pattern.
    ///
    /// Any previous state is cleared first. When only the decoding matrix
    /// can't be built, the error is returned but the engine stays
    /// [`Configured`](EngineState::Configured) and can still encode.
    ///
    /// # Errors
    /// - [`Error::Config`] for an invalid `dn`/`pn` or an erasure map whose
    ///   length isn't `dn + pn`.
    /// - [`Error::NotEnoughFragments`] if fewer than `dn` fragments are alive.
    /// - [`Error::SingularMatrix`] if the alive fragments can't be inverted.
    pub fn configure(
        &mut self,
        dn: usize,
        pn: usize,
        erasures: Option<&ErasureMap>,
    ) -> Result<(), Error> {
        self.clear();
        let config = StripeConfig::new(dn, pn)?;
        let encoding = EncodingMatrix::build(self.gf, config)?;
        self.fragments = FragmentBinder::new(config.total());
        debug!(dn, pn, decode = erasures.is_some(), "configured erasure code");

        let res = match erasures {
            None => Ok(()),
            Some(map) => match DecodingMatrix::build(self.gf, &encoding, map) {
                Ok(dm) => {
                    self.decoding = DecodeCache::Ready(dm);
                    Ok(())
                }
                Err(Error::SingularMatrix) => {
                    self.decoding = DecodeCache::Singular;
                    Err(Error::SingularMatrix)
                }
                Err(e) => Err(e),
            },
        };
        self.encoding = Some(encoding);
        res
    }

    pub fn state(&self) -> EngineState {
        match (&self.encoding, &self.decoding) {
            (None, _) => EngineState::Unconfigured,
            (Some(_), DecodeCache::Ready(_)) => EngineState::DecodeReady,
            (Some(_), _) => EngineState::Configured,
        }
    }

    /// Return the stripe geometry, if configured.
    pub fn config(&self) -> Option<StripeConfig> {
        self.encoding.as_ref().map(EncodingMatrix::config)
    }

    pub fn encoding_matrix(&self) -> Option<&EncodingMatrix> {
        self.encoding.as_ref()
    }

    pub fn decoding_matrix(&self) -> Option<&DecodingMatrix> {
        match &self.decoding {
            DecodeCache::Ready(dm) => Some(dm),
            _ => None,
        }
    }

    /// Return the erasure map the cached decoding matrix was built from.
    pub fn erasure_map(&self) -> Option<&ErasureMap> {
        self.decoding_matrix().map(DecodingMatrix::erasures)
    }

    /// Bind `buf` as the fragment at `index`.
    ///
    /// Data fragments occupy `0..dn`, parity fragments `dn..dn+pn`. Only the
    /// index is checked here; lengths are checked by `encode` and `decode`.
    pub fn bind(&mut self, index: usize, buf: &'a mut [u8]) -> Result<(), Error> {
        if self.encoding.is_none() {
            return Err(Error::NotConfigured("call configure() before bind()"));
        }
        self.fragments.bind(index, buf)
    }

    /// Bind `bufs` to indices `0..min(bufs.len(), dn + pn)` and return how many
    /// were bound. Binds nothing on an unconfigured engine.
    pub fn bind_all<I>(&mut self, bufs: I) -> usize
    where
        I: IntoIterator<Item = &'a mut [u8]>,
    {
        self.fragments.bind_all(bufs)
    }

    /// Hand the buffer bound at `index` back to the caller.
    pub fn unbind(&mut self, index: usize) -> Option<&'a mut [u8]> {
        self.fragments.unbind(index)
    }

    pub fn unbind_all(&mut self) {
        self.fragments.clear();
    }

    /// Return the buffer bound at `index`.
    pub fn fragment(&self, index: usize) -> Option<&[u8]> {
        self.fragments.get(index)
    }

    /// Release the matrices and every binding; the engine is unconfigured again.
    pub fn clear(&mut self) {
        self.encoding = None;
        self.decoding = DecodeCache::Empty;
        self.fragments = FragmentBinder::default();
    }

    /// Compute the parity fragments from the first `size` bytes of the data
    /// fragments, writing them into the bound parity buffers.
    ///
    /// # Requires
    /// - `size` is a positive multiple of [`STRIPE_ALIGNMENT`](crate::STRIPE_ALIGNMENT).
    /// - Every one of the `dn + pn` fragments is bound with at least `size` bytes.
    ///
    /// Nothing is written when a requirement fails.
    pub fn encode(&mut self, size: usize) -> Result<(), Error> {
        let encoding = self
            .encoding
            .as_ref()
            .ok_or(Error::NotConfigured("matrix invalid, call configure() first"))?;
        let cfg = encoding.config();
        bitmatrix::check_size(size)
            .inspect_err(|e| warn!(error = %e, "size invalid for encode"))?;
        let mut views = self
            .fragments
            .checked_views(size)
            .inspect_err(|e| warn!(error = %e, "fragment binding invalid for encode"))?;

        bitmatrix::encode(
            self.gf,
            cfg.data_count(),
            cfg.parity_count(),
            encoding.bitmatrix(),
            &mut views,
            size,
        )?;
        debug!(dn = cfg.data_count(), pn = cfg.parity_count(), size, "encoded stripe");
        Ok(())
    }

    /// Rebuild the lost fragments of the configured erasure map, in place.
    ///
    /// Every data fragment that isn't [`Alive`](crate::FragmentState::Alive) is
    /// rebuilt first from the alive fragments; parity fragments marked
    /// [`Dead`](crate::FragmentState::Dead) are then recomputed from the now
    /// complete data. Unused parity fragments are left untouched.
    ///
    /// # Requires
    /// Same as [`encode`](Self::encode). Dead buffers must be bound too; their
    /// contents are overwritten.
    ///
    /// # Note
    /// Every requirement is checked before the first write, and the kernels
    /// have no failure path once their inputs are valid. A decode that returns
    /// an error has therefore written nothing.
    pub fn decode(&mut self, size: usize) -> Result<(), Error> {
        let dm = match &self.decoding {
            DecodeCache::Ready(dm) => dm,
            DecodeCache::Singular => return Err(Error::SingularMatrix),
            DecodeCache::Empty => {
                return Err(Error::NotConfigured(
                    "decode matrix invalid, call configure() with an erasure map first",
                ));
            }
        };
        let encoding = self
            .encoding
            .as_ref()
            .ok_or(Error::NotConfigured("matrix invalid, call configure() first"))?;
        let cfg = encoding.config();
        let dn = cfg.data_count();
        bitmatrix::check_size(size)
            .inspect_err(|e| warn!(error = %e, "size invalid for decode"))?;
        let mut views = self
            .fragments
            .checked_views(size)
            .inspect_err(|e| warn!(error = %e, "fragment binding invalid for decode"))?;

        // the parity pass reads all dn data fragments: rebuild every one not alive
        let erasures = dm.erasures();
        let dead_data: Vec<usize> = (0..dn)
            .filter(|&i| erasures.get(i).is_some_and(|s| !s.is_alive()))
            .collect();
        let dead_parity: Vec<usize> = erasures.dead().filter(|&i| !cfg.is_data(i)).collect();
        let data_rows = dead_data
            .iter()
            .map(|&i| block_row(dm.bitmatrix(), i).map(|row| (i, row)))
            .collect::<Result<Vec<_>, _>>()?;
        let parity_rows = dead_parity
            .iter()
            .map(|&i| block_row(encoding.bitmatrix(), i - dn).map(|row| (i, row)))
            .collect::<Result<Vec<_>, _>>()?;

        for (i, row) in data_rows {
            bitmatrix::dot_product(
                self.gf,
                dn,
                row,
                Some(dm.alive_indices()),
                i,
                &mut views,
                size,
            )?;
        }
        // parity last: it reads the data rebuilt above
        for (i, row) in parity_rows {
            bitmatrix::dot_product(self.gf, dn, row, None, i, &mut views, size)?;
        }
        debug!(
            dn,
            pn = cfg.parity_count(),
            size,
            ?dead_data,
            ?dead_parity,
            "decoded stripe"
        );
        Ok(())
    }
}

fn block_row(bm: &bitmatrix::BitMatrix, index: usize) -> Result<&[std::os::raw::c_int], Error> {
    bm.block_row(index)
        .ok_or_else(|| Error::invalid_range(format!("no bitmatrix row {index}")))
}
