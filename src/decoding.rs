use std::os::raw::c_int;

use tracing::{debug, warn};

use crate::bitmatrix::{self, BitMatrix};
use crate::galois::GaloisField;
use crate::matrix::EncodingMatrix;
use crate::Error;

/// The state of one fragment in an erasure pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FragmentState {
    /// The fragment survived and may be read as a decode source.
    Alive,
    /// The fragment is lost and will be rebuilt.
    Dead,
    /// The fragment takes no part in this decode.
    #[default]
    Unused,
}

impl FragmentState {
    pub fn is_alive(self) -> bool {
        self == FragmentState::Alive
    }

    pub fn is_dead(self) -> bool {
        self == FragmentState::Dead
    }

    pub(crate) fn as_cint(self) -> c_int {
        match self {
            FragmentState::Alive => 0,
            FragmentState::Dead => 1,
            FragmentState::Unused => -1,
        }
    }
}

/// One [`FragmentState`] per stripe column, data fragments first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErasureMap(Vec<FragmentState>);

impl ErasureMap {
    /// A map of `n` alive fragments.
    pub fn all_alive(n: usize) -> Self {
        Self(vec![FragmentState::Alive; n])
    }

    /// A map of `n` fragments where the listed indices are dead and the rest alive.
    ///
    /// Indices outside `0..n` are ignored.
    pub fn with_dead(n: usize, dead: &[usize]) -> Self {
        let mut map = Self::all_alive(n);
        for &i in dead {
            if let Some(s) = map.0.get_mut(i) {
                *s = FragmentState::Dead;
            }
        }
        map
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<FragmentState> {
        self.0.get(index).copied()
    }

    pub fn set(&mut self, index: usize, state: FragmentState) -> Option<FragmentState> {
        self.0
            .get_mut(index)
            .map(|s| std::mem::replace(s, state))
    }

    pub fn alive_count(&self) -> usize {
        self.0.iter().filter(|s| s.is_alive()).count()
    }

    /// Indices of the dead fragments, in ascending order.
    pub fn dead(&self) -> impl Iterator<Item = usize> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_dead())
            .map(|(i, _)| i)
    }

    pub fn as_slice(&self) -> &[FragmentState] {
        &self.0
    }
}

impl FromIterator<FragmentState> for ErasureMap {
    fn from_iter<I: IntoIterator<Item = FragmentState>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Vec<FragmentState>> for ErasureMap {
    fn from(states: Vec<FragmentState>) -> Self {
        Self(states)
    }
}

/// The reconstruction bit-matrix of one erasure pattern.
///
/// Row `i` rebuilds data fragment `i` from the fragments in
/// [`alive_indices`](Self::alive_indices). Only valid for the exact
/// [`ErasureMap`] it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodingMatrix {
    erasures: ErasureMap,
    bitmatrix: BitMatrix,
    alive: Vec<usize>,
}

impl DecodingMatrix {
    /// Build the decoding matrix of `erasures` against `encoding`.
    ///
    /// # Errors
    /// - [`Error::Config`] if the map length differs from `dn + pn`.
    /// - [`Error::NotEnoughFragments`] if fewer than `dn` fragments are alive.
    /// - [`Error::SingularMatrix`] if the surviving fragments can't be inverted.
    pub fn build(
        gf: &GaloisField,
        encoding: &EncodingMatrix,
        erasures: &ErasureMap,
    ) -> Result<Self, Error> {
        let cfg = encoding.config();
        let (dn, pn) = (cfg.data_count(), cfg.parity_count());
        if erasures.len() != cfg.total() {
            return Err(Error::config(format!(
                "erasure map has {} entries, dn + pn = {}",
                erasures.len(),
                cfg.total()
            )));
        }
        let alive = erasures.alive_count();
        if alive < dn {
            warn!(alive, dn, "not enough alive fragments for decode");
            return Err(Error::NotEnoughFragments { alive, needed: dn });
        }
        let (bitmatrix, alive) =
            bitmatrix::make_decoding(gf, dn, pn, encoding.bitmatrix(), erasures.as_slice())
                .inspect_err(|e| warn!(dn, pn, error = %e, "can't make decoding bitmatrix"))?;
        debug!(dn, pn, ?alive, "built decoding matrix");
        Ok(Self {
            erasures: erasures.clone(),
            bitmatrix,
            alive,
        })
    }

    pub fn erasures(&self) -> &ErasureMap {
        &self.erasures
    }

    pub fn bitmatrix(&self) -> &BitMatrix {
        &self.bitmatrix
    }

    /// The ordered fragment indices the matrix reads from.
    pub fn alive_indices(&self) -> &[usize] {
        &self.alive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::StripeConfig;

    fn encoding(gf: &GaloisField, dn: usize, pn: usize) -> EncodingMatrix {
        EncodingMatrix::build(gf, StripeConfig::new(dn, pn).unwrap()).unwrap()
    }

    #[test]
    fn erasure_map_helpers() {
        let mut map = ErasureMap::with_dead(6, &[1, 4, 9]);
        assert_eq!(map.len(), 6);
        assert_eq!(map.alive_count(), 4);
        assert_eq!(map.dead().collect::<Vec<_>>(), vec![1, 4]);
        assert_eq!(map.set(0, FragmentState::Unused), Some(FragmentState::Alive));
        assert_eq!(map.alive_count(), 3);
        assert_eq!(map.set(6, FragmentState::Dead), None);
        assert_eq!(FragmentState::default(), FragmentState::Unused);
    }

    #[test]
    fn alive_indices_skip_dead_and_unused() {
        let gf = GaloisField::new();
        let enc = encoding(&gf, 4, 2);
        let map: ErasureMap = [
            FragmentState::Alive,
            FragmentState::Dead,
            FragmentState::Unused,
            FragmentState::Alive,
            FragmentState::Alive,
            FragmentState::Alive,
        ]
        .into_iter()
        .collect();
        let dm = DecodingMatrix::build(&gf, &enc, &map).unwrap();
        assert_eq!(dm.alive_indices(), &[0, 3, 4, 5]);
        assert_eq!(dm.bitmatrix().rows(), 32);
        assert_eq!(dm.erasures(), &map);
    }

    #[test]
    fn not_enough_fragments() {
        let gf = GaloisField::new();
        let enc = encoding(&gf, 4, 2);
        let map = ErasureMap::with_dead(6, &[0, 1, 2]);
        assert_eq!(
            DecodingMatrix::build(&gf, &enc, &map),
            Err(Error::NotEnoughFragments {
                alive: 3,
                needed: 4
            })
        );
    }

    #[test]
    fn wrong_map_length() {
        let gf = GaloisField::new();
        let enc = encoding(&gf, 4, 2);
        let map = ErasureMap::all_alive(5);
        assert!(matches!(
            DecodingMatrix::build(&gf, &enc, &map),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn same_pattern_same_matrix() {
        let gf = GaloisField::new();
        let enc = encoding(&gf, 6, 3);
        let map = ErasureMap::with_dead(9, &[0, 5, 7]);
        let a = DecodingMatrix::build(&gf, &enc, &map).unwrap();
        let b = DecodingMatrix::build(&gf, &enc, &map).unwrap();
        assert_eq!(a, b);
    }
}
