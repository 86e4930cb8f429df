use std::ffi::c_char;
use std::os::raw::c_int;

use iter_tools::Itertools;

use crate::galois::GaloisField;
use crate::{Error, FragmentState, PACKET_SIZE, STRIPE_ALIGNMENT, WORD_SIZE};

/// A matrix allocated with `malloc` inside Jerasure.
#[derive(Debug)]
struct MallocMatrix {
    ptr: *mut c_int,
}

impl MallocMatrix {
    /// Make a malloc box from a pointer from `malloc`.
    ///
    /// # Safety
    /// This function is unsafe because improper use may lead to memory problems. For example,
    /// a double-free may occur if the function is called twice on the same raw pointer.
    unsafe fn try_from_raw(ptr: *mut c_int) -> Option<Self> {
        if ptr.is_null() {
            return None;
        }
        Some(Self { ptr })
    }

    /// # Safety
    /// `len` must not exceed the number of elements Jerasure allocated.
    unsafe fn to_vec(&self, len: usize) -> Vec<c_int> {
        unsafe { std::slice::from_raw_parts(self.ptr, len) }.to_vec()
    }
}

impl Drop for MallocMatrix {
    fn drop(&mut self) {
        unsafe {
            jerasure_sys::jerasure::jerasure_free_matrix(self.ptr);
        }
    }
}

/// A row-major binary matrix, one `c_int` (0 or 1) per bit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitMatrix {
    rows: usize,
    cols: usize,
    bits: Vec<c_int>,
}

impl BitMatrix {
    fn zeroed(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            bits: vec![0; rows * cols],
        }
    }

    /// Return the number of bit rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Return the number of bit columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Return the bit at `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> Option<bool> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        Some(self.bits[row * self.cols + col] != 0)
    }

    /// Return the `w` bit rows that expand fragment row `index`.
    pub fn block_row(&self, index: usize) -> Option<&[c_int]> {
        let stride = self.cols * WORD_SIZE;
        let start = index.checked_mul(stride)?;
        self.bits.get(start..start.checked_add(stride)?)
    }

    pub fn as_slice(&self) -> &[c_int] {
        &self.bits
    }

    fn as_ptr(&self) -> *mut c_int {
        // Jerasure never writes through its matrix arguments.
        self.bits.as_ptr() as *mut c_int
    }
}

fn to_cint(v: usize, what: &str) -> Result<c_int, Error> {
    c_int::try_from(v).map_err(|_| Error::validation(format!("{what}({v}) overflows c_int")))
}

pub(crate) fn check_size(size: usize) -> Result<c_int, Error> {
    if size == 0 || size % STRIPE_ALIGNMENT != 0 {
        return Err(Error::validation(format!(
            "size({size}) must be a positive multiple of w * packet_size({STRIPE_ALIGNMENT})"
        )));
    }
    to_cint(size, "size")
}

fn fragment_ptrs(fragments: &mut [&mut [u8]], size: usize) -> Result<Vec<*mut c_char>, Error> {
    fragments
        .iter_mut()
        .enumerate()
        .map(|(i, f)| {
            if f.len() < size {
                Err(Error::validation(format!(
                    "fragment {i} holds {} bytes, {size} required",
                    f.len()
                )))
            } else {
                Ok(f)
            }
        })
        .map_ok(|f| f.as_mut_ptr() as *mut c_char)
        .try_collect()
}

/// Expand a `pn × dn` field matrix into its `pn*w × dn*w` bit-matrix.
pub fn expand(
    gf: &GaloisField,
    dn: usize,
    pn: usize,
    elements: &[u8],
) -> Result<BitMatrix, Error> {
    if elements.len() != dn * pn {
        return Err(Error::invalid_range(format!(
            "matrix has {} elements, dn * pn = {}",
            elements.len(),
            dn * pn
        )));
    }
    gf.ensure_init();
    let mut mat: Vec<c_int> = elements.iter().map(|&e| c_int::from(e)).collect();
    let raw = unsafe {
        MallocMatrix::try_from_raw(jerasure_sys::jerasure::jerasure_matrix_to_bitmatrix(
            to_cint(dn, "dn")?,
            to_cint(pn, "pn")?,
            WORD_SIZE as c_int,
            mat.as_mut_ptr(),
        ))
    }
    .ok_or_else(|| Error::config("Failed to create bit matrix"))?;
    let (rows, cols) = (pn * WORD_SIZE, dn * WORD_SIZE);
    Ok(BitMatrix {
        rows,
        cols,
        bits: unsafe { raw.to_vec(rows * cols) },
    })
}

/// Build the reconstruction bit-matrix for `erasures`.
///
/// Returns the `dn*w × dn*w` inverse of the sub-matrix induced by the first
/// `dn` alive fragments, together with the indices of those fragments.
pub fn make_decoding(
    gf: &GaloisField,
    dn: usize,
    pn: usize,
    encoding: &BitMatrix,
    erasures: &[FragmentState],
) -> Result<(BitMatrix, Vec<usize>), Error> {
    if erasures.len() != dn + pn {
        return Err(Error::config(format!(
            "erasure map has {} entries, dn + pn = {}",
            erasures.len(),
            dn + pn
        )));
    }
    if encoding.rows != pn * WORD_SIZE || encoding.cols != dn * WORD_SIZE {
        return Err(Error::invalid_range(format!(
            "encoding bitmatrix is {}x{}, expected {}x{}",
            encoding.rows,
            encoding.cols,
            pn * WORD_SIZE,
            dn * WORD_SIZE
        )));
    }
    // Jerasure scans past the end of the map when fewer than dn are alive.
    let alive = erasures.iter().filter(|s| s.is_alive()).count();
    if alive < dn {
        return Err(Error::NotEnoughFragments { alive, needed: dn });
    }
    gf.ensure_init();
    let mut erased: Vec<c_int> = erasures.iter().map(|s| s.as_cint()).collect();
    let mut decoding = BitMatrix::zeroed(dn * WORD_SIZE, dn * WORD_SIZE);
    let mut dm_ids: Vec<c_int> = vec![-1; dn];
    let ret = unsafe {
        jerasure_sys::jerasure::jerasure_make_decoding_bitmatrix(
            to_cint(dn, "dn")?,
            to_cint(pn, "pn")?,
            WORD_SIZE as c_int,
            encoding.as_ptr(),
            erased.as_mut_ptr(),
            decoding.bits.as_mut_ptr(),
            dm_ids.as_mut_ptr(),
        )
    };
    if ret < 0 {
        return Err(Error::SingularMatrix);
    }
    let alive_ids = dm_ids
        .into_iter()
        .map(|id| usize::try_from(id).map_err(|_| Error::SingularMatrix))
        .try_collect()?;
    Ok((decoding, alive_ids))
}

/// Compute the `pn` parity fragments of a stripe in place.
///
/// `fragments` holds the `dn` data fragments followed by the `pn` parity
/// fragments; only the first `size` bytes of each are touched.
pub fn encode(
    gf: &GaloisField,
    dn: usize,
    pn: usize,
    bitmatrix: &BitMatrix,
    fragments: &mut [&mut [u8]],
    size: usize,
) -> Result<(), Error> {
    let csize = check_size(size)?;
    if fragments.len() != dn + pn {
        return Err(Error::validation(format!(
            "stripe has {} fragments, dn + pn = {}",
            fragments.len(),
            dn + pn
        )));
    }
    if bitmatrix.rows != pn * WORD_SIZE || bitmatrix.cols != dn * WORD_SIZE {
        return Err(Error::invalid_range("bitmatrix does not match dn and pn"));
    }
    let mut ptrs = fragment_ptrs(fragments, size)?;
    gf.ensure_init();
    unsafe {
        let data_ptrs = ptrs.as_mut_ptr();
        let coding_ptrs = data_ptrs.add(dn);
        jerasure_sys::jerasure::jerasure_bitmatrix_encode(
            to_cint(dn, "dn")?,
            to_cint(pn, "pn")?,
            WORD_SIZE as c_int,
            bitmatrix.as_ptr(),
            data_ptrs,
            coding_ptrs,
            csize,
            PACKET_SIZE as c_int,
        );
    }
    Ok(())
}

/// Overwrite fragment `dest` with the XOR dot product of `row` and the sources.
///
/// `row` is one block row (`w` bit rows of `dn*w` columns). Sources are the
/// fragments listed in `src_ids`, or the `dn` data fragments when `None`.
pub fn dot_product(
    gf: &GaloisField,
    dn: usize,
    row: &[c_int],
    src_ids: Option<&[usize]>,
    dest: usize,
    fragments: &mut [&mut [u8]],
    size: usize,
) -> Result<(), Error> {
    let csize = check_size(size)?;
    if row.len() != dn * WORD_SIZE * WORD_SIZE {
        return Err(Error::invalid_range(format!(
            "bitmatrix row has {} bits, expected {}",
            row.len(),
            dn * WORD_SIZE * WORD_SIZE
        )));
    }
    if dest >= fragments.len() || fragments.len() < dn {
        return Err(Error::validation(format!(
            "destination {dest} outside stripe of {} fragments",
            fragments.len()
        )));
    }
    let mut ids: Option<Vec<c_int>> = match src_ids {
        None => {
            if dest < dn {
                return Err(Error::validation("destination is one of the data sources"));
            }
            None
        }
        Some(ids) => {
            if ids.len() != dn {
                return Err(Error::validation(format!(
                    "{} source fragments given, {dn} required",
                    ids.len()
                )));
            }
            if ids.iter().any(|&id| id >= fragments.len() || id == dest) {
                return Err(Error::validation(format!(
                    "source ids {ids:?} must be in range and exclude destination {dest}"
                )));
            }
            Some(ids.iter().map(|&id| to_cint(id, "source id")).try_collect()?)
        }
    };
    let mut ptrs = fragment_ptrs(fragments, size)?;
    gf.ensure_init();
    unsafe {
        let data_ptrs = ptrs.as_mut_ptr();
        let coding_ptrs = data_ptrs.add(dn);
        jerasure_sys::jerasure::jerasure_bitmatrix_dotprod(
            to_cint(dn, "dn")?,
            WORD_SIZE as c_int,
            row.as_ptr() as *mut c_int,
            ids.as_mut()
                .map_or(std::ptr::null_mut(), |ids| ids.as_mut_ptr()),
            to_cint(dest, "dest")?,
            data_ptrs,
            coding_ptrs,
            csize,
            PACKET_SIZE as c_int,
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_blocks_follow_field_multiplication() {
        let gf = GaloisField::new();
        let elements = [142_u8, 244, 71, 167, 244, 142, 167, 71];
        let bm = expand(&gf, 4, 2, &elements).unwrap();
        assert_eq!((bm.rows(), bm.cols()), (16, 32));
        for i in 0..2 {
            for j in 0..4 {
                let mut elt = elements[i * 4 + j];
                for x in 0..WORD_SIZE {
                    for l in 0..WORD_SIZE {
                        let want = elt & (1 << l) != 0;
                        assert_eq!(bm.get(i * WORD_SIZE + l, j * WORD_SIZE + x), Some(want));
                    }
                    elt = gf.multiply(elt, 2);
                }
            }
        }
        assert_eq!(bm.block_row(1).map(<[c_int]>::len), Some(8 * 32));
        assert!(bm.block_row(2).is_none());
    }

    #[test]
    fn expand_rejects_wrong_shape() {
        let gf = GaloisField::new();
        assert!(matches!(
            expand(&gf, 4, 2, &[1, 2, 3]),
            Err(Error::InvalidRange(_))
        ));
    }

    #[test]
    fn kernels_reject_misaligned_size() {
        let gf = GaloisField::new();
        let bm = expand(&gf, 1, 1, &[1]).unwrap();
        let mut a = vec![0_u8; STRIPE_ALIGNMENT];
        let mut b = vec![0_u8; STRIPE_ALIGNMENT];
        let mut frags: Vec<&mut [u8]> = vec![a.as_mut_slice(), b.as_mut_slice()];
        let res = encode(&gf, 1, 1, &bm, &mut frags, STRIPE_ALIGNMENT - 8);
        assert!(matches!(res, Err(Error::Validation(_))));
        let res = encode(&gf, 1, 1, &bm, &mut frags, 0);
        assert!(matches!(res, Err(Error::Validation(_))));
        let res = encode(&gf, 1, 1, &bm, &mut frags, 2 * STRIPE_ALIGNMENT);
        assert!(matches!(res, Err(Error::Validation(_))));
    }

    #[test]
    fn identity_parity_copies_data() {
        // 1/(0 ^ 1) = 1, so a 1+1 stripe mirrors its data fragment.
        let gf = GaloisField::new();
        let bm = expand(&gf, 1, 1, &[1]).unwrap();
        let mut data: Vec<u8> = (0..STRIPE_ALIGNMENT).map(|i| (i % 251) as u8).collect();
        let mut parity = vec![0_u8; STRIPE_ALIGNMENT];
        let expect = data.clone();
        {
            let mut frags: Vec<&mut [u8]> = vec![data.as_mut_slice(), parity.as_mut_slice()];
            encode(&gf, 1, 1, &bm, &mut frags, STRIPE_ALIGNMENT).unwrap();
        }
        assert_eq!(parity, expect);

        let mut lost = vec![0_u8; STRIPE_ALIGNMENT];
        let mut frags: Vec<&mut [u8]> = vec![lost.as_mut_slice(), parity.as_mut_slice()];
        let row = bm.block_row(0).unwrap();
        dot_product(&gf, 1, row, Some(&[1]), 0, &mut frags, STRIPE_ALIGNMENT).unwrap();
        assert_eq!(lost, expect);
    }

    #[test]
    fn dot_product_rejects_destination_in_sources() {
        let gf = GaloisField::new();
        let bm = expand(&gf, 1, 1, &[1]).unwrap();
        let mut a = vec![0_u8; STRIPE_ALIGNMENT];
        let mut b = vec![0_u8; STRIPE_ALIGNMENT];
        let mut frags: Vec<&mut [u8]> = vec![a.as_mut_slice(), b.as_mut_slice()];
        let row = bm.block_row(0).unwrap();
        let res = dot_product(&gf, 1, row, Some(&[0]), 0, &mut frags, STRIPE_ALIGNMENT);
        assert!(matches!(res, Err(Error::Validation(_))));
        let res = dot_product(&gf, 1, row, None, 0, &mut frags, STRIPE_ALIGNMENT);
        assert!(matches!(res, Err(Error::Validation(_))));
    }

    #[test]
    fn make_decoding_needs_dn_alive() {
        let gf = GaloisField::new();
        let bm = expand(&gf, 2, 1, &[244, 71]).unwrap();
        let map = [FragmentState::Dead, FragmentState::Dead, FragmentState::Alive];
        assert_eq!(
            make_decoding(&gf, 2, 1, &bm, &map),
            Err(Error::NotEnoughFragments {
                alive: 1,
                needed: 2
            })
        );
        let map = [FragmentState::Alive, FragmentState::Dead, FragmentState::Alive];
        let (dm, ids) = make_decoding(&gf, 2, 1, &bm, &map).unwrap();
        assert_eq!(ids, vec![0, 2]);
        assert_eq!((dm.rows(), dm.cols()), (16, 16));
    }

    #[test]
    fn make_decoding_rejects_singular_matrix() {
        let gf = GaloisField::new();
        // a zero parity row can't stand in for a lost data fragment
        let bm = BitMatrix::zeroed(WORD_SIZE, 2 * WORD_SIZE);
        let map = [FragmentState::Dead, FragmentState::Alive, FragmentState::Alive];
        assert_eq!(make_decoding(&gf, 2, 1, &bm, &map), Err(Error::SingularMatrix));
    }
}
