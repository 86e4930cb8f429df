use iter_tools::Itertools;

use crate::Error;

/// Borrowed fragment buffers, one slot per stripe column.
///
/// The binder never owns a buffer: each slot holds a `&'a mut [u8]` lent by the
/// caller, and the slot's length is the length of that slice. Sizes are only
/// checked when a view is requested for an encode or decode.
#[derive(Debug, Default)]
pub struct FragmentBinder<'a> {
    slots: Vec<Option<&'a mut [u8]>>,
}

impl<'a> FragmentBinder<'a> {
    /// An empty binder with `total` unbound slots.
    pub fn new(total: usize) -> Self {
        Self {
            slots: std::iter::repeat_with(|| None).take(total).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Bind `buf` at `index`, replacing any previous binding.
    pub fn bind(&mut self, index: usize, buf: &'a mut [u8]) -> Result<(), Error> {
        let total = self.slots.len();
        let slot = self.slots.get_mut(index).ok_or_else(|| {
            Error::validation(format!("fragment index {index} outside 0..{total}"))
        })?;
        *slot = Some(buf);
        Ok(())
    }

    /// Bind `bufs` to indices `0..min(bufs.len(), total)`.
    ///
    /// Returns the number of buffers bound; the rest are left untouched.
    pub fn bind_all<I>(&mut self, bufs: I) -> usize
    where
        I: IntoIterator<Item = &'a mut [u8]>,
    {
        let mut bound = 0;
        for (slot, buf) in self.slots.iter_mut().zip(bufs) {
            *slot = Some(buf);
            bound += 1;
        }
        bound
    }

    /// Take the buffer at `index` back out of the binder.
    pub fn unbind(&mut self, index: usize) -> Option<&'a mut [u8]> {
        self.slots.get_mut(index).and_then(Option::take)
    }

    /// Unbind every slot.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
    }

    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.slots.get(index)?.as_deref()
    }

    pub fn bound_len(&self, index: usize) -> Option<usize> {
        self.get(index).map(<[u8]>::len)
    }

    /// The first `size` bytes of every slot.
    ///
    /// Fails on the first slot that is unbound or shorter than `size`.
    pub fn checked_views(&mut self, size: usize) -> Result<Vec<&mut [u8]>, Error> {
        self.slots
            .iter_mut()
            .enumerate()
            .map(|(i, slot)| match slot.as_deref_mut() {
                None => Err(Error::validation(format!("fragment {i} is not bound"))),
                Some(buf) if buf.len() < size => Err(Error::validation(format!(
                    "fragment {i} holds {} bytes, {size} required",
                    buf.len()
                ))),
                Some(buf) => Ok(&mut buf[..size]),
            })
            .try_collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_and_unbind() {
        let mut a = vec![1_u8; 16];
        let mut b = vec![2_u8; 8];
        let mut binder = FragmentBinder::new(3);
        binder.bind(0, &mut a).unwrap();
        binder.bind(2, &mut b).unwrap();
        assert_eq!(binder.bound_len(0), Some(16));
        assert_eq!(binder.get(1), None);
        assert_eq!(binder.get(2), Some(&[2_u8; 8][..]));

        let res = binder.views_error(8);
        assert_eq!(res, Some("fragment 1 is not bound".to_string()));

        let b = binder.unbind(2).unwrap();
        b[0] = 9;
        assert_eq!(binder.unbind(2), None);
        assert_eq!(binder.unbind(7), None);
    }

    #[test]
    fn bind_out_of_range() {
        let mut a = vec![0_u8; 4];
        let mut binder = FragmentBinder::new(2);
        assert!(matches!(binder.bind(2, &mut a), Err(Error::Validation(_))));
    }

    #[test]
    fn bind_all_clamps_to_slots() {
        let mut bufs = vec![vec![0_u8; 32]; 5];
        let mut binder = FragmentBinder::new(3);
        let n = binder.bind_all(bufs.iter_mut().map(Vec::as_mut_slice));
        assert_eq!(n, 3);
        assert!((0..3).all(|i| binder.bound_len(i) == Some(32)));
        binder.clear();
        assert!((0..3).all(|i| binder.get(i).is_none()));
        assert_eq!(binder.len(), 3);
    }

    #[test]
    fn views_are_truncated_and_length_checked() {
        let mut a = vec![0_u8; 32];
        let mut b = vec![0_u8; 16];
        let mut binder = FragmentBinder::new(2);
        binder.bind(0, &mut a).unwrap();
        binder.bind(1, &mut b).unwrap();
        assert!(binder.checked_views(16).unwrap().iter().all(|v| v.len() == 16));
        assert_eq!(
            binder.views_error(24),
            Some("fragment 1 holds 16 bytes, 24 required".to_string())
        );
    }

    impl FragmentBinder<'_> {
        fn views_error(&mut self, size: usize) -> Option<String> {
            match self.checked_views(size) {
                Err(Error::Validation(msg)) => Some(msg),
                _ => None,
            }
        }
    }
}
