//! Bump-pointer, page-based allocation for a single semispace.
//!
//! A `Space` is a list of pages; allocation always happens in the last page.
//! When an allocation does not fit, the caller decides whether to collect or
//! simply grow (the object-pairing convention in `Heap::new_object` grows
//! without collecting).

use memmap2::{MmapMut, MmapOptions};

struct Page {
    map: MmapMut,
    top: usize,
}

impl Page {
    fn new(size: usize) -> Page {
        let map = MmapOptions::new().len(size).map_anon().expect("failed to map a heap page");
        Page { map, top: 0 }
    }

    fn remaining(&self) -> usize {
        self.map.len() - self.top
    }

    fn bump(&mut self, bytes: usize) -> *mut u8 {
        debug_assert!(bytes <= self.remaining());
        let ptr = unsafe { self.map.as_mut_ptr().add(self.top) };
        self.top += bytes;
        ptr
    }
}

/// One semispace: a growable sequence of bump-allocated pages.
pub struct Space {
    pages: Vec<Page>,
    page_size: usize,
}

impl Space {
    pub fn new(page_size: usize) -> Space {
        Space { pages: vec![Page::new(page_size)], page_size }
    }

    /// Total bytes currently used across all pages. Exposed for diagnostics.
    pub fn bytes_used(&self) -> usize {
        self.pages.iter().map(|p| p.top).sum()
    }

    /// Attempts a bump allocation in the last page. Returns `None` if it
    /// doesn't fit; the caller must then either collect or `add_page`.
    pub fn allocate(&mut self, bytes: usize) -> Option<*mut u8> {
        let page = self.pages.last_mut()?;
        if bytes <= page.remaining() {
            Some(page.bump(bytes))
        } else {
            None
        }
    }

    /// Appends a fresh page sized to fit at least `bytes` (an object larger
    /// than the configured page size gets its own oversized page).
    pub fn add_page(&mut self, bytes: usize) {
        let size = bytes.max(self.page_size);
        self.pages.push(Page::new(size));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_allocation_advances_and_exhausts() {
        let mut space = Space::new(64);
        let a = space.allocate(16).unwrap();
        let b = space.allocate(16).unwrap();
        assert_ne!(a, b);
        assert!(space.allocate(1024).is_none());
    }

    #[test]
    fn add_page_allows_oversized_objects() {
        let mut space = Space::new(64);
        assert!(space.allocate(1024).is_none());
        space.add_page(1024);
        assert!(space.allocate(1024).is_some());
    }
}
