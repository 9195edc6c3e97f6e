use std::alloc::{Layout, alloc, dealloc, handle_alloc_error};
use std::any::type_name;
use std::mem;
use std::ptr::NonNull;

use crate::CountedCell;

/// One block of cell slots, the unit in which a [`CellPool`][crate::CellPool] obtains memory
/// from the global allocator.
///
/// Slots are addressed by index and tracked through an intrusive free list: every vacant slot
/// stores the index of the next vacant slot, with `next_free_index` at the head of the stack.
/// Removing an item pushes its slot onto the stack, so the most recently retired slot is the
/// first one to be reused.
///
/// # Out of band access
///
/// The slab never creates a reference that spans more than one slot. Occupied cells may be
/// read through the pointers returned by [`insert()`][Self::insert] while the owner of the slab
/// inserts into or removes from other slots, as long as the cell being read is not removed.
#[derive(Debug)]
pub(crate) struct CellSlab<T, const CAPACITY: usize> {
    first_entry_ptr: NonNull<Entry<T>>,

    /// Head of the free stack. Points out of bounds (at `CAPACITY`) when the slab is full.
    next_free_index: usize,

    /// Number of occupied slots.
    count: usize,
}

#[derive(Debug)]
enum Entry<T> {
    Occupied { cell: CountedCell<T> },

    Vacant { next_free_index: usize },
}

impl<T, const CAPACITY: usize> CellSlab<T, CAPACITY> {
    /// # Panics
    ///
    /// Panics if `CAPACITY` is zero.
    #[must_use]
    pub(crate) fn new() -> Self {
        assert!(CAPACITY > 0, "CellSlab must have non-zero capacity");
        assert!(
            CAPACITY < usize::MAX,
            "CellSlab capacity must be less than usize::MAX"
        );

        let layout = Self::layout();

        // SAFETY: The layout is valid for the entry array and is never zero-sized because every
        // entry carries at least an atomic counter or a free index.
        let ptr = NonNull::new(unsafe { alloc(layout) }.cast::<Entry<T>>())
            .unwrap_or_else(|| handle_alloc_error(layout));

        for index in 0..CAPACITY {
            // SAFETY: `layout()` makes room for exactly CAPACITY entries.
            let entry = unsafe { ptr.add(index) };

            // SAFETY: The pointer is valid for writes, aligned and of the right type.
            unsafe {
                entry.as_ptr().write(Entry::Vacant {
                    // The last slot points out of bounds, meaning "full" once it is taken.
                    next_free_index: index
                        .checked_add(1)
                        .expect("guarded by capacity < usize::MAX above"),
                });
            }
        }

        Self {
            first_entry_ptr: ptr,
            next_free_index: 0,
            count: 0,
        }
    }

    #[must_use]
    fn layout() -> Layout {
        Layout::array::<Entry<T>>(CAPACITY).expect("simple flat array layout must be calculable")
    }

    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Can be mutated to infinitely growing memory use.
    pub(crate) fn len(&self) -> usize {
        self.count
    }

    #[must_use]
    pub(crate) fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[must_use]
    pub(crate) fn is_full(&self) -> bool {
        self.next_free_index >= CAPACITY
    }

    fn entry_ptr(&self, index: usize) -> NonNull<Entry<T>> {
        assert!(
            index < CAPACITY,
            "entry {index} index out of bounds in slab of {}",
            type_name::<T>()
        );

        // SAFETY: Guarded by the bounds check above.
        unsafe { self.first_entry_ptr.add(index) }
    }

    fn entry(&self, index: usize) -> &Entry<T> {
        // SAFETY: Every entry is initialized in the ctor and stays initialized until drop.
        unsafe { self.entry_ptr(index).as_ref() }
    }

    #[expect(clippy::needless_pass_by_ref_mut, reason = "false positive")]
    fn entry_mut(&mut self, index: usize) -> &mut Entry<T> {
        // SAFETY: Every entry is initialized in the ctor and stays initialized until drop. We
        // hold `&mut self`, and readers of occupied cells never touch the entry itself.
        unsafe { self.entry_ptr(index).as_mut() }
    }

    /// Places a new cell with a use count of 1 in a vacant slot.
    ///
    /// Returns the slot index and a pointer to the cell. The pointer remains valid until the
    /// slot is passed to [`remove()`][Self::remove] or the slab is dropped.
    ///
    /// # Panics
    ///
    /// Panics if the slab is full.
    #[must_use]
    pub(crate) fn insert(&mut self, value: T) -> (usize, NonNull<CountedCell<T>>) {
        #[cfg(debug_assertions)]
        self.integrity_check();

        assert!(
            !self.is_full(),
            "cannot insert into a full slab of {}",
            type_name::<T>()
        );

        let index = self.next_free_index;

        let entry = self.entry_mut(index);

        let previous = mem::replace(
            entry,
            Entry::Occupied {
                cell: CountedCell::new(value),
            },
        );

        let Entry::Occupied { cell } = entry else {
            unreachable!("we just wrote an occupied entry");
        };

        let cell_ptr = NonNull::from(cell);

        self.next_free_index = match previous {
            Entry::Vacant { next_free_index } => next_free_index,
            Entry::Occupied { .. } => panic!(
                "entry {index} was not vacant when we inserted into it in slab of {}",
                type_name::<T>()
            ),
        };

        self.count = self
            .count
            .checked_add(1)
            .expect("guarded by capacity < usize::MAX in slab ctor");

        (index, cell_ptr)
    }

    /// Pointer to the cell in an occupied slot.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of bounds or the slot is vacant.
    #[must_use]
    pub(crate) fn cell_ptr(&self, index: usize) -> NonNull<CountedCell<T>> {
        match self.entry(index) {
            Entry::Occupied { cell } => NonNull::from(cell),
            Entry::Vacant { .. } => panic!(
                "cell_ptr({index}) entry was vacant in slab of {}",
                type_name::<T>()
            ),
        }
    }

    /// Vacates a slot and hands back its payload. The caller decides where the payload is
    /// dropped, which lets the pool drop it after releasing its lock.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of bounds or the slot is already vacant.
    #[must_use]
    pub(crate) fn remove(&mut self, index: usize) -> T {
        let next_free_index = self.next_free_index;

        let entry = self.entry_mut(index);

        assert!(
            matches!(entry, Entry::Occupied { .. }),
            "remove({index}) entry was vacant in slab of {}",
            type_name::<T>()
        );

        let Entry::Occupied { cell } = mem::replace(entry, Entry::Vacant { next_free_index })
        else {
            unreachable!("we asserted above that the entry is occupied");
        };

        self.next_free_index = index;

        self.count = self
            .count
            .checked_sub(1)
            .expect("we asserted above that the entry is occupied so count must be non-zero");

        cell.into_value()
    }

    /// Walks the free stack and verifies that it covers exactly the vacant slots.
    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    pub(crate) fn integrity_check(&self) {
        let mut vacant_on_stack: usize = 0;
        let mut cursor = self.next_free_index;

        while cursor < CAPACITY {
            match self.entry(cursor) {
                Entry::Vacant { next_free_index } => {
                    cursor = *next_free_index;
                }
                Entry::Occupied { .. } => panic!(
                    "free stack of slab of {} leads to occupied slot {cursor}",
                    type_name::<T>()
                ),
            }

            vacant_on_stack = vacant_on_stack
                .checked_add(1)
                .expect("guarded by capacity < usize::MAX in slab ctor");

            assert!(
                vacant_on_stack <= CAPACITY,
                "free stack of slab of {} contains a loop",
                type_name::<T>()
            );
        }

        let occupied = (0..CAPACITY)
            .filter(|index| matches!(self.entry(*index), Entry::Occupied { .. }))
            .count();

        assert_eq!(
            occupied,
            self.count,
            "count does not match the occupied slots in slab of {}",
            type_name::<T>()
        );

        assert_eq!(
            vacant_on_stack.checked_add(occupied),
            Some(CAPACITY),
            "free stack does not cover every vacant slot in slab of {}",
            type_name::<T>()
        );
    }
}

impl<T, const CAPACITY: usize> Drop for CellSlab<T, CAPACITY> {
    fn drop(&mut self) {
        // Every pooled handle keeps its pool alive, so normally nothing is left here. Leaked
        // handles leak the pool with them. We still drop whatever remains to keep Miri happy.
        for index in 0..CAPACITY {
            let entry = self.entry_mut(index);

            *entry = Entry::Vacant {
                // Intentionally anomalous - we are dropping so do not expect any more usage.
                next_free_index: usize::MAX,
            };
        }

        // SAFETY: The layout matches the one used in the ctor. All entries have been
        // overwritten with vacant markers that own nothing.
        unsafe {
            dealloc(self.first_entry_ptr.as_ptr().cast(), Self::layout());
        }
    }
}

// SAFETY: The raw pointer is an owning pointer to the slot array. Moving the slab to another
// thread moves the payloads with it, which is fine as long as they are `Send`.
unsafe impl<T: Send, const CAPACITY: usize> Send for CellSlab<T, CAPACITY> {}
