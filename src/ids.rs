//! Process-wide monotonic unique-id / ref allocators.
//!
//! Mirrors `otterTaskContext_get_unique_id` (`__sync_fetch_and_add` on a
//! static counter) and the original's `trace-unique-refs.c` allocators for
//! location/region/string refs -- one atomic counter per namespace, never
//! reset between archives (spec.md §9 "Global counters").

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use lazy_static::lazy_static;

macro_rules! unique_u64_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u64);

        impl $name {
            pub const UNDEFINED: $name = $name(u64::MAX);

            #[inline]
            pub fn raw(&self) -> u64 {
                self.0
            }

            #[inline]
            pub fn is_undefined(&self) -> bool {
                *self == Self::UNDEFINED
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

macro_rules! unique_u32_ref {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u32);

        impl $name {
            pub const UNDEFINED: $name = $name(u32::MAX);

            #[inline]
            pub fn raw(&self) -> u32 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

unique_u64_id!(TaskId);
unique_u32_ref!(LocationRef);
unique_u32_ref!(RegionRef);
unique_u32_ref!(StringRef);

/// One process-wide atomic counter per id/ref namespace. Never reset between
/// archives: re-initialising a `TraceState` must not produce ids that collide
/// with a previous archive's.
#[derive(Debug, Default)]
pub struct UniqueIdAllocators {
    next_task_id: AtomicU64,
    next_location_ref: AtomicU32,
    next_region_ref: AtomicU32,
    next_string_ref: AtomicU32,
}

impl UniqueIdAllocators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_task_id(&self) -> TaskId {
        TaskId(self.next_task_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn next_location_ref(&self) -> LocationRef {
        LocationRef(self.next_location_ref.fetch_add(1, Ordering::Relaxed))
    }

    pub fn next_region_ref(&self) -> RegionRef {
        RegionRef(self.next_region_ref.fetch_add(1, Ordering::Relaxed))
    }

    pub fn next_string_ref(&self) -> StringRef {
        StringRef(self.next_string_ref.fetch_add(1, Ordering::Relaxed))
    }
}

lazy_static! {
    /// The process-wide allocators, shared by every `TraceState` created in
    /// this process. Mirrors the original's file-scope `static unique_id_t`
    /// counters (`trace-task-context.c`'s `unique_id`, `otter-task-context.c`'s
    /// `ID`): these persist across `otterTraceInitialise`/`otterTraceFinalise`
    /// cycles, so re-initialising a trace must not reset them -- spec.md §9
    /// "Global counters" and testable property #5.
    pub static ref GLOBAL_IDS: UniqueIdAllocators = UniqueIdAllocators::new();
}
