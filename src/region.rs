//! The region/task data model: spec.md §3's `RegionDef` and its six variant
//! payloads.
//!
//! Grounded on `include/public/otter-trace/trace-region-def.h` (the variant
//! tag set and per-variant fields) and `trace-core.c` (the parallel region's
//! mutex + manual ref-count discipline). Per spec.md §9's sanctioned
//! alternative, the mutex + raw pointer pairing of the original becomes
//! `Arc<Mutex<ParallelInner>>` here: `Arc` gives the "owned by every worker
//! until the last one leaves" lifetime, `Mutex` gives the locking the
//! original does by hand around `ref_count`/`enter_count`/the attribute
//! list/the inherited-defs queue.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::attributes::AttributeList;
use crate::ids::{RegionRef, TaskId};
use crate::timestamp::Timestamp;

/// Owned snapshot of a region's variant-specific fields, read out before the
/// event engine builds attributes for it. Parallel's fields live directly on
/// `ParallelRegion` (not behind its inner mutex), so reading them needs no
/// lock.
pub enum RegionAttrData {
    Parallel {
        id: u64,
        master_id: TaskId,
        flags: i32,
        requested_parallelism: u32,
    },
    Workshare {
        wstype: WorkshareType,
        count: u64,
    },
    Sync {
        sync_type: SyncType,
        task_sync_mode: TaskSyncMode,
    },
    Master,
    Task {
        id: TaskId,
        parent_id: TaskId,
        flags: TaskFlags,
        has_dependences: bool,
        flavour: i32,
        create_return_address: u64,
        source_location: SourceLocation,
    },
    Phase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkshareType {
    Loop,
    Sections,
    Single,
    Taskloop,
    Distribute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncType {
    Barrier,
    Taskwait,
    Taskgroup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSyncMode {
    Children,
    Descendants,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseType {
    Application,
    Tool,
}

/// Why a task was last suspended/completed; recorded on task-schedule and
/// carried into the next task-switch event as `prior_task_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Undefined,
    Complete,
    Yield,
    Cancel,
    Detach,
    EarlyFulfill,
    LateFulfill,
    Switch,
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Undefined
    }
}

/// Implementation-defined task flags, kept opaque the way the original's
/// `otter_task_flag_t` bitmask is: the engine never branches on individual
/// bits, only forwards the whole value as an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskFlags(pub i32);

impl TaskFlags {
    pub const NONE: TaskFlags = TaskFlags(0);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: &'static str,
    pub func: &'static str,
    pub line: u32,
}

// -- Parallel ----------------------------------------------------------

pub struct ParallelRegion {
    pub ref_id: RegionRef,
    pub id: u64,
    pub master_id: TaskId,
    pub encountering_task_id: TaskId,
    pub flags: i32,
    pub requested_parallelism: u32,
    inner: Mutex<ParallelInner>,
}

pub(crate) struct ParallelInner {
    pub attributes: AttributeList,
    pub ref_count: u32,
    pub enter_count: u64,
    /// Non-shared region definitions hoisted out of this parallel scope by
    /// any worker, to be written once at this region's destruction.
    pub inherited_defs: VecDeque<RegionDef>,
}

impl ParallelRegion {
    pub fn new(
        ref_id: RegionRef,
        id: u64,
        master_id: TaskId,
        encountering_task_id: TaskId,
        flags: i32,
        requested_parallelism: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            ref_id,
            id,
            master_id,
            encountering_task_id,
            flags,
            requested_parallelism,
            inner: Mutex::new(ParallelInner {
                attributes: AttributeList::new(),
                ref_count: 0,
                enter_count: 0,
                inherited_defs: VecDeque::new(),
            }),
        })
    }

    /// Locks the region for the duration of the returned guard. Enter/leave
    /// hold this lock across the entire attribute-assembly + write sequence,
    /// per spec.md §4.1.
    pub(crate) fn lock(&self) -> MutexGuard<'_, ParallelInner> {
        self.inner.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

// -- Workshare / Sync / Master / Task / Phase ---------------------------

pub struct WorkshareAttr {
    pub wstype: WorkshareType,
    pub count: u64,
}

pub struct SyncAttr {
    pub sync_type: SyncType,
    pub task_sync_mode: TaskSyncMode,
}

pub struct MasterAttr;

pub struct TaskAttr {
    pub id: TaskId,
    pub parent_id: TaskId,
    pub flags: TaskFlags,
    pub has_dependences: bool,
    pub status: TaskStatus,
    pub source_location: SourceLocation,
    pub create_return_address: u64,
    pub flavour: i32,
    /// The task's own active-region stack, populated while the task is
    /// suspended (between a task-switch away from it and the task-switch
    /// back). Must be empty except during that window -- spec.md §4.1.
    pub saved_rgn_stack: Vec<RegionDef>,
}

pub struct PhaseAttr {
    pub phase_type: PhaseType,
    pub phase_name: String,
}

/// A single non-shared region's common fields plus its variant payload.
/// Owned exclusively by the one `Location` that created it, so no locking is
/// needed -- spec.md §3's invariant ("owned exclusively by a single location
/// unless shared").
pub struct OwnedRegion<T> {
    pub ref_id: RegionRef,
    pub encountering_task_id: TaskId,
    pub attributes: AttributeList,
    pub payload: T,
    pub created_at: Timestamp,
}

/// The tagged sum spec.md §3 calls for, used instead of an inheritance
/// hierarchy per spec.md §9's design note.
pub enum RegionDef {
    Parallel(Arc<ParallelRegion>),
    Workshare(OwnedRegion<WorkshareAttr>),
    Sync(OwnedRegion<SyncAttr>),
    Master(OwnedRegion<MasterAttr>),
    Task(OwnedRegion<TaskAttr>),
    Phase(OwnedRegion<PhaseAttr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Parallel,
    Workshare,
    Sync,
    Master,
    Task,
    Phase,
}

impl RegionDef {
    pub fn new_workshare(
        ref_id: RegionRef,
        encountering_task_id: TaskId,
        wstype: WorkshareType,
        count: u64,
    ) -> Self {
        RegionDef::Workshare(OwnedRegion {
            ref_id,
            encountering_task_id,
            attributes: AttributeList::new(),
            payload: WorkshareAttr { wstype, count },
            created_at: Timestamp::now(),
        })
    }

    pub fn new_sync(
        ref_id: RegionRef,
        encountering_task_id: TaskId,
        sync_type: SyncType,
        task_sync_mode: TaskSyncMode,
    ) -> Self {
        RegionDef::Sync(OwnedRegion {
            ref_id,
            encountering_task_id,
            attributes: AttributeList::new(),
            payload: SyncAttr {
                sync_type,
                task_sync_mode,
            },
            created_at: Timestamp::now(),
        })
    }

    pub fn new_master(ref_id: RegionRef, encountering_task_id: TaskId) -> Self {
        RegionDef::Master(OwnedRegion {
            ref_id,
            encountering_task_id,
            attributes: AttributeList::new(),
            payload: MasterAttr,
            created_at: Timestamp::now(),
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new_task(
        ref_id: RegionRef,
        encountering_task_id: TaskId,
        id: TaskId,
        parent_id: TaskId,
        flags: TaskFlags,
        has_dependences: bool,
        source_location: SourceLocation,
        create_return_address: u64,
        flavour: i32,
    ) -> Self {
        RegionDef::Task(OwnedRegion {
            ref_id,
            encountering_task_id,
            attributes: AttributeList::new(),
            payload: TaskAttr {
                id,
                parent_id,
                flags,
                has_dependences,
                status: TaskStatus::Undefined,
                source_location,
                create_return_address,
                flavour,
                saved_rgn_stack: Vec::new(),
            },
            created_at: Timestamp::now(),
        })
    }

    pub fn new_phase(
        ref_id: RegionRef,
        encountering_task_id: TaskId,
        phase_type: PhaseType,
        phase_name: String,
    ) -> Self {
        RegionDef::Phase(OwnedRegion {
            ref_id,
            encountering_task_id,
            attributes: AttributeList::new(),
            payload: PhaseAttr {
                phase_type,
                phase_name,
            },
            created_at: Timestamp::now(),
        })
    }

    pub fn kind(&self) -> RegionKind {
        match self {
            RegionDef::Parallel(_) => RegionKind::Parallel,
            RegionDef::Workshare(_) => RegionKind::Workshare,
            RegionDef::Sync(_) => RegionKind::Sync,
            RegionDef::Master(_) => RegionKind::Master,
            RegionDef::Task(_) => RegionKind::Task,
            RegionDef::Phase(_) => RegionKind::Phase,
        }
    }

    pub fn ref_id(&self) -> RegionRef {
        match self {
            RegionDef::Parallel(p) => p.ref_id,
            RegionDef::Workshare(r) => r.ref_id,
            RegionDef::Sync(r) => r.ref_id,
            RegionDef::Master(r) => r.ref_id,
            RegionDef::Task(r) => r.ref_id,
            RegionDef::Phase(r) => r.ref_id,
        }
    }

    pub fn encountering_task_id(&self) -> TaskId {
        match self {
            RegionDef::Parallel(p) => p.encountering_task_id,
            RegionDef::Workshare(r) => r.encountering_task_id,
            RegionDef::Sync(r) => r.encountering_task_id,
            RegionDef::Master(r) => r.encountering_task_id,
            RegionDef::Task(r) => r.encountering_task_id,
            RegionDef::Phase(r) => r.encountering_task_id,
        }
    }

    /// True only for `Parallel`, per spec.md §4.2 `is_shared`.
    pub fn is_shared(&self) -> bool {
        matches!(self, RegionDef::Parallel(_))
    }

    pub fn as_task_mut(&mut self) -> &mut OwnedRegion<TaskAttr> {
        match self {
            RegionDef::Task(t) => t,
            other => panic!("expected a Task region, found {:?}", other.kind()),
        }
    }

    pub fn as_task(&self) -> &OwnedRegion<TaskAttr> {
        match self {
            RegionDef::Task(t) => t,
            other => panic!("expected a Task region, found {:?}", other.kind()),
        }
    }

    /// Mutable access to this region's own attribute-list buffer. Parallel
    /// regions share theirs behind `ParallelInner`'s mutex instead -- callers
    /// must go through `ParallelRegion::lock` for those and never call this.
    pub fn attributes(&self) -> &AttributeList {
        match self {
            RegionDef::Parallel(_) => {
                panic!("parallel region attributes are behind ParallelInner's lock")
            }
            RegionDef::Workshare(r) => &r.attributes,
            RegionDef::Sync(r) => &r.attributes,
            RegionDef::Master(r) => &r.attributes,
            RegionDef::Task(r) => &r.attributes,
            RegionDef::Phase(r) => &r.attributes,
        }
    }

    pub fn attributes_mut(&mut self) -> &mut AttributeList {
        match self {
            RegionDef::Parallel(_) => {
                panic!("parallel region attributes are behind ParallelInner's lock")
            }
            RegionDef::Workshare(r) => &mut r.attributes,
            RegionDef::Sync(r) => &mut r.attributes,
            RegionDef::Master(r) => &mut r.attributes,
            RegionDef::Task(r) => &mut r.attributes,
            RegionDef::Phase(r) => &mut r.attributes,
        }
    }

    /// A read-only snapshot of this region's variant-specific fields, used to
    /// build the event engine's per-variant attribute contribution.
    pub fn attr_data(&self) -> RegionAttrData {
        match self {
            RegionDef::Parallel(p) => RegionAttrData::Parallel {
                id: p.id,
                master_id: p.master_id,
                flags: p.flags,
                requested_parallelism: p.requested_parallelism,
            },
            RegionDef::Workshare(r) => RegionAttrData::Workshare {
                wstype: r.payload.wstype,
                count: r.payload.count,
            },
            RegionDef::Sync(r) => RegionAttrData::Sync {
                sync_type: r.payload.sync_type,
                task_sync_mode: r.payload.task_sync_mode,
            },
            RegionDef::Master(_) => RegionAttrData::Master,
            RegionDef::Task(r) => RegionAttrData::Task {
                id: r.payload.id,
                parent_id: r.payload.parent_id,
                flags: r.payload.flags,
                has_dependences: r.payload.has_dependences,
                flavour: r.payload.flavour,
                create_return_address: r.payload.create_return_address,
                source_location: r.payload.source_location.clone(),
            },
            RegionDef::Phase(_) => RegionAttrData::Phase,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rref(n: u32) -> RegionRef {
        // test-only constructor via the allocator, to avoid depending on a
        // private tuple field.
        let ids = crate::ids::UniqueIdAllocators::new();
        for _ in 0..n {
            ids.next_region_ref();
        }
        ids.next_region_ref()
    }

    #[test]
    fn workshare_region_is_not_shared() {
        let region = RegionDef::new_workshare(rref(0), TaskId::UNDEFINED, WorkshareType::Loop, 10);
        assert!(!region.is_shared());
        assert_eq!(region.kind(), RegionKind::Workshare);
    }

    #[test]
    fn parallel_region_is_shared_and_starts_at_zero_refcount() {
        let parallel = ParallelRegion::new(rref(0), 1, TaskId::UNDEFINED, TaskId::UNDEFINED, 0, 4);
        let region = RegionDef::Parallel(parallel.clone());
        assert!(region.is_shared());
        let guard = parallel.lock();
        assert_eq!(guard.ref_count, 0);
        assert_eq!(guard.enter_count, 0);
    }

    #[test]
    #[should_panic(expected = "expected a Task region")]
    fn as_task_panics_on_wrong_variant() {
        let mut region = RegionDef::new_master(rref(0), TaskId::UNDEFINED);
        let _ = region.as_task_mut();
    }
}
