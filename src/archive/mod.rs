//! The archive sink facade: spec.md §6's opaque binary archive encoder,
//! narrowed to the operation set the engine actually calls.
//!
//! Per spec.md §1, the real archive encoder is an external collaborator --
//! only its operation set matters to the core. This module defines that
//! operation set as a trait (`ArchiveSink`) and ships one concrete, working
//! implementation (`JsonArchive`, in `json_archive.rs`) so the engine can be
//! built, exercised and tested without depending on a real OTF2 library.

mod json_archive;

pub use json_archive::JsonArchive;

use crate::attributes::{AttrType, AttributeList};
use crate::config::Options;
use crate::ids::{LocationRef, RegionRef, StringRef, TaskId};
use crate::region::{PhaseType, SourceLocation, SyncType, TaskFlags, TaskSyncMode, WorkshareType};
use crate::timestamp::Timestamp;
use crate::error::TraceResult;

/// A location's type, mirroring `OTF2_LocationType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationType {
    CpuThread,
    Accelerator,
    Metric,
}

/// Opaque handle identifying the event-writer for one location. The facade
/// itself is stateless from the caller's perspective -- all writes are
/// addressed by location ref -- so this handle carries no data of its own
/// beyond which location it was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvtWriterHandle(pub LocationRef);

/// One record per region variant, exactly matching the fields
/// `trace_region_write_definition_impl` dispatches over in the original.
pub enum RegionDefRecord {
    Parallel {
        ref_id: RegionRef,
        id: u64,
        master_id: TaskId,
        flags: i32,
        requested_parallelism: u32,
    },
    Workshare {
        ref_id: RegionRef,
        wstype: WorkshareType,
        count: u64,
    },
    Sync {
        ref_id: RegionRef,
        sync_type: SyncType,
        task_sync_mode: TaskSyncMode,
    },
    Master {
        ref_id: RegionRef,
    },
    Task {
        ref_id: RegionRef,
        id: TaskId,
        parent_id: TaskId,
        flags: TaskFlags,
        has_dependences: bool,
        flavour: i32,
        source_location: SourceLocation,
    },
    Phase {
        ref_id: RegionRef,
        phase_type: PhaseType,
        phase_name: String,
    },
}

/// One record per discrete/bracketed event kind the engine emits.
pub enum EventRecord<'a> {
    ThreadBegin {
        timestamp: Timestamp,
        attributes: &'a AttributeList,
    },
    ThreadEnd {
        timestamp: Timestamp,
        attributes: &'a AttributeList,
    },
    Enter {
        timestamp: Timestamp,
        region_ref: RegionRef,
        attributes: &'a AttributeList,
    },
    Leave {
        timestamp: Timestamp,
        region_ref: RegionRef,
        attributes: &'a AttributeList,
    },
    TaskCreate {
        timestamp: Timestamp,
        attributes: &'a AttributeList,
    },
    TaskSwitch {
        timestamp: Timestamp,
        attributes: &'a AttributeList,
    },
    Sync {
        timestamp: Timestamp,
        attributes: &'a AttributeList,
    },
}

/// The operation set spec.md §6 lists for the archive sink. Implementations
/// must serialize concurrent calls internally where the original relies on
/// `global_def_writer_lock` (i.e. `write_region_def`/`write_location`) --
/// callers do not hold any lock of their own across these calls.
pub trait ArchiveSink: Send + Sync {
    fn open(opts: &Options) -> TraceResult<Self>
    where
        Self: Sized;

    fn event_writer(&self, location_ref: LocationRef) -> EvtWriterHandle {
        EvtWriterHandle(location_ref)
    }

    fn write_string(&self, r: StringRef, text: &str) -> TraceResult<()>;

    fn write_attribute(
        &self,
        name_ref: StringRef,
        description_ref: StringRef,
        ty: AttrType,
    ) -> TraceResult<()>;

    fn write_location(
        &self,
        ref_id: LocationRef,
        name_ref: StringRef,
        loc_type: LocationType,
        event_count: u64,
        group_ref: u32,
    ) -> TraceResult<()>;

    fn write_region_def(&self, def: RegionDefRecord) -> TraceResult<()>;

    fn write_event(&self, writer: EvtWriterHandle, event: EventRecord<'_>) -> TraceResult<()>;

    fn close(&self) -> TraceResult<()>;
}
