//! The event engine: region enter/leave, task create/schedule/switch,
//! synchronisation, and the shared-parallel-region destruction protocol.
//!
//! Grounded on `trace-core.c`'s `otterTraceEventEnter`/`otterTraceEventLeave`/
//! `otterTraceEventTaskCreate`/`otterTraceEventTaskSchedule`/
//! `otterTraceEventTaskSwitch`/`otterTraceSynchroniseTasks`: the sequencing of
//! lock acquisition, attribute assembly, event write and (for Parallel)
//! ref-count bookkeeping below follows that file's control flow directly.

use std::sync::Arc;

use crate::archive::{ArchiveSink, EventRecord, RegionDefRecord};
use crate::attributes::{AttrName, AttributeList, AttributeValue, Label, LabelTable};
use crate::error::TraceResult;
use crate::ids::TaskId;
use crate::location::{Location, ThreadType};
use crate::region::{
    ParallelRegion, RegionAttrData, RegionDef, RegionKind, SyncType, TaskStatus, TaskSyncMode,
    WorkshareType,
};
use crate::timestamp::Timestamp;

/// Everything the engine needs beyond the location/region values passed at
/// each call: the archive sink to write through and the interned label
/// table. Borrowed fresh for each call; the engine itself holds no state of
/// its own.
pub struct EngineContext<'a> {
    pub archive: &'a dyn ArchiveSink,
    pub labels: &'a LabelTable,
}

/// The CPU core the calling thread last ran on, mirroring `sched_getcpu()`
/// in `trace_add_thread_attributes` (`trace-location.c`). `-1` stands in for
/// "unknown" on platforms without the call, matching `sched_getcpu`'s own
/// error convention.
#[cfg(unix)]
fn current_cpu_id() -> i32 {
    unsafe { libc::sched_getcpu() }
}

#[cfg(not(unix))]
fn current_cpu_id() -> i32 {
    -1
}

fn region_type_label(kind: RegionKind) -> Label {
    match kind {
        RegionKind::Parallel => Label::RegionParallel,
        RegionKind::Workshare => Label::RegionWorkshare,
        RegionKind::Sync => Label::RegionSync,
        RegionKind::Master => Label::RegionMaster,
        RegionKind::Task => Label::RegionTask,
        RegionKind::Phase => Label::RegionPhase,
    }
}

fn enter_event_type_label(kind: RegionKind) -> Label {
    match kind {
        RegionKind::Parallel => Label::EventParallelBegin,
        RegionKind::Workshare => Label::EventWorkshareBegin,
        RegionKind::Sync => Label::EventSyncBegin,
        RegionKind::Master => Label::EventMasterBegin,
        RegionKind::Phase => Label::EventPhaseBegin,
        RegionKind::Task => Label::EventTaskEnter,
    }
}

fn leave_event_type_label(kind: RegionKind) -> Label {
    match kind {
        RegionKind::Parallel => Label::EventParallelEnd,
        RegionKind::Workshare => Label::EventWorkshareEnd,
        RegionKind::Sync => Label::EventSyncEnd,
        RegionKind::Master => Label::EventMasterEnd,
        RegionKind::Phase => Label::EventPhaseEnd,
        RegionKind::Task => Label::EventTaskLeave,
    }
}

fn thread_type_label(t: ThreadType) -> Label {
    match t {
        ThreadType::Initial => Label::ThreadInitial,
        ThreadType::Worker => Label::ThreadWorker,
    }
}

fn workshare_type_label(t: WorkshareType) -> Label {
    match t {
        WorkshareType::Loop => Label::WorkshareLoop,
        WorkshareType::Sections => Label::WorkshareSections,
        WorkshareType::Single => Label::WorkshareSingle,
        WorkshareType::Taskloop => Label::WorkshareTaskloop,
        WorkshareType::Distribute => Label::WorkshareDistribute,
    }
}

fn sync_type_label(t: SyncType) -> Label {
    match t {
        SyncType::Barrier => Label::SyncBarrier,
        SyncType::Taskwait => Label::SyncTaskwait,
        SyncType::Taskgroup => Label::SyncTaskgroup,
    }
}

fn task_status_label(s: TaskStatus) -> Label {
    match s {
        TaskStatus::Undefined => Label::TaskStatusUndefined,
        TaskStatus::Complete => Label::TaskStatusComplete,
        TaskStatus::Yield => Label::TaskStatusYield,
        TaskStatus::Cancel => Label::TaskStatusCancel,
        TaskStatus::Detach => Label::TaskStatusDetach,
        TaskStatus::EarlyFulfill => Label::TaskStatusEarlyFulfill,
        TaskStatus::LateFulfill => Label::TaskStatusLateFulfill,
        TaskStatus::Switch => Label::TaskStatusSwitch,
    }
}

/// Clears `attrs` and installs the fields common to every enter/leave event:
/// encountering task, region-type tag, endpoint.
fn push_common_attrs(
    attrs: &mut AttributeList,
    labels: &LabelTable,
    encountering_task_id: TaskId,
    kind: RegionKind,
    endpoint: Label,
) {
    attrs.clear();
    attrs.add(
        AttrName::EncounteringTaskId,
        AttributeValue::Uint64(encountering_task_id.raw()),
    );
    attrs.add(
        AttrName::RegionType,
        AttributeValue::StringRef(labels.get(region_type_label(kind))),
    );
    attrs.add(
        AttrName::Endpoint,
        AttributeValue::StringRef(labels.get(endpoint)),
    );
}

/// Appends the variant-specific attributes for `data` onto `attrs`.
fn contribute_attrs(attrs: &mut AttributeList, labels: &LabelTable, data: &RegionAttrData) {
    match data {
        RegionAttrData::Parallel {
            id,
            master_id,
            flags,
            requested_parallelism,
        } => {
            attrs.add(AttrName::ParallelId, AttributeValue::Uint64(*id));
            attrs.add(
                AttrName::ParallelMaster,
                AttributeValue::Uint64(master_id.raw()),
            );
            attrs.add(AttrName::ParallelFlags, AttributeValue::Int32(*flags));
            attrs.add(
                AttrName::ParallelRequestedParallelism,
                AttributeValue::Uint32(*requested_parallelism),
            );
        }
        RegionAttrData::Workshare { wstype, count } => {
            attrs.add(
                AttrName::WorkshareType,
                AttributeValue::StringRef(labels.get(workshare_type_label(*wstype))),
            );
            attrs.add(AttrName::WorkshareCount, AttributeValue::Uint64(*count));
        }
        RegionAttrData::Sync {
            sync_type,
            task_sync_mode,
        } => {
            attrs.add(
                AttrName::SyncType,
                AttributeValue::StringRef(labels.get(sync_type_label(*sync_type))),
            );
            attrs.add(
                AttrName::SyncDescendantTasks,
                AttributeValue::Boolean(*task_sync_mode == TaskSyncMode::Descendants),
            );
        }
        RegionAttrData::Master => {}
        RegionAttrData::Task {
            id,
            parent_id,
            flags,
            has_dependences,
            flavour,
            create_return_address,
            source_location: _,
        } => {
            attrs.add(AttrName::TaskId, AttributeValue::Uint64(id.raw()));
            attrs.add(
                AttrName::TaskParentId,
                AttributeValue::Uint64(parent_id.raw()),
            );
            attrs.add(AttrName::TaskFlags, AttributeValue::Int32(flags.0));
            attrs.add(
                AttrName::TaskHasDependences,
                AttributeValue::Boolean(*has_dependences),
            );
            attrs.add(AttrName::TaskFlavour, AttributeValue::Int32(*flavour));
            attrs.add(
                AttrName::TaskCreateRa,
                AttributeValue::Uint64(*create_return_address),
            );
        }
        // Phase events are not yet emitted by any instrumentation surface
        // verb (phase_begin/end/switch are no-ops); nothing to contribute.
        RegionAttrData::Phase => {}
    }
}

/// Converts a region definition into the archive's on-the-wire record, for
/// writing at location destruction or parallel-region destruction.
pub fn region_def_record(def: &RegionDef) -> RegionDefRecord {
    match def {
        RegionDef::Parallel(p) => RegionDefRecord::Parallel {
            ref_id: p.ref_id,
            id: p.id,
            master_id: p.master_id,
            flags: p.flags,
            requested_parallelism: p.requested_parallelism,
        },
        RegionDef::Workshare(r) => RegionDefRecord::Workshare {
            ref_id: r.ref_id,
            wstype: r.payload.wstype,
            count: r.payload.count,
        },
        RegionDef::Sync(r) => RegionDefRecord::Sync {
            ref_id: r.ref_id,
            sync_type: r.payload.sync_type,
            task_sync_mode: r.payload.task_sync_mode,
        },
        RegionDef::Master(r) => RegionDefRecord::Master { ref_id: r.ref_id },
        RegionDef::Task(r) => RegionDefRecord::Task {
            ref_id: r.ref_id,
            id: r.payload.id,
            parent_id: r.payload.parent_id,
            flags: r.payload.flags,
            has_dependences: r.payload.has_dependences,
            flavour: r.payload.flavour,
            source_location: r.payload.source_location.clone(),
        },
        RegionDef::Phase(r) => RegionDefRecord::Phase {
            ref_id: r.ref_id,
            phase_type: r.payload.phase_type,
            phase_name: r.payload.phase_name.clone(),
        },
    }
}

/// Drains a location's own pending region-definition queue (defs produced
/// outside any parallel scope) and writes each to the archive. Called at
/// thread end / location destruction.
pub fn flush_pending_region_defs(ctx: &EngineContext, loc: &mut Location) -> TraceResult<()> {
    for def in loc.drain_region_defs() {
        ctx.archive.write_region_def(region_def_record(&def))?;
    }
    Ok(())
}

fn destroy_parallel_region(ctx: &EngineContext, parallel: &Arc<ParallelRegion>) -> TraceResult<()> {
    let drained = {
        let mut guard = parallel.lock();
        std::mem::take(&mut guard.inherited_defs)
    };
    ctx.archive.write_region_def(RegionDefRecord::Parallel {
        ref_id: parallel.ref_id,
        id: parallel.id,
        master_id: parallel.master_id,
        flags: parallel.flags,
        requested_parallelism: parallel.requested_parallelism,
    })?;
    for def in drained {
        ctx.archive.write_region_def(region_def_record(&def))?;
    }
    Ok(())
}

pub fn thread_begin(ctx: &EngineContext, loc: &mut Location) -> TraceResult<()> {
    let mut attrs = AttributeList::new();
    attrs.add(
        AttrName::ThreadType,
        AttributeValue::StringRef(ctx.labels.get(thread_type_label(loc.thread_type))),
    );
    attrs.add(
        AttrName::EventType,
        AttributeValue::StringRef(ctx.labels.get(Label::EventThreadBegin)),
    );
    attrs.add(
        AttrName::Endpoint,
        AttributeValue::StringRef(ctx.labels.get(Label::EndpointDiscrete)),
    );
    attrs.add(AttrName::UniqueId, AttributeValue::Uint64(loc.id));
    attrs.add(AttrName::Cpu, AttributeValue::Int32(current_cpu_id()));
    let timestamp = Timestamp::now();
    ctx.archive.write_event(
        loc.evt_writer,
        EventRecord::ThreadBegin {
            timestamp,
            attributes: &attrs,
        },
    )?;
    loc.inc_event_count();
    Ok(())
}

pub fn thread_end(ctx: &EngineContext, loc: &mut Location) -> TraceResult<()> {
    let mut attrs = AttributeList::new();
    attrs.add(
        AttrName::ThreadType,
        AttributeValue::StringRef(ctx.labels.get(thread_type_label(loc.thread_type))),
    );
    attrs.add(
        AttrName::EventType,
        AttributeValue::StringRef(ctx.labels.get(Label::EventThreadEnd)),
    );
    attrs.add(
        AttrName::Endpoint,
        AttributeValue::StringRef(ctx.labels.get(Label::EndpointDiscrete)),
    );
    attrs.add(AttrName::UniqueId, AttributeValue::Uint64(loc.id));
    attrs.add(AttrName::Cpu, AttributeValue::Int32(current_cpu_id()));
    let timestamp = Timestamp::now();
    ctx.archive.write_event(
        loc.evt_writer,
        EventRecord::ThreadEnd {
            timestamp,
            attributes: &attrs,
        },
    )?;
    loc.inc_event_count();
    flush_pending_region_defs(ctx, loc)
}

/// Pushes `region` onto `loc`'s active-region stack and emits its enter
/// event. For a `Parallel` region this additionally hoists the location's
/// region-def queue and bumps the shared ref/enter counts under the
/// region's lock.
pub fn enter(ctx: &EngineContext, loc: &mut Location, region: RegionDef) -> TraceResult<()> {
    let kind = region.kind();
    let region_ref = region.ref_id();
    let encountering = region.encountering_task_id();

    match region {
        RegionDef::Parallel(parallel) => {
            loc.enter_region_def_scope();
            let mut guard = parallel.lock();
            push_common_attrs(&mut guard.attributes, ctx.labels, encountering, kind, Label::EndpointEnter);
            guard.attributes.add(
                AttrName::EventType,
                AttributeValue::StringRef(ctx.labels.get(enter_event_type_label(kind))),
            );
            let data = RegionAttrData::Parallel {
                id: parallel.id,
                master_id: parallel.master_id,
                flags: parallel.flags,
                requested_parallelism: parallel.requested_parallelism,
            };
            contribute_attrs(&mut guard.attributes, ctx.labels, &data);
            let timestamp = Timestamp::now();
            ctx.archive.write_event(
                loc.evt_writer,
                EventRecord::Enter {
                    timestamp,
                    region_ref,
                    attributes: &guard.attributes,
                },
            )?;
            guard.ref_count += 1;
            guard.enter_count += 1;
            drop(guard);
            loc.push_region(RegionDef::Parallel(parallel));
        }
        mut other => {
            let data = other.attr_data();
            let attrs = other.attributes_mut();
            push_common_attrs(attrs, ctx.labels, encountering, kind, Label::EndpointEnter);
            attrs.add(
                AttrName::EventType,
                AttributeValue::StringRef(ctx.labels.get(enter_event_type_label(kind))),
            );
            contribute_attrs(attrs, ctx.labels, &data);
            let timestamp = Timestamp::now();
            ctx.archive.write_event(
                loc.evt_writer,
                EventRecord::Enter {
                    timestamp,
                    region_ref,
                    attributes: other.attributes(),
                },
            )?;
            loc.push_region(other);
        }
    }
    loc.inc_event_count();
    Ok(())
}

/// Pops the active region from `loc`'s stack and emits its leave event.
/// For a `Parallel` region, decrements the shared ref count under lock and,
/// if this call observed it reach zero, destroys the region after
/// unlocking: writes its definition and drains its inherited-def queue.
/// Fatal if the region stack is empty.
pub fn leave(ctx: &EngineContext, loc: &mut Location) -> TraceResult<()> {
    let region = loc.pop_region();
    let kind = region.kind();
    let region_ref = region.ref_id();
    let encountering = region.encountering_task_id();

    match region {
        RegionDef::Parallel(parallel) => {
            let mut guard = parallel.lock();
            push_common_attrs(&mut guard.attributes, ctx.labels, encountering, kind, Label::EndpointLeave);
            guard.attributes.add(
                AttrName::EventType,
                AttributeValue::StringRef(ctx.labels.get(leave_event_type_label(kind))),
            );
            let data = RegionAttrData::Parallel {
                id: parallel.id,
                master_id: parallel.master_id,
                flags: parallel.flags,
                requested_parallelism: parallel.requested_parallelism,
            };
            contribute_attrs(&mut guard.attributes, ctx.labels, &data);
            let timestamp = Timestamp::now();
            ctx.archive.write_event(
                loc.evt_writer,
                EventRecord::Leave {
                    timestamp,
                    region_ref,
                    attributes: &guard.attributes,
                },
            )?;
            loc.leave_region_def_scope(&mut guard.inherited_defs);
            guard.ref_count -= 1;
            let destroyer = guard.ref_count == 0;
            drop(guard);
            if destroyer {
                destroy_parallel_region(ctx, &parallel)?;
            }
        }
        mut other => {
            let data = other.attr_data();
            let attrs = other.attributes_mut();
            push_common_attrs(attrs, ctx.labels, encountering, kind, Label::EndpointLeave);
            attrs.add(
                AttrName::EventType,
                AttributeValue::StringRef(ctx.labels.get(leave_event_type_label(kind))),
            );
            contribute_attrs(attrs, ctx.labels, &data);
            let timestamp = Timestamp::now();
            ctx.archive.write_event(
                loc.evt_writer,
                EventRecord::Leave {
                    timestamp,
                    region_ref,
                    attributes: other.attributes(),
                },
            )?;
            loc.store_region_def(other);
        }
    }
    loc.inc_event_count();
    Ok(())
}

/// Emits a discrete task-create event carrying the creating task's return
/// address, then queues the new task's own region definition for later
/// writing. `task_region` must be a `RegionDef::Task`.
pub fn task_create(
    ctx: &EngineContext,
    loc: &mut Location,
    encountering_task_id: TaskId,
    mut task_region: RegionDef,
) -> TraceResult<()> {
    let data = task_region.attr_data();
    let attrs = task_region.attributes_mut();
    attrs.clear();
    attrs.add(
        AttrName::EncounteringTaskId,
        AttributeValue::Uint64(encountering_task_id.raw()),
    );
    attrs.add(
        AttrName::EventType,
        AttributeValue::StringRef(ctx.labels.get(Label::EventTaskCreate)),
    );
    contribute_attrs(attrs, ctx.labels, &data);
    let timestamp = Timestamp::now();
    ctx.archive.write_event(
        loc.evt_writer,
        EventRecord::TaskCreate {
            timestamp,
            attributes: task_region.attributes(),
        },
    )?;
    loc.store_region_def(task_region);
    loc.inc_event_count();
    Ok(())
}

/// Records why `prior_task` was last suspended. Emits no event on its own --
/// folded into `task_switch` for the common case, exposed separately for
/// schedule points that are not themselves a switch.
pub fn task_schedule(prior_task: &mut RegionDef, status: TaskStatus) {
    prior_task.as_task_mut().payload.status = status;
}

/// Transfers active-region stacks between the location and the two tasks
/// involved, then emits a single discrete switch event. Fatal (via
/// `Location::store_active_regions_in_task`/`get_active_regions_from_task`)
/// if either task's saved stack is not in the expected empty state.
pub fn task_switch(
    ctx: &EngineContext,
    loc: &mut Location,
    prior_task: &mut RegionDef,
    status: TaskStatus,
    next_task: &mut RegionDef,
) -> TraceResult<()> {
    task_schedule(prior_task, status);
    let prior_id = prior_task.as_task().payload.id;
    let next_id = next_task.as_task().payload.id;

    loc.store_active_regions_in_task(&mut prior_task.as_task_mut().payload.saved_rgn_stack);
    loc.get_active_regions_from_task(&mut next_task.as_task_mut().payload.saved_rgn_stack);

    let mut attrs = AttributeList::new();
    attrs.add(
        AttrName::EventType,
        AttributeValue::StringRef(ctx.labels.get(Label::EventTaskSwitch)),
    );
    attrs.add(AttrName::PriorTaskId, AttributeValue::Uint64(prior_id.raw()));
    attrs.add(AttrName::NextTaskId, AttributeValue::Uint64(next_id.raw()));
    attrs.add(
        AttrName::PriorTaskStatus,
        AttributeValue::StringRef(ctx.labels.get(task_status_label(status))),
    );
    attrs.add(
        AttrName::NextTaskRegionType,
        AttributeValue::StringRef(ctx.labels.get(Label::RegionTask)),
    );
    let timestamp = Timestamp::now();
    ctx.archive.write_event(
        loc.evt_writer,
        EventRecord::TaskSwitch {
            timestamp,
            attributes: &attrs,
        },
    )?;
    loc.inc_event_count();
    Ok(())
}

/// Emits a synchronisation event for `task_id`, carrying whether it awaits
/// only its direct children or all descendants. The sync point's own region
/// definition is queued via `loc`'s pending-defs mechanism like any other
/// non-shared region. The wire `sync_type` is always `Taskwait`: this is the
/// only synchronisation call the instrumentation surface exposes.
pub fn synchronise_tasks(
    ctx: &EngineContext,
    loc: &mut Location,
    region_ref: crate::ids::RegionRef,
    task_id: TaskId,
    task_sync_mode: TaskSyncMode,
) -> TraceResult<()> {
    let mut attrs = AttributeList::new();
    attrs.add(
        AttrName::EventType,
        AttributeValue::StringRef(ctx.labels.get(Label::EventSyncBegin)),
    );
    attrs.add(
        AttrName::EncounteringTaskId,
        AttributeValue::Uint64(task_id.raw()),
    );
    attrs.add(
        AttrName::SyncType,
        AttributeValue::StringRef(ctx.labels.get(sync_type_label(SyncType::Taskwait))),
    );
    attrs.add(
        AttrName::SyncDescendantTasks,
        AttributeValue::Boolean(task_sync_mode == TaskSyncMode::Descendants),
    );
    let timestamp = Timestamp::now();
    ctx.archive.write_event(
        loc.evt_writer,
        EventRecord::Sync {
            timestamp,
            attributes: &attrs,
        },
    )?;
    loc.inc_event_count();
    loc.store_region_def(RegionDef::new_sync(
        region_ref,
        task_id,
        SyncType::Taskwait,
        task_sync_mode,
    ));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::JsonArchive;
    use crate::attributes::LabelTable;
    use crate::config::{EventModel, Options};
    use crate::ids::{TaskId as Tid, UniqueIdAllocators};
    use crate::location::{Location, ThreadType, DEFAULT_LOCATION_GROUP};
    use crate::region::{RegionDef, RegionKind, SourceLocation, TaskFlags};

    fn test_setup(label: &str) -> (JsonArchive, UniqueIdAllocators) {
        let dir = std::env::temp_dir().join(format!(
            "tasktrace-engine-test-{}-{}",
            label,
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        let archive = JsonArchive::open(&Options {
            hostname: "h".into(),
            tracename: "t".into(),
            tracepath: dir,
            archive_name: "a".into(),
            append_hostname: false,
            event_model: EventModel::Omp,
        })
        .unwrap();
        (archive, UniqueIdAllocators::new())
    }

    fn labels(ids: &UniqueIdAllocators) -> LabelTable {
        LabelTable::build(|_s| ids.next_string_ref())
    }

    #[test]
    fn enter_leave_balances_region_stack() {
        let (archive, ids) = test_setup("balance");
        let table = labels(&ids);
        let ctx = EngineContext {
            archive: &archive,
            labels: &table,
        };
        let mut loc = Location::new(
            1,
            ThreadType::Worker,
            ids.next_location_ref(),
            crate::archive::LocationType::CpuThread,
            DEFAULT_LOCATION_GROUP,
            &archive,
        );
        let region = RegionDef::new_master(ids.next_region_ref(), Tid::UNDEFINED);
        enter(&ctx, &mut loc, region).unwrap();
        assert!(!loc.region_stack_is_empty());
        leave(&ctx, &mut loc).unwrap();
        assert!(loc.region_stack_is_empty());
        assert_eq!(loc.event_count(), 2);
    }

    #[test]
    fn parallel_region_destroyed_exactly_once_at_last_leave() {
        let (archive, ids) = test_setup("parallel");
        let table = labels(&ids);
        let ctx = EngineContext {
            archive: &archive,
            labels: &table,
        };
        let ref_id = ids.next_region_ref();
        let parallel = crate::region::ParallelRegion::new(ref_id, 1, Tid::UNDEFINED, Tid::UNDEFINED, 0, 4);

        let mut locs: Vec<Location> = (0..4)
            .map(|i| {
                Location::new(
                    i,
                    ThreadType::Worker,
                    ids.next_location_ref(),
                    crate::archive::LocationType::CpuThread,
                    DEFAULT_LOCATION_GROUP,
                    &archive,
                )
            })
            .collect();

        for loc in locs.iter_mut() {
            enter(&ctx, loc, RegionDef::Parallel(parallel.clone())).unwrap();
        }
        assert_eq!(parallel.lock().ref_count, 4);

        for loc in locs.iter_mut() {
            leave(&ctx, loc).unwrap();
        }
        assert_eq!(parallel.lock().ref_count, 0);
        for loc in locs.iter() {
            assert!(loc.region_stack_is_empty());
        }
    }

    #[test]
    fn task_switch_round_trips_region_stacks() {
        let (archive, ids) = test_setup("switch");
        let table = labels(&ids);
        let ctx = EngineContext {
            archive: &archive,
            labels: &table,
        };
        let mut loc = Location::new(
            1,
            ThreadType::Worker,
            ids.next_location_ref(),
            crate::archive::LocationType::CpuThread,
            DEFAULT_LOCATION_GROUP,
            &archive,
        );

        let mut task_a = RegionDef::new_task(
            ids.next_region_ref(),
            Tid::UNDEFINED,
            ids.next_task_id(),
            Tid::UNDEFINED,
            TaskFlags::NONE,
            false,
            SourceLocation {
                file: "f",
                func: "g",
                line: 1,
            },
            0,
            0,
        );
        let mut task_b = RegionDef::new_task(
            ids.next_region_ref(),
            Tid::UNDEFINED,
            ids.next_task_id(),
            Tid::UNDEFINED,
            TaskFlags::NONE,
            false,
            SourceLocation {
                file: "f",
                func: "g",
                line: 2,
            },
            0,
            0,
        );

        enter(&ctx, &mut loc, RegionDef::new_master(ids.next_region_ref(), Tid::UNDEFINED)).unwrap();
        task_switch(&ctx, &mut loc, &mut task_a, TaskStatus::Switch, &mut task_b).unwrap();
        assert!(loc.region_stack_is_empty());
        assert_eq!(task_a.as_task().payload.saved_rgn_stack.len(), 1);
        assert_eq!(task_a.as_task().payload.status, TaskStatus::Switch);

        task_switch(&ctx, &mut loc, &mut task_b, TaskStatus::Complete, &mut task_a).unwrap();
        assert_eq!(loc.pop_region().kind(), RegionKind::Master);
        assert!(loc.region_stack_is_empty());
    }

    #[test]
    fn thread_begin_emits_cpu_and_unique_id_attributes() {
        let dir = std::env::temp_dir().join(format!(
            "tasktrace-engine-test-thread-begin-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        let archive = JsonArchive::open(&Options {
            hostname: "h".into(),
            tracename: "t".into(),
            tracepath: dir.clone(),
            archive_name: "a".into(),
            append_hostname: false,
            event_model: EventModel::Omp,
        })
        .unwrap();
        let ids = UniqueIdAllocators::new();
        let table = labels(&ids);
        let ctx = EngineContext {
            archive: &archive,
            labels: &table,
        };
        let location_ref = ids.next_location_ref();
        let mut loc = Location::new(
            42,
            ThreadType::Worker,
            location_ref,
            crate::archive::LocationType::CpuThread,
            DEFAULT_LOCATION_GROUP,
            &archive,
        );

        thread_begin(&ctx, &mut loc).unwrap();
        archive.close().unwrap();

        let events = std::fs::read_to_string(
            dir.join("a").join(format!("events-{}.jsonl", location_ref.raw())),
        )
        .unwrap();
        assert!(events.contains("\"UniqueId\":42"));
        assert!(events.contains("\"Cpu\":"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
