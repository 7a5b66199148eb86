//! Trace lifecycle: archive creation, catalog/label installation, string
//! interning, and the location/task-manager registries that live for the
//! whole process.
//!
//! Grounded on `otterTraceInitialise`/`otterTraceFinalise` in `trace-core.c`:
//! open the archive, write the attribute catalog and enum-label strings
//! once, hand back a handle the rest of the runtime threads through for
//! every subsequent call.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::archive::{ArchiveSink, JsonArchive, LocationType};
use crate::attributes::{AttributeCatalog, LabelTable};
use crate::config::{EventModel, Options};
use crate::engine::{self, EngineContext};
use crate::error::TraceResult;
use crate::ids::{StringRef, UniqueIdAllocators, GLOBAL_IDS};
use crate::location::{Location, ThreadType, DEFAULT_LOCATION_GROUP};
use crate::strings::{Labeller, StringRegistry};
use crate::task::{TaskContext, TaskManager};

struct IdsLabeller(&'static UniqueIdAllocators);

impl Labeller for IdsLabeller {
    fn next_ref(&self) -> StringRef {
        self.0.next_string_ref()
    }
}

pub struct TraceState {
    ids: &'static UniqueIdAllocators,
    archive: Box<dyn ArchiveSink>,
    labels: LabelTable,
    strings: Mutex<StringRegistry<IdsLabeller>>,
    task_manager: TaskManager,
    options: Options,
    any_location_created: AtomicBool,
}

impl TraceState {
    /// Opens the archive and writes every catalog attribute and enum label as
    /// a string + attribute definition. The unique-ref allocators themselves
    /// are process-wide (`ids::GLOBAL_IDS`) and are never reset here: two
    /// `initialise`/`finalise` cycles in the same process must keep handing
    /// out fresh, non-overlapping ids, per spec.md §9.
    pub fn initialise(event_model: EventModel) -> TraceResult<Self> {
        let options = Options::from_env(event_model);
        let archive: Box<dyn ArchiveSink> = Box::new(JsonArchive::open(&options)?);
        let ids: &'static UniqueIdAllocators = &GLOBAL_IDS;

        let mut registry = StringRegistry::new(IdsLabeller(ids));
        let labels = LabelTable::build(|s| registry.insert(s));

        let catalog = AttributeCatalog::new();
        let attr_refs: Vec<_> = catalog
            .iter()
            .map(|def| (registry.insert(def.label), registry.insert(def.description), def.ty))
            .collect();

        for (text, string_ref) in registry.iter() {
            archive.write_string(string_ref, text)?;
        }
        for (name_ref, description_ref, ty) in attr_refs {
            archive.write_attribute(name_ref, description_ref, ty)?;
        }

        Ok(TraceState {
            ids,
            archive,
            labels,
            strings: Mutex::new(registry),
            task_manager: TaskManager::new(),
            options,
            any_location_created: AtomicBool::new(false),
        })
    }

    pub fn engine_ctx(&self) -> EngineContext<'_> {
        EngineContext {
            archive: &*self.archive,
            labels: &self.labels,
        }
    }

    pub fn ids(&self) -> &UniqueIdAllocators {
        self.ids
    }

    pub fn task_manager(&self) -> &TaskManager {
        &self.task_manager
    }

    pub fn event_model(&self) -> EventModel {
        self.options.event_model
    }

    pub fn new_task(&self, parent: Option<&TaskContext>) -> TaskContext {
        TaskContext::new(self.ids, parent)
    }

    /// Interns `text`, writing a string definition to the archive the first
    /// time it is seen. Runtime interning (outside initialise) needs its own
    /// lock since the registry is otherwise only touched single-threaded.
    pub fn intern(&self, text: &str) -> TraceResult<StringRef> {
        let mut registry = self.strings.lock().unwrap_or_else(|p| p.into_inner());
        let before = registry.len();
        let string_ref = registry.insert(text);
        if registry.len() > before {
            self.archive.write_string(string_ref, text)?;
        }
        Ok(string_ref)
    }

    /// Allocates a fresh `Location` for the calling thread. Callers own the
    /// returned value exclusively -- per the one-location-per-thread rule --
    /// and must pass it through `engine::thread_begin` before first use.
    pub fn create_location(&self, thread_type: ThreadType) -> Location {
        self.any_location_created.store(true, Ordering::SeqCst);
        let tid = thread_id::get() as u64;
        let location_ref = self.ids.next_location_ref();
        Location::new(
            tid,
            thread_type,
            location_ref,
            LocationType::CpuThread,
            DEFAULT_LOCATION_GROUP,
            &*self.archive,
        )
    }

    /// Writes `loc`'s own definition record and flushes whatever pending
    /// region definitions it still holds. Called once a location's owning
    /// thread is done with it.
    pub fn finish_location(&self, loc: &mut Location) -> TraceResult<()> {
        let name_ref = self.intern(&format!("location-{}", loc.id))?;
        self.archive.write_location(
            loc.location_ref,
            name_ref,
            loc.location_type,
            loc.event_count(),
            loc.group,
        )?;
        let ctx = self.engine_ctx();
        engine::flush_pending_region_defs(&ctx, loc)
    }

    /// Flushes accumulated definitions, closes the archive and returns the
    /// trace folder path. If the traced program never created a location
    /// (e.g. it called only `trace_initialise`/`trace_finalise`), a single
    /// dummy initial-thread location is created and destroyed here so at
    /// least one location definition exists in the archive.
    pub fn finalise(self) -> TraceResult<PathBuf> {
        if !self.any_location_created.load(Ordering::SeqCst) {
            let mut dummy = Location::new(
                thread_id::get() as u64,
                ThreadType::Initial,
                self.ids.next_location_ref(),
                LocationType::CpuThread,
                DEFAULT_LOCATION_GROUP,
                &*self.archive,
            );
            self.finish_location(&mut dummy)?;
        }
        self.archive.close()?;
        Ok(self.options.tracepath.join(&self.options.archive_name))
    }
}
