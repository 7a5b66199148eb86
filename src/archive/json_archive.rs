//! Reference `ArchiveSink` implementation: one newline-delimited JSON file
//! per location for events, plus a single `defs.jsonl` for every definition
//! record (strings, attributes, locations, regions), guarded by one mutex --
//! directly mirroring the original's single `global_def_writer_lock` around
//! `OTF2_GlobalDefWriter_Write*`.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use json::object;

use crate::attributes::{AttrType, AttributeList, AttributeValue};
use crate::config::Options;
use crate::error::TraceError;
use crate::ids::{LocationRef, StringRef};
use crate::error::TraceResult;

use super::{ArchiveSink, EventRecord, EvtWriterHandle, LocationType, RegionDefRecord};

pub struct JsonArchive {
    dir: PathBuf,
    defs: Mutex<File>,
    event_files: Mutex<HashMap<LocationRef, File>>,
}

fn attr_type_str(ty: AttrType) -> &'static str {
    match ty {
        AttrType::Int32 => "int32",
        AttrType::Uint32 => "uint32",
        AttrType::Uint64 => "uint64",
        AttrType::StringRef => "string_ref",
        AttrType::Boolean => "boolean",
    }
}

fn loc_type_str(ty: LocationType) -> &'static str {
    match ty {
        LocationType::CpuThread => "cpu_thread",
        LocationType::Accelerator => "accelerator",
        LocationType::Metric => "metric",
    }
}

fn attribute_value_json(v: &AttributeValue) -> json::JsonValue {
    match v {
        AttributeValue::Int32(n) => json::from(*n),
        AttributeValue::Uint32(n) => json::from(*n),
        AttributeValue::Uint64(n) => json::from(*n),
        AttributeValue::StringRef(r) => json::from(r.raw()),
        AttributeValue::Boolean(b) => json::from(*b),
    }
}

fn attributes_json(attrs: &AttributeList) -> json::JsonValue {
    let mut obj = json::JsonValue::new_object();
    for (name, value) in attrs.iter() {
        let _ = obj.insert(&format!("{:?}", name), attribute_value_json(value));
    }
    obj
}

fn sink_err(source: std::io::Error) -> TraceError {
    let err = TraceError::Sink(source);
    log::error!("{}", err);
    err
}

impl JsonArchive {
    fn append_def(&self, record: json::JsonValue) -> TraceResult<()> {
        let mut file = self.defs.lock().unwrap_or_else(|p| p.into_inner());
        writeln!(file, "{}", json::stringify(record)).map_err(sink_err)
    }

    fn event_file(&self, location_ref: LocationRef) -> TraceResult<std::fs::File> {
        let mut files = self.event_files.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(f) = files.get(&location_ref) {
            return f.try_clone().map_err(sink_err);
        }
        let path = self.dir.join(format!("events-{}.jsonl", location_ref.raw()));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(sink_err)?;
        let clone = file.try_clone().map_err(sink_err)?;
        files.insert(location_ref, file);
        Ok(clone)
    }
}

impl ArchiveSink for JsonArchive {
    fn open(opts: &Options) -> TraceResult<Self> {
        let dir = opts.tracepath.join(&opts.archive_name);
        fs::create_dir_all(&dir).map_err(|source| {
            let err = TraceError::CreateTraceDir { path: dir.clone(), source };
            log::error!("{}", err);
            err
        })?;
        let defs_path = dir.join("defs.jsonl");
        let defs = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&defs_path)
            .map_err(|source| {
                let err = TraceError::OpenArchive(source);
                log::error!("{}", err);
                err
            })?;
        Ok(JsonArchive {
            dir,
            defs: Mutex::new(defs),
            event_files: Mutex::new(HashMap::new()),
        })
    }

    fn write_string(&self, r: StringRef, text: &str) -> TraceResult<()> {
        self.append_def(object! {
            kind: "string",
            string_ref: r.raw(),
            text: text,
        })
    }

    fn write_attribute(
        &self,
        name_ref: StringRef,
        description_ref: StringRef,
        ty: AttrType,
    ) -> TraceResult<()> {
        self.append_def(object! {
            kind: "attribute",
            name_ref: name_ref.raw(),
            description_ref: description_ref.raw(),
            value_type: attr_type_str(ty),
        })
    }

    fn write_location(
        &self,
        ref_id: LocationRef,
        name_ref: StringRef,
        loc_type: LocationType,
        event_count: u64,
        group_ref: u32,
    ) -> TraceResult<()> {
        self.append_def(object! {
            kind: "location",
            location_ref: ref_id.raw(),
            name_ref: name_ref.raw(),
            location_type: loc_type_str(loc_type),
            events: event_count,
            group: group_ref,
        })
    }

    fn write_region_def(&self, def: RegionDefRecord) -> TraceResult<()> {
        let record = match def {
            RegionDefRecord::Parallel {
                ref_id,
                id,
                master_id,
                flags,
                requested_parallelism,
            } => object! {
                kind: "region",
                variant: "parallel",
                region_ref: ref_id.raw(),
                id: id,
                master_id: master_id.raw(),
                flags: flags,
                requested_parallelism: requested_parallelism,
            },
            RegionDefRecord::Workshare { ref_id, wstype, count } => object! {
                kind: "region",
                variant: "workshare",
                region_ref: ref_id.raw(),
                wstype: format!("{:?}", wstype),
                count: count,
            },
            RegionDefRecord::Sync {
                ref_id,
                sync_type,
                task_sync_mode,
            } => object! {
                kind: "region",
                variant: "sync",
                region_ref: ref_id.raw(),
                sync_type: format!("{:?}", sync_type),
                task_sync_mode: format!("{:?}", task_sync_mode),
            },
            RegionDefRecord::Master { ref_id } => object! {
                kind: "region",
                variant: "master",
                region_ref: ref_id.raw(),
            },
            RegionDefRecord::Task {
                ref_id,
                id,
                parent_id,
                flags,
                has_dependences,
                flavour,
                source_location,
            } => object! {
                kind: "region",
                variant: "task",
                region_ref: ref_id.raw(),
                id: id.raw(),
                parent_id: parent_id.raw(),
                flags: flags.0,
                has_dependences: has_dependences,
                flavour: flavour,
                source_file: source_location.file,
                source_func: source_location.func,
                source_line: source_location.line,
            },
            RegionDefRecord::Phase {
                ref_id,
                phase_type,
                phase_name,
            } => object! {
                kind: "region",
                variant: "phase",
                region_ref: ref_id.raw(),
                phase_type: format!("{:?}", phase_type),
                phase_name: phase_name,
            },
        };
        self.append_def(record)
    }

    fn write_event(&self, writer: EvtWriterHandle, event: EventRecord<'_>) -> TraceResult<()> {
        let record = match event {
            EventRecord::ThreadBegin { timestamp, attributes } => object! {
                kind: "thread_begin",
                ts: timestamp.as_nanos(),
                attributes: attributes_json(attributes),
            },
            EventRecord::ThreadEnd { timestamp, attributes } => object! {
                kind: "thread_end",
                ts: timestamp.as_nanos(),
                attributes: attributes_json(attributes),
            },
            EventRecord::Enter {
                timestamp,
                region_ref,
                attributes,
            } => object! {
                kind: "enter",
                ts: timestamp.as_nanos(),
                region: region_ref.raw(),
                attributes: attributes_json(attributes),
            },
            EventRecord::Leave {
                timestamp,
                region_ref,
                attributes,
            } => object! {
                kind: "leave",
                ts: timestamp.as_nanos(),
                region: region_ref.raw(),
                attributes: attributes_json(attributes),
            },
            EventRecord::TaskCreate { timestamp, attributes } => object! {
                kind: "task_create",
                ts: timestamp.as_nanos(),
                attributes: attributes_json(attributes),
            },
            EventRecord::TaskSwitch { timestamp, attributes } => object! {
                kind: "task_switch",
                ts: timestamp.as_nanos(),
                attributes: attributes_json(attributes),
            },
            EventRecord::Sync { timestamp, attributes } => object! {
                kind: "sync",
                ts: timestamp.as_nanos(),
                attributes: attributes_json(attributes),
            },
        };
        let mut file = self.event_file(writer.0)?;
        writeln!(file, "{}", json::stringify(record)).map_err(sink_err)
    }

    fn close(&self) -> TraceResult<()> {
        self.defs
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .flush()
            .map_err(sink_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EventModel;
    use tempfile_shim::temp_dir;

    mod tempfile_shim {
        use std::path::PathBuf;
        use std::sync::atomic::{AtomicU64, Ordering};

        static COUNTER: AtomicU64 = AtomicU64::new(0);

        /// A minimal stand-in for a temp-directory helper: this crate has no
        /// dependency dedicated to scratch directories, so tests lay out
        /// their own uniquely-named subdirectory under `std::env::temp_dir`
        /// and clean it up on drop.
        pub fn temp_dir(label: &str) -> PathBuf {
            let n = COUNTER.fetch_add(1, Ordering::Relaxed);
            let dir = std::env::temp_dir().join(format!("tasktrace-test-{}-{}", label, n));
            dir
        }
    }

    fn opts(dir: PathBuf) -> Options {
        Options {
            hostname: "test-host".into(),
            tracename: "trace".into(),
            tracepath: dir,
            archive_name: "trace".into(),
            append_hostname: false,
            event_model: EventModel::TaskGraph,
        }
    }

    #[test]
    fn open_creates_archive_directory() {
        let dir = temp_dir("open");
        let archive = JsonArchive::open(&opts(dir.clone())).unwrap();
        assert!(dir.join("trace").exists());
        archive.close().unwrap();
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn write_region_def_appends_to_defs_file() {
        let dir = temp_dir("regiondef");
        let archive = JsonArchive::open(&opts(dir.clone())).unwrap();
        archive
            .write_region_def(RegionDefRecord::Master {
                ref_id: crate::ids::UniqueIdAllocators::new().next_region_ref(),
            })
            .unwrap();
        archive.close().unwrap();
        let contents = fs::read_to_string(dir.join("trace").join("defs.jsonl")).unwrap();
        assert!(contents.contains("\"master\""));
        let _ = fs::remove_dir_all(&dir);
    }
}
