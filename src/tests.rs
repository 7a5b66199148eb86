//! Crate-level integration tests exercising the public surface the way a
//! traced program actually would, across real OS threads. The focused
//! per-module tests already cover the engine's single-threaded contracts
//! (region-stack balance, parallel ref-counting, task switch, label
//! registry, sync modes); this module's job is the cross-cutting behaviour
//! that only shows up once more than one thread is involved.

use crate::config::EventModel;
use crate::{task_begin, task_end, thread_begin, thread_end, trace_finalise, trace_initialise, ThreadType};
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use std::thread;

fn clean_env() {
    env::remove_var(crate::config::ENV_TRACE_OUTPUT);
    env::remove_var(crate::config::ENV_TRACE_PATH);
    env::remove_var(crate::config::ENV_APPEND_HOSTNAME);
}

fn fresh_trace_dir(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "tasktrace-crate-test-{}-{}",
        label,
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ))
}

fn event_file_count(folder: &std::path::Path) -> usize {
    std::fs::read_dir(folder)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("events-"))
        .count()
}

/// Several real worker threads each run their own thread_begin/task/thread_end
/// sequence concurrently; every one of them must get its own location file,
/// and finalise must not be called until all of them have finished.
#[test]
#[serial]
fn omp_style_workers_each_get_their_own_location() {
    clean_env();
    let dir = fresh_trace_dir("multi-thread");
    env::set_var(crate::config::ENV_TRACE_PATH, dir.to_str().unwrap());
    trace_initialise(EventModel::Omp).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            thread::spawn(|| {
                thread_begin(ThreadType::Worker);
                let task = task_begin!(None);
                task_end(&task);
                thread_end();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let folder = trace_finalise().unwrap();
    assert_eq!(event_file_count(&folder), 4);

    let _ = std::fs::remove_dir_all(&dir);
    clean_env();
}

/// A worker thread that never calls `thread_end` still gets its location
/// finalised, via the thread-local's `Drop` impl running at thread exit --
/// the safe-Rust analogue of the original's pthread TLS destructor.
#[test]
#[serial]
fn location_is_finalised_on_thread_exit_without_explicit_thread_end() {
    clean_env();
    let dir = fresh_trace_dir("drop-finalise");
    env::set_var(crate::config::ENV_TRACE_PATH, dir.to_str().unwrap());
    trace_initialise(EventModel::Omp).unwrap();

    thread::spawn(|| {
        thread_begin(ThreadType::Worker);
        let task = task_begin!(None);
        task_end(&task);
        // deliberately no thread_end() -- the LocationCell's Drop impl must
        // finalise this location when the thread's TLS is torn down.
    })
    .join()
    .unwrap();

    let folder = trace_finalise().unwrap();
    let defs = std::fs::read_to_string(folder.join("defs.jsonl")).unwrap();
    assert_eq!(defs.matches("\"location\"").count(), 1);
    assert_eq!(event_file_count(&folder), 1);

    let _ = std::fs::remove_dir_all(&dir);
    clean_env();
}
