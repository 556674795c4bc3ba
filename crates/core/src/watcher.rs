use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::TagService;
use crate::error::Result;

/// Event type emitted by the filesystem watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatcherEvent {
    /// At least one note's tag set changed, or a note appeared or disappeared
    TagsChanged,
    /// Notes were renamed or moved and the index was rebuilt
    Rescanned,
}

/// Sets up a filesystem watcher for the notes directory.
///
/// Content changes, creations and deletions of individual notes go through
/// [`TagService::sync_note`]. Renames and moves trigger a full
/// [`TagService::rescan`]. Events arriving while the service is writing notes
/// itself are ignored.
///
/// # Returns
///
/// Returns a `RecommendedWatcher` that must be kept alive for the duration of watching.
/// Dropping the watcher will stop filesystem monitoring.
///
/// # Example
///
/// ```no_run
/// use notetag_core::{TagService, setup_watcher, WatcherEvent};
/// use std::sync::{Arc, Mutex};
///
/// let service = TagService::new("/path/to/notes").unwrap();
/// let service = Arc::new(Mutex::new(service));
/// let _watcher = setup_watcher(Arc::clone(&service), None::<fn(WatcherEvent)>).unwrap();
/// // Keep _watcher alive while you want to monitor filesystem changes
/// ```
pub fn setup_watcher<F>(
    service: Arc<Mutex<TagService>>,
    on_change: Option<F>,
) -> Result<RecommendedWatcher>
where
    F: Fn(WatcherEvent) + Send + 'static,
{
    let notes_root = {
        let service = service.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        service.notes_root().to_path_buf()
    };

    let mut watcher = RecommendedWatcher::new(
        move |result: std::result::Result<Event, notify::Error>| match result {
            Ok(event) => handle_event(&service, &event, on_change.as_ref()),
            Err(e) => log::error!("Filesystem watcher error: {:?}", e),
        },
        Config::default(),
    )?;

    watcher.watch(&notes_root, RecursiveMode::Recursive)?;

    Ok(watcher)
}

fn handle_event<F>(service: &Mutex<TagService>, event: &Event, on_change: Option<&F>)
where
    F: Fn(WatcherEvent),
{
    let Ok(mut service) = service.lock() else {
        log::error!("Tag service lock poisoned; dropping watcher event");
        return;
    };

    // Skip if an operation is in progress (the service is making changes)
    if service.operation_flag().load(Ordering::SeqCst) {
        return;
    }

    match event.kind {
        // Handle rename/move events - need full rescan. A moved-out folder no
        // longer exists on disk, so only the path itself can be checked.
        EventKind::Modify(ModifyKind::Name(_)) => {
            let is_note_related = event
                .paths
                .iter()
                .any(|p| service.filesystem().is_tracked_path(p));
            if !is_note_related {
                return;
            }

            match service.rescan() {
                Ok(skipped) => {
                    if !skipped.is_empty() {
                        log::warn!("Rescan after rename skipped {} notes", skipped.len());
                    }
                    if let Some(callback) = on_change {
                        callback(WatcherEvent::Rescanned);
                    }
                }
                Err(e) => log::error!("Failed to rescan after rename: {}", e),
            }
        }
        // Handle create, modify, and delete events for specific notes
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {
            let mut changed = false;
            for path in &event.paths {
                let Some(key) = service.filesystem().key_for_path(path) else {
                    continue;
                };
                match service.sync_note(&key) {
                    Ok(note_changed) => changed |= note_changed,
                    Err(e) => log::warn!("Failed to sync note {}: {}", key, e),
                }
            }

            // Only notify if a tag set actually changed
            if changed && let Some(callback) = on_change {
                callback(WatcherEvent::TagsChanged);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind, RenameMode};
    use std::sync::atomic::AtomicBool;
    use tempfile::TempDir;

    struct Harness {
        temp_dir: TempDir,
        service: Mutex<TagService>,
        events: Mutex<Vec<WatcherEvent>>,
    }

    impl Harness {
        fn new() -> Self {
            let temp_dir = TempDir::new().unwrap();
            std::fs::write(temp_dir.path().join("a.md"), "tags: #one\n").unwrap();
            let mut service = TagService::new(temp_dir.path()).unwrap();
            service.startup_sync().unwrap();
            Self {
                temp_dir,
                service: Mutex::new(service),
                events: Mutex::new(Vec::new()),
            }
        }

        fn send(&self, kind: EventKind, file: &str) {
            let event = Event::new(kind).add_path(self.temp_dir.path().join(file));
            let record = |e: WatcherEvent| self.events.lock().unwrap().push(e);
            handle_event(&self.service, &event, Some(&record));
        }

        fn events(&self) -> Vec<WatcherEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    #[test]
    fn test_modify_syncs_note() {
        let h = Harness::new();
        std::fs::write(h.temp_dir.path().join("a.md"), "tags: #two\n").unwrap();

        h.send(EventKind::Modify(ModifyKind::Data(DataChange::Content)), "a.md");

        let service = h.service.lock().unwrap();
        assert!(service.notes_with_tag("one").is_empty());
        assert_eq!(service.notes_with_tag("two").len(), 1);
        drop(service);
        assert_eq!(h.events(), vec![WatcherEvent::TagsChanged]);
    }

    #[test]
    fn test_body_only_change_is_quiet() {
        let h = Harness::new();
        std::fs::write(h.temp_dir.path().join("a.md"), "tags: #one\nnew body\n").unwrap();

        h.send(EventKind::Modify(ModifyKind::Data(DataChange::Content)), "a.md");
        assert!(h.events().is_empty());
    }

    #[test]
    fn test_create_and_remove() {
        let h = Harness::new();
        std::fs::write(h.temp_dir.path().join("b.txt"), "tags: #one\n").unwrap();
        h.send(EventKind::Create(CreateKind::File), "b.txt");
        assert_eq!(h.service.lock().unwrap().notes_with_tag("one").len(), 2);

        std::fs::remove_file(h.temp_dir.path().join("b.txt")).unwrap();
        h.send(EventKind::Remove(RemoveKind::File), "b.txt");
        assert_eq!(h.service.lock().unwrap().notes_with_tag("one").len(), 1);

        assert_eq!(h.events(), vec![WatcherEvent::TagsChanged, WatcherEvent::TagsChanged]);
    }

    #[test]
    fn test_rename_triggers_rescan() {
        let h = Harness::new();
        std::fs::rename(h.temp_dir.path().join("a.md"), h.temp_dir.path().join("c.md")).unwrap();

        h.send(EventKind::Modify(ModifyKind::Name(RenameMode::Both)), "c.md");

        let service = h.service.lock().unwrap();
        assert_eq!(service.notes_with_tag("one").into_iter().collect::<Vec<_>>(), vec!["c.md"]);
        drop(service);
        assert_eq!(h.events(), vec![WatcherEvent::Rescanned]);
    }

    #[test]
    fn test_folder_moved_out_drops_its_notes() {
        let h = Harness::new();
        let folder = h.temp_dir.path().join("projects");
        std::fs::create_dir(&folder).unwrap();
        std::fs::write(folder.join("alpha.md"), "tags: #moved\n").unwrap();
        h.service.lock().unwrap().rescan().unwrap();
        assert_eq!(h.service.lock().unwrap().notes_with_tag("moved").len(), 1);

        let elsewhere = TempDir::new().unwrap();
        std::fs::rename(&folder, elsewhere.path().join("projects")).unwrap();
        h.send(EventKind::Modify(ModifyKind::Name(RenameMode::From)), "projects");

        assert!(h.service.lock().unwrap().notes_with_tag("moved").is_empty());
        assert_eq!(h.service.lock().unwrap().notes_with_tag("one").len(), 1);
        assert_eq!(h.events(), vec![WatcherEvent::Rescanned]);
    }

    #[test]
    fn test_hidden_rename_is_ignored() {
        let h = Harness::new();
        h.send(EventKind::Modify(ModifyKind::Name(RenameMode::Both)), ".git/index.lock");
        assert!(h.events().is_empty());
    }

    #[test]
    fn test_ignores_non_notes_and_own_writes() {
        let h = Harness::new();
        std::fs::write(h.temp_dir.path().join("image.png"), b"png").unwrap();
        h.send(EventKind::Create(CreateKind::File), "image.png");
        assert!(h.events().is_empty());

        let flag: Arc<AtomicBool> = h.service.lock().unwrap().operation_flag();
        flag.store(true, Ordering::SeqCst);
        std::fs::write(h.temp_dir.path().join("a.md"), "tags: #changed\n").unwrap();
        h.send(EventKind::Modify(ModifyKind::Data(DataChange::Content)), "a.md");
        flag.store(false, Ordering::SeqCst);

        assert!(h.events().is_empty());
        assert!(h.service.lock().unwrap().notes_with_tag("changed").is_empty());
    }
}
