//! The ordered collection of uploaded records.
//!
//! [`FileStore`] is the single source of truth for what the user has
//! uploaded and what came back from conversion. It owns the preview handles
//! of the records it holds and is the only thing that revokes them:
//!
//! * [`FileStore::remove_where`] revokes the previews of removed records.
//! * [`FileStore::teardown`] (also run on drop) revokes everything left.
//!
//! [`FileStore::replace_all`] never revokes. A preview whose record vanishes
//! through `replace_all` is parked and released at teardown instead.

use crate::handles::{HandleRegistry, ObjectUrl};
use crate::record::FileRecord;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct FileStore {
    records: Vec<FileRecord>,
    orphaned: Vec<ObjectUrl>,
    handles: Arc<dyn HandleRegistry>,
}

impl FileStore {
    pub fn new(handles: Arc<dyn HandleRegistry>) -> Self {
        Self {
            records: Vec::new(),
            orphaned: Vec::new(),
            handles,
        }
    }

    /// Records in insertion order.
    pub fn list(&self) -> &[FileRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append `records` after the existing ones.
    pub fn append(&mut self, records: impl IntoIterator<Item = FileRecord>) {
        let before = self.records.len();
        self.records.extend(records);
        debug!("Store: appended {} records", self.records.len() - before);
    }

    /// Replace the whole collection (post-batch reconciliation).
    pub fn replace_all(&mut self, records: Vec<FileRecord>) {
        let kept: HashSet<&ObjectUrl> = records.iter().filter_map(|r| r.preview()).collect();
        let dropped: Vec<ObjectUrl> = self
            .records
            .iter()
            .filter_map(|r| r.preview())
            .filter(|p| !kept.contains(p))
            .cloned()
            .collect();
        if !dropped.is_empty() {
            warn!(
                "Store: {} previews lost their record on replace; deferring release to teardown",
                dropped.len()
            );
            self.orphaned.extend(dropped);
        }
        self.records = records;
    }

    /// Remove every record matching `predicate`, revoking its preview first.
    ///
    /// Returns the removed records, previews stripped.
    pub fn remove_where<F>(&mut self, mut predicate: F) -> Vec<FileRecord>
    where
        F: FnMut(&FileRecord) -> bool,
    {
        let mut removed = Vec::new();
        let mut retained = Vec::with_capacity(self.records.len());
        for mut record in self.records.drain(..) {
            if predicate(&record) {
                if let Some(preview) = record.take_preview() {
                    self.handles.revoke(&preview);
                }
                removed.push(record);
            } else {
                retained.push(record);
            }
        }
        self.records = retained;
        if !removed.is_empty() {
            debug!("Store: removed {} records", removed.len());
        }
        removed
    }

    /// Drop every record and release every preview the store still owns.
    pub fn teardown(&mut self) {
        let all = self.remove_where(|_| true);
        for url in self.orphaned.drain(..) {
            self.handles.revoke(&url);
        }
        if !all.is_empty() {
            debug!("Store: torn down ({} records)", all.len());
        }
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handles::ObjectUrls;
    use crate::record::{ImageType, SourceFile};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Registry that counts revocations per URL.
    #[derive(Default)]
    struct CountingRegistry {
        inner: ObjectUrls,
        revokes: Mutex<HashMap<ObjectUrl, usize>>,
    }

    impl CountingRegistry {
        fn revokes_of(&self, url: &ObjectUrl) -> usize {
            self.revokes.lock().unwrap().get(url).copied().unwrap_or(0)
        }
    }

    impl HandleRegistry for CountingRegistry {
        fn create(&self, mime: &str, bytes: Arc<[u8]>) -> ObjectUrl {
            self.inner.create(mime, bytes)
        }

        fn revoke(&self, url: &ObjectUrl) -> bool {
            *self.revokes.lock().unwrap().entry(url.clone()).or_default() += 1;
            self.inner.revoke(url)
        }
    }

    fn record(reg: &dyn HandleRegistry, name: &str, preview: bool) -> FileRecord {
        let src = SourceFile::new(name, "image/png", vec![0u8; 4]);
        let rec = FileRecord::new(src.clone());
        if preview {
            rec.with_preview(reg.create(src.mime(), Arc::clone(src.bytes())))
        } else {
            rec
        }
    }

    fn names(store: &FileStore) -> Vec<String> {
        store.list().iter().map(|r| r.source().name().to_string()).collect()
    }

    #[test]
    fn append_preserves_order() {
        let reg = Arc::new(CountingRegistry::default());
        let mut store = FileStore::new(reg.clone());
        store.append(vec![record(&*reg, "a", false), record(&*reg, "b", false)]);
        store.append(vec![record(&*reg, "c", false)]);
        store.append(Vec::new());
        store.append(vec![record(&*reg, "d", false), record(&*reg, "e", false)]);
        assert_eq!(names(&store), ["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn remove_where_revokes_only_removed_previews_once() {
        let reg = Arc::new(CountingRegistry::default());
        let mut store = FileStore::new(reg.clone());
        store.append(vec![
            record(&*reg, "keep", true),
            record(&*reg, "drop", true),
            record(&*reg, "drop-no-preview", false),
        ]);
        let keep_url = store.list()[0].preview().cloned().unwrap();
        let drop_url = store.list()[1].preview().cloned().unwrap();

        let removed = store.remove_where(|r| r.source().name().starts_with("drop"));

        assert_eq!(removed.len(), 2);
        assert!(removed.iter().all(|r| r.preview().is_none()));
        assert_eq!(names(&store), ["keep"]);
        assert_eq!(reg.revokes_of(&drop_url), 1);
        assert_eq!(reg.revokes_of(&keep_url), 0);
        assert!(reg.inner.is_live(&keep_url));

        drop(store);
        assert_eq!(reg.revokes_of(&keep_url), 1);
        assert_eq!(reg.revokes_of(&drop_url), 1);
        assert_eq!(reg.inner.live_count(), 0);
    }

    #[test]
    fn replace_all_does_not_revoke_surviving_previews() {
        let reg = Arc::new(CountingRegistry::default());
        let mut store = FileStore::new(reg.clone());
        store.append(vec![record(&*reg, "a.png", true), record(&*reg, "b.png", true)]);
        let urls: Vec<ObjectUrl> = store.list().iter().filter_map(|r| r.preview().cloned()).collect();

        let converted: Vec<FileRecord> = store
            .list()
            .iter()
            .map(|r| r.converted(ImageType::WebP, vec![1]))
            .collect();
        store.replace_all(converted);

        assert_eq!(names(&store), ["a.png", "b.png"]);
        assert!(store.list().iter().all(|r| r.is_converted()));
        for url in &urls {
            assert_eq!(reg.revokes_of(url), 0);
            assert!(reg.inner.is_live(url));
        }
    }

    #[test]
    fn replace_all_parks_vanished_previews_until_teardown() {
        let reg = Arc::new(CountingRegistry::default());
        let mut store = FileStore::new(reg.clone());
        store.append(vec![record(&*reg, "a", true), record(&*reg, "b", true)]);
        let b_url = store.list()[1].preview().cloned().unwrap();
        let first = store.list()[0].clone();

        store.replace_all(vec![first]);
        assert_eq!(reg.revokes_of(&b_url), 0);

        store.teardown();
        assert_eq!(reg.revokes_of(&b_url), 1);
        assert!(store.is_empty());

        // A second teardown has nothing left to release.
        store.teardown();
        assert_eq!(reg.revokes_of(&b_url), 1);
        assert_eq!(reg.inner.live_count(), 0);
    }
}
