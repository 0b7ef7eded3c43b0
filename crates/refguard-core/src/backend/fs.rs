//! Directory-backed repository backend
//!
//! Layout under the repository directory:
//!
//! ```text
//! objects/<hex id>        raw object bytes
//! refs/...                one file per reference holding the hex target
//! ```
//!
//! Writes go to a temporary file unique to the writer and are renamed into
//! place. Reference updates hold an in-process lock and an exclusive lock on
//! `refs.lock` across the read-compare-write sequence, so separate processes
//! sharing the directory serialize their updates.

use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use super::{describe, ObjectStore, RefStore};
use crate::errors::{RefguardError, Result};
use crate::hash::ObjectId;

const OBJECTS_DIR: &str = "objects";
const REFS_DIR: &str = "refs";
const REFS_LOCK: &str = "refs.lock";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Repository stored in a local directory
#[derive(Debug)]
pub struct FsRepository {
    root: PathBuf,
    ref_lock: Mutex<()>,
}

impl FsRepository {
    /// Create the directory layout (if missing) and open it
    pub fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(OBJECTS_DIR))?;
        fs::create_dir_all(root.join(REFS_DIR))?;
        tracing::debug!(path = %root.display(), "initialized repository directory");
        Ok(Self {
            root,
            ref_lock: Mutex::new(()),
        })
    }

    /// Open an existing repository directory
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.join(OBJECTS_DIR).is_dir() || !root.join(REFS_DIR).is_dir() {
            return Err(RefguardError::not_found(format!(
                "no repository at {}",
                root.display()
            )));
        }
        Ok(Self {
            root,
            ref_lock: Mutex::new(()),
        })
    }

    /// Repository directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, id: &ObjectId) -> PathBuf {
        self.root.join(OBJECTS_DIR).join(id.to_hex())
    }

    fn ref_path(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name);
        let well_formed = name.starts_with("refs/")
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !well_formed {
            return Err(RefguardError::invalid(format!("bad reference name '{name}'")));
        }
        Ok(self.root.join(relative))
    }

    fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut tmp = path.as_os_str().to_owned();
        let sequence = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        tmp.push(format!(".{}.{sequence}.tmp", std::process::id()));
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, bytes)?;
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    /// Exclusive lock on the reference namespace, released when dropped
    fn lock_refs(&self) -> Result<File> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.root.join(REFS_LOCK))?;
        file.lock_exclusive()?;
        Ok(file)
    }

    fn collect_refs(&self, dir: &Path, out: &mut Vec<(String, ObjectId)>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                self.collect_refs(&path, out)?;
                continue;
            }
            if path.extension().is_some_and(|ext| ext == "tmp") {
                continue;
            }
            let relative = path
                .strip_prefix(&self.root)
                .map_err(|e| RefguardError::storage(e.to_string()))?;
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            let target = fs::read_to_string(&path)?.parse()?;
            out.push((name, target));
        }
        Ok(())
    }
}

impl ObjectStore for FsRepository {
    fn put_object(&self, bytes: &[u8]) -> Result<ObjectId> {
        let id = ObjectId::for_bytes(bytes);
        let path = self.object_path(&id);
        if !path.exists() {
            Self::write_atomic(&path, bytes)?;
        }
        Ok(id)
    }

    fn get_object(&self, id: &ObjectId) -> Result<Vec<u8>> {
        match fs::read(self.object_path(id)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(RefguardError::not_found(format!("object {id}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn has_object(&self, id: &ObjectId) -> Result<bool> {
        Ok(self.object_path(id).is_file())
    }

    fn object_ids(&self) -> Result<Vec<ObjectId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(self.root.join(OBJECTS_DIR))? {
            let name = entry?.file_name();
            if let Ok(id) = name.to_string_lossy().parse() {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}

impl RefStore for FsRepository {
    fn read_ref(&self, name: &str) -> Result<Option<ObjectId>> {
        match fs::read_to_string(self.ref_path(name)?) {
            Ok(text) => Ok(Some(text.parse()?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn update_ref(&self, name: &str, new: ObjectId, expected: Option<ObjectId>) -> Result<()> {
        let path = self.ref_path(name)?;
        let _guard = self.ref_lock.lock();
        let _refs_lock = self.lock_refs()?;
        let current = self.read_ref(name)?;
        if current != expected {
            return Err(RefguardError::RefConflict {
                reference: name.to_string(),
                expected: describe(expected),
                actual: describe(current),
            });
        }
        Self::write_atomic(&path, new.to_hex().as_bytes())?;
        tracing::trace!(reference = name, target = %new.short(), "reference updated");
        Ok(())
    }

    fn list_refs(&self) -> Result<Vec<(String, ObjectId)>> {
        let mut refs = Vec::new();
        self.collect_refs(&self.root.join(REFS_DIR), &mut refs)?;
        refs.sort();
        Ok(refs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_fs_backend_contract() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsRepository::init(dir.path().join("repo")).unwrap();
        super::super::tests::exercise_backend(&repo);
    }

    #[test]
    fn test_fs_backend_persists_across_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repo");
        let id = {
            let repo = FsRepository::init(&path).unwrap();
            let id = repo.put_object(b"persisted").unwrap();
            repo.update_ref("refs/heads/main", id, None).unwrap();
            id
        };

        let reopened = FsRepository::open(&path).unwrap();
        assert_eq!(reopened.read_ref("refs/heads/main").unwrap(), Some(id));
        assert_eq!(reopened.get_object(&id).unwrap(), b"persisted".to_vec());
    }

    #[test]
    fn test_fs_backend_rejects_escaping_ref_names() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsRepository::init(dir.path()).unwrap();
        let id = repo.put_object(b"x").unwrap();
        assert_matches!(
            repo.update_ref("refs/../../escape", id, None),
            Err(RefguardError::Invalid { .. })
        );
        assert_matches!(
            repo.update_ref("heads/main", id, None),
            Err(RefguardError::Invalid { .. })
        );
    }

    #[test]
    fn test_writers_on_one_directory_never_lose_updates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repo");
        FsRepository::init(&path).unwrap();
        let replaced = Mutex::new(Vec::new());

        std::thread::scope(|scope| {
            for writer in 0..4 {
                let (path, replaced) = (&path, &replaced);
                // separate handles share nothing but the directory
                scope.spawn(move || {
                    let repo = FsRepository::open(path).unwrap();
                    let mut updates = 0;
                    let mut attempt = 0;
                    while updates < 10 {
                        let current = repo.read_ref("refs/heads/main").unwrap();
                        let next = repo.put_object(format!("{writer}:{attempt}").as_bytes()).unwrap();
                        attempt += 1;
                        match repo.update_ref("refs/heads/main", next, current) {
                            Ok(()) => {
                                replaced.lock().push(current);
                                updates += 1;
                            }
                            Err(RefguardError::RefConflict { .. }) => {}
                            Err(e) => panic!("unexpected error: {e}"),
                        }
                    }
                });
            }
        });

        let replaced = replaced.into_inner();
        let distinct: std::collections::BTreeSet<_> = replaced.iter().collect();
        assert_eq!(replaced.len(), 40);
        assert_eq!(distinct.len(), 40);
        let repo = FsRepository::open(&path).unwrap();
        assert_eq!(repo.list_refs().unwrap().len(), 1);
    }

    #[test]
    fn test_open_missing_repository() {
        let dir = tempfile::tempdir().unwrap();
        assert_matches!(
            FsRepository::open(dir.path().join("absent")),
            Err(RefguardError::NotFound { .. })
        );
    }
}
