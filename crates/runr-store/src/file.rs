use std::{
    collections::BTreeMap,
    fs::{self, File, OpenOptions},
    io::{self, BufReader, Write},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
    time::SystemTime,
};

use tracing::{debug, info, warn};

use runr_core::{JobStore, StoreError};
use runr_model::{Job, StoreConfig};

use crate::{
    codec::{CborCodec, CodecError},
    filter::{can_delete, can_resume},
};

const STATE_EXT: &str = ".state";
const TMP_EXT: &str = ".state.tmp";

/// Files found for one job id during a scan.
#[derive(Debug, Default)]
struct Entry {
    state: Option<PathBuf>,
    tmp: Option<PathBuf>,
}

/// Jobs persisted as one CBOR file each in a directory owned by this process.
///
/// Obtain instances through [`FileStoreProvider`](crate::FileStoreProvider)
/// so that one directory never has two stores.
pub struct FileStore {
    dir: PathBuf,
    config: StoreConfig,
    codec: CborCodec,
    lock: Mutex<()>,
}

impl FileStore {
    /// `dir` must exist.
    pub fn new(dir: impl Into<PathBuf>, config: StoreConfig) -> Self {
        Self {
            dir: dir.into(),
            config,
            codec: CborCodec,
            lock: Mutex::new(()),
        }
    }

    /// Directory holding one file per job.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Configuration the store was opened with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn state_path(&self, id: u64) -> PathBuf {
        self.dir.join(format!("{id}{STATE_EXT}"))
    }

    fn tmp_path(&self, id: u64) -> PathBuf {
        self.dir.join(format!("{id}{TMP_EXT}"))
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Directory entries grouped by job, in lexicographic file name order.
    fn scan(&self) -> Result<Vec<Entry>, StoreError> {
        let dir = fs::read_dir(&self.dir).map_err(|e| StoreError::io("read dir", &self.dir, e))?;

        let mut names = Vec::new();
        for entry in dir {
            let entry = entry.map_err(|e| StoreError::io("read dir", &self.dir, e))?;
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        names.sort();

        let mut entries: BTreeMap<String, Entry> = BTreeMap::new();
        for name in names {
            let path = self.dir.join(&name);
            if let Some(stem) = name.strip_suffix(TMP_EXT) {
                entries.entry(stem.to_string()).or_default().tmp = Some(path);
            } else if let Some(stem) = name.strip_suffix(STATE_EXT) {
                entries.entry(stem.to_string()).or_default().state = Some(path);
            } else {
                debug!(file = %path.display(), "ignoring foreign file in job store");
            }
        }
        Ok(entries.into_values().collect())
    }

    fn decode_file(&self, path: &Path) -> Result<Job, CodecError> {
        let file = File::open(path).map_err(|e| CodecError::Decode(ciborium::de::Error::Io(e)))?;
        self.codec.decode(BufReader::new(file))
    }

    /// Decode the committed file, falling back to the temp file when the
    /// committed one is missing or torn.
    fn load(&self, entry: &Entry) -> Option<Job> {
        let mut candidates = entry.state.iter().chain(entry.tmp.iter());
        candidates.find_map(|path| match self.decode_file(path) {
            Ok(job) => Some(job),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "skipping undecodable job file");
                None
            }
        })
    }

    fn remove_files(&self, id: u64) -> Result<(), StoreError> {
        let mut first_err = None;
        for path in [self.state_path(id), self.tmp_path(id)] {
            match fs::remove_file(&path) {
                Ok(()) => debug!(job = id, file = %path.display(), "removed job file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(job = id, file = %path.display(), error = %e, "failed to remove job file");
                    first_err.get_or_insert(StoreError::io("remove", path, e));
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn write_tmp(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut opts = OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o600);
        }

        let mut file = opts.open(path)?;
        file.write_all(bytes)?;
        file.sync_all()
    }

    fn request_at(&self, now: SystemTime) -> Result<Option<Job>, StoreError> {
        let _g = self.guard();

        for entry in self.scan()? {
            let Some(job) = self.load(&entry) else {
                continue;
            };

            if can_delete(&job.state, now, &self.config) {
                debug!(job = job.id(), state = %job.state.build_state(), "deleting dead job");
                self.remove_files(job.id())?;
                continue;
            }
            if can_resume(&job.state, now, &self.config) {
                info!(job = job.id(), retries = job.state.retries(), "found resumable job");
                return Ok(Some(job));
            }
        }
        Ok(None)
    }
}

impl JobStore for FileStore {
    fn request(&self) -> Result<Option<Job>, StoreError> {
        self.request_at(SystemTime::now())
    }

    fn list(&self) -> Result<Vec<Job>, StoreError> {
        let _g = self.guard();
        Ok(self.scan()?.iter().filter_map(|e| self.load(e)).collect())
    }

    fn update(&self, job: &Job) -> Result<(), StoreError> {
        let _g = self.guard();

        let bytes = self.codec.encode(job).map_err(|e| StoreError::Encode {
            id: job.id(),
            reason: e.to_string(),
        })?;

        let tmp = self.tmp_path(job.id());
        self.write_tmp(&tmp, &bytes)
            .map_err(|e| StoreError::io("write", &tmp, e))?;

        let dst = self.state_path(job.id());
        fs::rename(&tmp, &dst).map_err(|e| StoreError::io("rename", &dst, e))?;
        debug!(job = job.id(), state = %job.state.build_state(), "job state saved");
        Ok(())
    }

    fn remove(&self, job: &Job) -> Result<(), StoreError> {
        let _g = self.guard();
        self.remove_files(job.id())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use runr_model::{BuildRuntimeState, JobResponse, JobRuntimeState};

    use super::*;

    fn job(id: u64, state: JobRuntimeState) -> Job {
        Job {
            response: JobResponse {
                id,
                token: format!("token-{id}"),
                ..Default::default()
            },
            state,
        }
    }

    #[test]
    fn update_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), StoreConfig::default());

        store.update(&job(7, JobRuntimeState::new())).unwrap();

        assert!(dir.path().join("7.state").exists());
        assert!(!dir.path().join("7.state.tmp").exists());
    }

    #[test]
    fn scan_groups_files_by_id() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["2.state", "10.state", "10.state.tmp", "notes.txt"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let store = FileStore::new(dir.path(), StoreConfig::default());

        let entries = store.scan().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].state.as_ref().unwrap().ends_with("10.state"));
        assert!(entries[0].tmp.is_some());
        assert!(entries[1].tmp.is_none());
    }

    #[test]
    fn request_returns_abandoned_job() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), StoreConfig::default());
        let now = SystemTime::now();

        let mut state = JobRuntimeState::new().with_health_check_at(now - Duration::from_secs(3600));
        state.set_build_state(BuildRuntimeState::Running);
        state.set_stage("step_script");
        store.update(&job(1, state)).unwrap();

        let got = store.request_at(now).unwrap().unwrap();
        assert_eq!(got.id(), 1);
        assert_eq!(got.state.retries(), 0);
        assert_eq!(got.state.stage(), "step_script");
    }

    #[test]
    fn fresh_job_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), StoreConfig::default());
        let now = SystemTime::now();

        store.update(&job(3, JobRuntimeState::new().with_health_check_at(now))).unwrap();

        assert!(store.request_at(now).unwrap().is_none());
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn remove_tolerates_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), StoreConfig::default());
        store.remove(&job(99, JobRuntimeState::new())).unwrap();
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("gone"), StoreConfig::default());
        assert!(matches!(store.list(), Err(StoreError::Io { op: "read dir", .. })));
    }
}
