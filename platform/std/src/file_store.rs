//! Parameter records kept as one JSON file per namespace, standing in for
//! the controller's flash.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use aquarium_controller::storage::{MemoryStore, ParameterStore, StorageError, StoredParameters};
use log::*;

pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path(&self, namespace: &str) -> PathBuf {
        self.dir.join(format!("{namespace}.json"))
    }

    /// Copy of the stored record of `namespace`, to seed a loop's mirror.
    pub fn mirror(&mut self, namespace: &str) -> MemoryStore {
        let mut mirror = MemoryStore::new();
        match self.load(namespace) {
            Ok(Some(params)) => {
                if let Err(e) = mirror.save(namespace, &params) {
                    warn!("Could not mirror '{}': {}", namespace, e);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Could not read '{}': {}", namespace, e),
        }
        mirror
    }
}

impl ParameterStore for FileStore {
    fn save(&mut self, namespace: &str, params: &StoredParameters) -> Result<(), StorageError> {
        let record = params.encode()?;
        fs::create_dir_all(&self.dir).map_err(|_| StorageError::Unavailable)?;
        fs::write(self.path(namespace), &record).map_err(|_| StorageError::Unavailable)
    }

    fn load(&mut self, namespace: &str) -> Result<Option<StoredParameters>, StorageError> {
        match fs::read(self.path(namespace)) {
            Ok(bytes) => StoredParameters::decode(&bytes).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(_) => Err(StorageError::Unavailable),
        }
    }
}
