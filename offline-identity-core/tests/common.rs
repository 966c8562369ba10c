//! Common test utilities shared across integration tests.
#![allow(missing_docs, dead_code)]

use std::path::Path;
use std::sync::Arc;

use offline_identity_core::{
    CredentialPersistence, FileStore, IdentityRecord, KdfParams, KeyValueStore, MemoryStore,
    PasswordCodec,
};

pub fn codec() -> Arc<PasswordCodec> {
    codec_with(KdfParams::testing())
}

pub fn codec_with(kdf: KdfParams) -> Arc<PasswordCodec> {
    Arc::new(PasswordCodec::new(kdf).expect("codec"))
}

pub fn memory_persistence() -> (Arc<MemoryStore>, CredentialPersistence) {
    let store = Arc::new(MemoryStore::new());
    let persistence = CredentialPersistence::new(store.clone(), codec());
    (store, persistence)
}

pub fn file_persistence(path: &Path) -> CredentialPersistence {
    file_persistence_with(path, KdfParams::testing())
}

pub fn file_persistence_with(path: &Path, kdf: KdfParams) -> CredentialPersistence {
    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(path).expect("open store"));
    CredentialPersistence::new(store, codec_with(kdf))
}

pub fn unauthenticated(user_name: &str, password: &str) -> IdentityRecord {
    IdentityRecord::new(user_name)
        .expect("record")
        .with_password(password)
}
