//! A file-backed [`ConfigSource`], grounded on the teacher's
//! `monolake::config::manager::StaticFileConfigManager::watch` loop shape: re-read the file
//! and hand whatever it contains to `submit` on every tick.

use std::path::PathBuf;

use crate::runner::ConfigSource;

pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait::async_trait]
impl ConfigSource for FileConfigSource {
    async fn load(&self) -> anyhow::Result<dispatch_core::snapshot::ConfigSnapshot> {
        dispatch_core::config::load(&self.path).await
    }
}
