/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Blob storage seam. Email/set creation sources raw messages from
//! here by blobId; the in-memory implementation backs tests and
//! single-node deployments.

use ahash::AHashMap;
use async_trait::async_trait;
use parking_lot::Mutex;

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, account_id: &str, blob_id: &str) -> std::io::Result<Option<Vec<u8>>>;
    async fn put(&self, account_id: &str, blob_id: &str, bytes: Vec<u8>) -> std::io::Result<()>;
}

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<AHashMap<(String, String), Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, account_id: &str, blob_id: &str) -> std::io::Result<Option<Vec<u8>>> {
        Ok(self
            .blobs
            .lock()
            .get(&(account_id.to_string(), blob_id.to_string()))
            .cloned())
    }

    async fn put(&self, account_id: &str, blob_id: &str, bytes: Vec<u8>) -> std::io::Result<()> {
        self.blobs
            .lock()
            .insert((account_id.to_string(), blob_id.to_string()), bytes);
        Ok(())
    }
}
