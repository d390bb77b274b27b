//! Blob Store (C1/C2) and Upload Session Manager (C3).
//!
//! Monolithic puts and the final step of a chunked upload both funnel through
//! [`verify_and_promote`]: content lands at a scratch key first, gets read back and
//! stream-hashed, and only a digest match makes it visible at its content-addressed
//! path. A mismatch leaves no trace under the blob's digest (§4.2 invariant 4).
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::StreamExt;
use hyper::body::Body;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use registry_core::registry::{Blob, BlobStore, BlobWriter, UploadSession, UploadSessionStore};
use registry_core::{ChunkedBody, Digester, OciDigest};

use registry_objectstore::{Chunk as StoreChunk, Key, ObjectStore};

use crate::errors::{Error, Result};

fn blob_key(repo: &str, digest: &OciDigest) -> Result<Key> {
    Ok(Key::try_from(
        format!("{repo}/blobs/{}", digest.blob_path_component()).as_str(),
    )?)
}

fn scratch_key(repo: &str, uuid: &Uuid) -> Result<Key> {
    Ok(Key::try_from(format!("_scratch/{repo}/{uuid}").as_str())?)
}

/// Scratch path for a chunked upload session, `<repo>/uploads/<uuid>` per §6's
/// documented persisted-state layout. Passed through to `ObjectStore` as the
/// session key so every driver -- a filesystem scratch file, an S3 multipart
/// upload -- lands its in-progress bytes scoped to the owning repository, the
/// same way the monolithic-push scratch key above already is.
fn session_key(repo: &str, uuid: &Uuid) -> Result<Key> {
    Ok(Key::try_from(format!("{repo}/uploads/{uuid}").as_str())?)
}

/// Read `scratch` back, hash it, and on a match with `digest` move it to `dest` and
/// drop the scratch copy. On mismatch the scratch copy is still dropped but `dest`
/// is never touched.
async fn verify_and_promote(
    objects: &dyn ObjectStore,
    scratch: &Key,
    digest: &OciDigest,
    dest: &Key,
) -> Result<u64> {
    let body = objects.get(scratch).await?;
    let mut digester = Digester::default();
    let mut stream = body;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        digester.update(&chunk);
    }
    let bytes = digester.bytes();
    let computed = digester.finalize();

    if &computed != digest {
        objects.delete(scratch).await?;
        return Err(Error::DigestMismatch {
            asserted: digest.to_string(),
            computed: computed.to_string(),
        });
    }

    objects.copy(scratch, dest).await?;
    objects.delete(scratch).await?;
    Ok(bytes)
}

struct SessionState {
    repo: String,
    upload_id: Option<String>,
    offset: u64,
    chunks: Vec<StoreChunk>,
}

#[derive(Clone, Default)]
pub struct UploadSessionTable {
    inner: Arc<RwLock<HashMap<Uuid, Arc<Mutex<SessionState>>>>>,
}

impl UploadSessionTable {
    async fn get(&self, uuid: &Uuid) -> Option<Arc<Mutex<SessionState>>> {
        self.inner.read().await.get(uuid).cloned()
    }

    async fn insert(&self, uuid: Uuid, state: SessionState) {
        self.inner
            .write()
            .await
            .insert(uuid, Arc::new(Mutex::new(state)));
    }

    async fn remove(&self, uuid: &Uuid) -> Option<Arc<Mutex<SessionState>>> {
        self.inner.write().await.remove(uuid)
    }
}

#[derive(Debug, Clone)]
pub struct UploadSessionSnapshot {
    uuid: Uuid,
    upload_id: Option<String>,
    last_range_end: i64,
}

impl UploadSession for UploadSessionSnapshot {
    fn uuid(&self) -> &Uuid {
        &self.uuid
    }
    fn upload_id(&self) -> &Option<String> {
        &self.upload_id
    }
    fn last_range_end(&self) -> i64 {
        self.last_range_end
    }
}

fn snapshot(uuid: Uuid, state: &SessionState) -> UploadSessionSnapshot {
    UploadSessionSnapshot {
        uuid,
        upload_id: state.upload_id.clone(),
        last_range_end: if state.offset == 0 {
            -1
        } else {
            state.offset as i64 - 1
        },
    }
}

#[derive(Clone)]
pub struct UploadSessionStoreImpl {
    pub(crate) repo: String,
    pub(crate) objects: Arc<dyn ObjectStore>,
    pub(crate) sessions: UploadSessionTable,
}

#[async_trait]
impl UploadSessionStore for UploadSessionStoreImpl {
    type UploadSession = UploadSessionSnapshot;
    type Error = Error;

    async fn new_upload_session(&self) -> std::result::Result<UploadSessionSnapshot, Error> {
        let uuid = Uuid::new_v4();
        let state = SessionState {
            repo: self.repo.clone(),
            upload_id: None,
            offset: 0,
            chunks: Vec::new(),
        };
        let snap = snapshot(uuid, &state);
        self.sessions.insert(uuid, state).await;
        Ok(snap)
    }

    async fn get_upload_session(
        &self,
        session_uuid: &Uuid,
    ) -> std::result::Result<UploadSessionSnapshot, Error> {
        let arc = self
            .sessions
            .get(session_uuid)
            .await
            .ok_or_else(|| Error::UploadUnknown(Some(session_uuid.to_string())))?;
        let state = arc.lock().await;
        if state.repo != self.repo {
            return Err(Error::UploadUnknown(Some(session_uuid.to_string())));
        }
        Ok(snapshot(*session_uuid, &state))
    }

    async fn delete_session(&self, session_uuid: &Uuid) -> std::result::Result<(), Error> {
        if let Some(arc) = self.sessions.remove(session_uuid).await {
            let state = arc.lock().await;
            if let Some(upload_id) = &state.upload_id {
                let key = session_key(&self.repo, session_uuid)?;
                self.objects.abort_chunked_upload(upload_id, &key).await?;
            }
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct BlobStoreImpl {
    pub(crate) repo: String,
    pub(crate) objects: Arc<dyn ObjectStore>,
    pub(crate) sessions: UploadSessionTable,
}

pub struct BlobImpl {
    size: u64,
}

impl Blob for BlobImpl {
    fn bytes_on_disk(&self) -> u64 {
        self.size
    }
}

#[async_trait]
impl BlobStore for BlobStoreImpl {
    type BlobWriter = BlobWriterImpl;
    type Error = Error;
    type UploadSession = UploadSessionSnapshot;
    type Blob = BlobImpl;
    type BlobBody =
        futures::stream::BoxStream<'static, std::result::Result<bytes::Bytes, Box<dyn std::error::Error + Send + Sync>>>;

    async fn head(&self, key: &OciDigest) -> std::result::Result<Option<BlobImpl>, Error> {
        let path = blob_key(&self.repo, key)?;
        match self.objects.stat(&path).await {
            Ok(meta) => Ok(Some(BlobImpl { size: meta.size })),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(
        &self,
        key: &OciDigest,
    ) -> std::result::Result<Option<(BlobImpl, Self::BlobBody)>, Error> {
        let path = blob_key(&self.repo, key)?;
        let meta = match self.objects.stat(&path).await {
            Ok(meta) => meta,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let body = self.objects.get(&path).await?;
        let mapped = body.map(|r| r.map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>));
        Ok(Some((BlobImpl { size: meta.size }, mapped.boxed())))
    }

    async fn put(
        &mut self,
        digest: &OciDigest,
        content_length: u64,
        body: Body,
    ) -> std::result::Result<Uuid, Error> {
        let uuid = Uuid::new_v4();
        let scratch = scratch_key(&self.repo, &uuid)?;
        self.objects.put(&scratch, body, content_length).await?;
        let dest = blob_key(&self.repo, digest)?;
        verify_and_promote(self.objects.as_ref(), &scratch, digest, &dest).await?;
        Ok(uuid)
    }

    async fn delete(&mut self, digest: &OciDigest) -> std::result::Result<(), Error> {
        let path = blob_key(&self.repo, digest)?;
        self.objects.delete(&path).await?;
        Ok(())
    }

    async fn resume(
        &self,
        session_uuid: &Uuid,
        start: Option<u64>,
    ) -> std::result::Result<BlobWriterImpl, Error> {
        let arc = self
            .sessions
            .get(session_uuid)
            .await
            .ok_or_else(|| Error::UploadUnknown(Some(session_uuid.to_string())))?;
        {
            let mut state = arc.lock().await;
            if state.repo != self.repo {
                return Err(Error::UploadUnknown(Some(session_uuid.to_string())));
            }
            if let Some(start) = start {
                if start != state.offset {
                    return Err(Error::OffsetMismatch {
                        expected: state.offset,
                        actual: start,
                    });
                }
            }
            if state.upload_id.is_none() {
                let key = session_key(&self.repo, session_uuid)?;
                let upload_id = self.objects.initiate_chunked_upload(&key).await?;
                state.upload_id = Some(upload_id);
            }
        }
        Ok(BlobWriterImpl {
            repo: self.repo.clone(),
            objects: self.objects.clone(),
            sessions: self.sessions.clone(),
            uuid: *session_uuid,
        })
    }

    async fn mount(
        &mut self,
        digest: &OciDigest,
        source_repository: &str,
    ) -> std::result::Result<bool, Error> {
        let source = blob_key(source_repository, digest)?;
        if !self.objects.exists(&source).await? {
            return Ok(false);
        }
        let dest = blob_key(&self.repo, digest)?;
        self.objects.copy(&source, &dest).await?;
        Ok(true)
    }
}

pub struct BlobWriterImpl {
    repo: String,
    objects: Arc<dyn ObjectStore>,
    sessions: UploadSessionTable,
    uuid: Uuid,
}

#[async_trait]
impl BlobWriter for BlobWriterImpl {
    type Error = Error;
    type UploadSession = UploadSessionSnapshot;

    async fn write(
        self,
        content_length: u64,
        body: Body,
    ) -> std::result::Result<UploadSessionSnapshot, Error> {
        let arc = self
            .sessions
            .get(&self.uuid)
            .await
            .ok_or_else(|| Error::UploadUnknown(Some(self.uuid.to_string())))?;
        let mut state = arc.lock().await;
        let upload_id = state
            .upload_id
            .clone()
            .ok_or(Error::BlobWriterFinished)?;
        let key = session_key(&self.repo, &self.uuid)?;
        let chunk_number = state.chunks.len() as i32 + 1;
        let chunk = self
            .objects
            .upload_chunk(&upload_id, &key, chunk_number, content_length, body)
            .await?;
        state.chunks.push(chunk);
        state.offset += content_length;
        Ok(snapshot(self.uuid, &state))
    }

    async fn write_chunked(
        self,
        body: Body,
    ) -> std::result::Result<UploadSessionSnapshot, Error> {
        let arc = self
            .sessions
            .get(&self.uuid)
            .await
            .ok_or_else(|| Error::UploadUnknown(Some(self.uuid.to_string())))?;
        let mut state = arc.lock().await;
        let upload_id = state
            .upload_id
            .clone()
            .ok_or(Error::BlobWriterFinished)?;
        let key = session_key(&self.repo, &self.uuid)?;

        let mut rechunked = ChunkedBody::from_body(body);
        while let Some(next) = rechunked.next().await {
            let bytes = next.map_err(|e| Error::Core(registry_core::Error::BackendError(e.to_string())))?;
            let chunk_number = state.chunks.len() as i32 + 1;
            let len = bytes.len() as u64;
            let chunk = self
                .objects
                .upload_chunk(&upload_id, &key, chunk_number, len, Body::from(bytes))
                .await?;
            state.chunks.push(chunk);
            state.offset += len;
        }
        Ok(snapshot(self.uuid, &state))
    }

    async fn finalize(
        self,
        digest: &OciDigest,
    ) -> std::result::Result<UploadSessionSnapshot, Error> {
        let arc = self
            .sessions
            .remove(&self.uuid)
            .await
            .ok_or_else(|| Error::UploadUnknown(Some(self.uuid.to_string())))?;
        let state = arc.lock().await;
        let upload_id = state
            .upload_id
            .clone()
            .ok_or(Error::BlobWriterFinished)?;
        let key = session_key(&self.repo, &self.uuid)?;
        let scratch = scratch_key(&self.repo, &self.uuid)?;

        self.objects
            .finalize_chunked_upload(&upload_id, &key, state.chunks.clone(), &scratch)
            .await?;

        let dest = blob_key(&self.repo, digest)?;
        verify_and_promote(self.objects.as_ref(), &scratch, digest, &dest).await?;

        Ok(UploadSessionSnapshot {
            uuid: self.uuid,
            upload_id: state.upload_id.clone(),
            last_range_end: state.offset as i64 - 1,
        })
    }
}
