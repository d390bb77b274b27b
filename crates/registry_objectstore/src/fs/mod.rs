//! Filesystem [`ObjectStore`] driver: objects live at `<root>/<key>`, chunked
//! uploads accumulate in a scratch file at `<root>/<session-key>` -- the caller
//! scopes the session key to a repository (`<repo>/uploads/<uuid>`, per the
//! persisted-state layout) -- and are renamed into place on finalize so a reader
//! never observes a partially-written object.
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::StreamExt;
use hyper::body::{Body, HttpBody};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;

use super::errors::{Error, Result};
use super::{Chunk, Key, Metadata, ObjectBody, ObjectStore};

#[derive(Clone, Deserialize)]
pub struct FsConfig {
    pub root: PathBuf,
}

impl FsConfig {
    pub async fn new_objects(&self) -> Result<Fs> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(Fs {
            root: self.root.clone(),
        })
    }
}

#[derive(Clone)]
pub struct Fs {
    root: PathBuf,
}

impl Fs {
    fn path(&self, key: &Key) -> PathBuf {
        self.root.join(key.as_path())
    }

    fn scratch_path(&self, session_key: &Key) -> PathBuf {
        self.path(session_key)
    }
}

fn map_io_err(e: std::io::Error, path: &Path) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::NotFound(path.display().to_string())
    } else {
        Error::Io(e)
    }
}

#[async_trait]
impl ObjectStore for Fs {
    async fn get(&self, key: &Key) -> Result<ObjectBody> {
        let path = self.path(key);
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| map_io_err(e, &path))?;
        Ok(FileBody::new(file).boxed())
    }

    async fn exists(&self, key: &Key) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path(key)).await?)
    }

    async fn stat(&self, key: &Key) -> Result<Metadata> {
        let path = self.path(key);
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| map_io_err(e, &path))?;
        Ok(Metadata {
            size: meta.len(),
            modified: meta.modified().ok(),
        })
    }

    /// Returns full, root-relative keys for every file reachable under `prefix`.
    async fn list(&self, prefix: &Key) -> Result<Vec<String>> {
        let dir = self.path(prefix);
        let mut out = Vec::new();
        let mut stack = vec![dir.clone()];
        while let Some(d) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&d).await {
                Ok(e) => e,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(Error::Io(e)),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if let Ok(rel) = path.strip_prefix(&self.root) {
                    out.push(rel.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/"));
                }
            }
        }
        Ok(out)
    }

    async fn put(&self, key: &Key, mut body: Body, _content_length: u64) -> Result<()> {
        let path = self.path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("tmp-upload");
        let mut file = tokio::fs::File::create(&tmp).await?;
        while let Some(chunk) = body.data().await {
            let chunk = chunk.map_err(|e| Error::NotFound(e.to_string()))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn delete(&self, key: &Key) -> Result<()> {
        let path = self.path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn copy(&self, src: &Key, dest: &Key) -> Result<()> {
        let src_path = self.path(src);
        let dest_path = self.path(dest);
        if let Some(parent) = dest_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&src_path, &dest_path)
            .await
            .map_err(|e| map_io_err(e, &src_path))?;
        Ok(())
    }

    async fn initiate_chunked_upload(&self, session_key: &Key) -> Result<String> {
        let path = self.scratch_path(session_key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::File::create(&path).await?;
        Ok(session_key.to_string())
    }

    async fn upload_chunk(
        &self,
        _upload_id: &str,
        session_key: &Key,
        chunk_number: i32,
        _content_length: u64,
        mut body: Body,
    ) -> Result<Chunk> {
        let path = self.scratch_path(session_key);
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .map_err(|e| map_io_err(e, &path))?;
        while let Some(chunk) = body.data().await {
            let chunk = chunk.map_err(|e| Error::NotFound(e.to_string()))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(Chunk {
            e_tag: None,
            chunk_number,
        })
    }

    async fn finalize_chunked_upload(
        &self,
        _upload_id: &str,
        session_key: &Key,
        _chunks: Vec<Chunk>,
        key: &Key,
    ) -> Result<()> {
        let scratch = self.scratch_path(session_key);
        let dest = self.path(key);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(&scratch, &dest).await?;
        Ok(())
    }

    async fn abort_chunked_upload(&self, _upload_id: &str, session_key: &Key) -> Result<()> {
        let path = self.scratch_path(session_key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

/// Streams a [`tokio::fs::File`] out as fixed-size [`Bytes`] chunks.
struct FileBody {
    file: tokio::fs::File,
    buf: Box<[u8; 64 * 1024]>,
}

impl FileBody {
    fn new(file: tokio::fs::File) -> Self {
        Self {
            file,
            buf: Box::new([0u8; 64 * 1024]),
        }
    }
}

impl futures::stream::Stream for FileBody {
    type Item = Result<Bytes>;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        use tokio::io::AsyncRead;

        let this = self.get_mut();
        let mut read_buf = tokio::io::ReadBuf::new(this.buf.as_mut());
        match std::pin::Pin::new(&mut this.file).poll_read(cx, &mut read_buf) {
            std::task::Poll::Ready(Ok(())) => {
                let n = read_buf.filled().len();
                if n == 0 {
                    std::task::Poll::Ready(None)
                } else {
                    std::task::Poll::Ready(Some(Ok(Bytes::copy_from_slice(read_buf.filled()))))
                }
            }
            std::task::Poll::Ready(Err(e)) => std::task::Poll::Ready(Some(Err(Error::Io(e)))),
            std::task::Poll::Pending => std::task::Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream::TryStreamExt;

    async fn fs_store() -> Fs {
        let dir = std::env::temp_dir().join(format!("registry-fs-test-{}", uuid::Uuid::new_v4()));
        FsConfig { root: dir }.new_objects().await.unwrap()
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = fs_store().await;
        let key = Key::try_from("sha256/sha256:abc").unwrap();
        store.put(&key, Body::from("hello world"), 11).await.unwrap();
        assert!(store.exists(&key).await.unwrap());

        let body = store.get(&key).await.unwrap();
        let bytes: Vec<u8> = body
            .try_fold(Vec::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await
            .unwrap();
        assert_eq!(bytes, b"hello world");
    }

    #[tokio::test]
    async fn chunked_upload_finalizes_via_rename() {
        let store = fs_store().await;
        let uuid = uuid::Uuid::new_v4();
        let session_key = Key::try_from(format!("acme/web/uploads/{uuid}").as_str()).unwrap();
        let upload_id = store.initiate_chunked_upload(&session_key).await.unwrap();

        store
            .upload_chunk(&upload_id, &session_key, 1, 5, Body::from("hello"))
            .await
            .unwrap();
        store
            .upload_chunk(&upload_id, &session_key, 2, 5, Body::from("world"))
            .await
            .unwrap();

        let dest = Key::try_from("sha256/sha256:final").unwrap();
        store
            .finalize_chunked_upload(&upload_id, &session_key, vec![], &dest)
            .await
            .unwrap();

        assert!(store.exists(&dest).await.unwrap());
        assert!(!store.exists(&session_key).await.unwrap());
    }

    #[tokio::test]
    async fn list_and_usage_walk_nested_prefix() {
        let store = fs_store().await;
        for name in ["acme/web/manifests/tags/latest", "acme/web/manifests/tags/v1.0.0"] {
            let key = Key::try_from(name).unwrap();
            store.put(&key, Body::from("{}"), 2).await.unwrap();
        }
        let listed = store
            .list(&Key::try_from("acme/web/manifests/tags").unwrap())
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);

        let usage = store
            .usage(&Key::try_from("acme/web/manifests/tags").unwrap())
            .await
            .unwrap();
        assert_eq!(usage.count, 2);
        assert_eq!(usage.bytes, 4);
    }
}
