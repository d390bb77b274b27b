//! Manifest Store (C4) and its Tag Index (C5) glue.
//!
//! Manifests are stored verbatim -- the bytes a client pushed are the bytes a
//! client gets back, byte for byte, satisfying §4.4's "round-trips exactly"
//! invariant without a re-serialization step. A small sidecar JSON record next to
//! each manifest carries its media type so `HEAD` doesn't need to parse the body.
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};

use registry_core::registry::{Manifest, ManifestRef, ManifestSpec, ManifestStore};
use registry_core::OciDigest;

use oci_spec::distribution::{TagList, TagListBuilder};
use oci_spec::image::{Descriptor, ImageIndex, MediaType};

use registry_objectstore::{Key, ObjectStore};
use std::sync::Arc;

use crate::errors::{Error, Result};
use crate::pagination::paginate;
use crate::tags::{self, TagCache, TagRecord};

fn digest_hex(digest: &OciDigest) -> String {
    digest
        .to_string()
        .rsplit(':')
        .next()
        .unwrap_or_default()
        .to_string()
}

fn manifest_key(repo: &str, digest: &OciDigest) -> Result<Key> {
    Ok(Key::try_from(
        format!("{repo}/manifests/{}", digest_hex(digest)).as_str(),
    )?)
}

fn manifest_meta_key(repo: &str, digest: &OciDigest) -> Result<Key> {
    Ok(Key::try_from(
        format!("{repo}/manifests/{}.meta", digest_hex(digest)).as_str(),
    )?)
}

/// §3's tag-size rule: sum of `layers[*].size` (an image manifest's own layers; an
/// index has none), falling back to the raw manifest JSON length when there are no
/// layers to sum.
fn tag_size(spec: &ManifestSpec, body_len: u64) -> u64 {
    match spec {
        ManifestSpec::Image(img) => {
            let sum: i64 = img.layers().iter().map(|l| l.size()).sum();
            if sum > 0 {
                sum as u64
            } else {
                body_len
            }
        }
        ManifestSpec::Index(_) => body_len,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestMetaRecord {
    size: u64,
    media_type: Option<String>,
}

pub struct ManifestMeta {
    digest: OciDigest,
    size: u64,
    media_type: Option<MediaType>,
}

impl Manifest for ManifestMeta {
    fn bytes_on_disk(&self) -> u64 {
        self.size
    }
    fn digest(&self) -> &OciDigest {
        &self.digest
    }
    fn media_type(&self) -> &Option<MediaType> {
        &self.media_type
    }
}

#[derive(Clone)]
pub struct ManifestStoreImpl {
    pub(crate) repo: String,
    pub(crate) objects: Arc<dyn ObjectStore>,
    pub(crate) tag_cache: TagCache,
}

impl ManifestStoreImpl {
    async fn resolve(&self, key: &ManifestRef) -> Result<Option<OciDigest>> {
        match key {
            ManifestRef::Digest(d) => Ok(Some(d.clone())),
            ManifestRef::Tag(t) => {
                match tags::get(self.objects.as_ref(), &self.repo, t, &self.tag_cache).await? {
                    Some(record) => Ok(Some(OciDigest::try_from(record.digest.as_str())?)),
                    None => Ok(None),
                }
            }
        }
    }

    async fn read_meta(&self, digest: &OciDigest) -> Result<Option<ManifestMetaRecord>> {
        let key = manifest_meta_key(&self.repo, digest)?;
        match self.objects.get(&key).await {
            Ok(body) => {
                let bytes = crate::read_all(body).await?;
                Ok(Some(serde_json::from_slice(&bytes)?))
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

type TryBytes = std::result::Result<Bytes, Box<dyn std::error::Error + Send + Sync>>;

#[async_trait]
impl ManifestStore for ManifestStoreImpl {
    type Manifest = ManifestMeta;
    type Error = Error;
    type ManifestBody = futures::stream::BoxStream<'static, TryBytes>;

    async fn head(&self, key: &ManifestRef) -> std::result::Result<Option<ManifestMeta>, Error> {
        let Some(digest) = self.resolve(key).await? else {
            return Ok(None);
        };
        let Some(meta) = self.read_meta(&digest).await? else {
            return Ok(None);
        };
        Ok(Some(ManifestMeta {
            digest,
            size: meta.size,
            media_type: meta.media_type.map(|m| m.as_str().into()),
        }))
    }

    async fn get(
        &self,
        key: &ManifestRef,
    ) -> std::result::Result<Option<(ManifestMeta, Self::ManifestBody)>, Error> {
        let Some(digest) = self.resolve(key).await? else {
            return Ok(None);
        };
        let Some(meta) = self.read_meta(&digest).await? else {
            return Ok(None);
        };
        let body_key = manifest_key(&self.repo, &digest)?;
        let body = self.objects.get(&body_key).await?;
        let mapped = body.map(|r| r.map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>));
        Ok(Some((
            ManifestMeta {
                digest,
                size: meta.size,
                media_type: meta.media_type.map(|m| m.as_str().into()),
            },
            mapped.boxed(),
        )))
    }

    async fn put(
        &mut self,
        key: &ManifestRef,
        spec: &ManifestSpec,
        bytes: Bytes,
    ) -> std::result::Result<OciDigest, Error> {
        let digest: OciDigest = bytes.as_ref().try_into().map_err(Error::Core)?;

        match spec {
            ManifestSpec::Image(img) => {
                for layer in img.layers() {
                    let layer_digest = OciDigest::try_from(layer.digest().as_str())
                        .map_err(Error::Core)?;
                    let blob_path = Key::try_from(
                        format!("{}/blobs/{}", self.repo, layer_digest.blob_path_component())
                            .as_str(),
                    )?;
                    if !self.objects.exists(&blob_path).await? {
                        return Err(Error::ManifestBlobUnknown(layer.digest().clone()));
                    }
                }
            }
            ManifestSpec::Index(idx) => {
                for member in idx.manifests() {
                    let member_digest = OciDigest::try_from(member.digest().as_str())
                        .map_err(Error::Core)?;
                    let member_path = manifest_key(&self.repo, &member_digest)?;
                    if !self.objects.exists(&member_path).await? {
                        return Err(Error::ManifestBlobUnknown(member.digest().clone()));
                    }
                }
            }
        }

        let body_key = manifest_key(&self.repo, &digest)?;
        let len = bytes.len() as u64;
        self.objects
            .put(&body_key, hyper::body::Body::from(bytes), len)
            .await?;

        let meta_key = manifest_meta_key(&self.repo, &digest)?;
        let meta = ManifestMetaRecord {
            size: len,
            media_type: spec.media_type().map(|m| m.to_string()),
        };
        let meta_bytes = serde_json::to_vec(&meta)?;
        let meta_len = meta_bytes.len() as u64;
        self.objects
            .put(&meta_key, hyper::body::Body::from(meta_bytes), meta_len)
            .await?;

        if let ManifestRef::Tag(t) = key {
            tags::put(
                self.objects.as_ref(),
                &self.repo,
                t,
                TagRecord {
                    digest: digest.to_string(),
                    media_type: meta.media_type.clone(),
                    size: tag_size(spec, len),
                },
                &self.tag_cache,
            )
            .await?;
        }

        Ok(digest)
    }

    async fn delete(&mut self, key: &ManifestRef) -> std::result::Result<(), Error> {
        let digest = self
            .resolve(key)
            .await?
            .ok_or(Error::ManifestUnknown(None))?;

        tags::delete_all_pointing_at(
            self.objects.as_ref(),
            &self.repo,
            &digest.to_string(),
            &self.tag_cache,
        )
        .await?;

        self.objects.delete(&manifest_key(&self.repo, &digest)?).await?;
        self.objects
            .delete(&manifest_meta_key(&self.repo, &digest)?)
            .await?;
        Ok(())
    }

    async fn get_referrers(
        &self,
        subject: &OciDigest,
        artifact_type: Option<String>,
    ) -> std::result::Result<ImageIndex, Error> {
        let mut index = ImageIndex::default();
        index.set_media_type(Some(MediaType::ImageIndex));

        let prefix = Key::try_from(format!("{}/manifests/", self.repo).as_str())?;
        let entries = self.objects.list(&prefix).await?;

        let mut descriptors = Vec::new();
        for entry in entries {
            if entry.contains("/tags/") || entry.ends_with(".meta") {
                continue;
            }
            let Ok(key) = Key::try_from(entry.as_str()) else {
                continue;
            };
            let Ok(body) = self.objects.get(&key).await else {
                continue;
            };
            let Ok(bytes) = crate::read_all(body).await else {
                continue;
            };
            let Ok(spec) = ManifestSpec::try_from(&bytes) else {
                continue;
            };
            let Some(subj) = spec.subject() else {
                continue;
            };
            if subj.digest().as_str() != subject.to_string() {
                continue;
            }
            if let Some(wanted) = &artifact_type {
                if spec.artifact_type().map(|m| m.to_string()).as_ref() != Some(wanted) {
                    continue;
                }
            }
            let digest: OciDigest = bytes.as_ref().try_into().map_err(Error::Core)?;
            let digest_string = digest.to_string();
            let media_type = spec.media_type().unwrap_or(MediaType::ImageManifest);
            let mut descriptor = Descriptor::new(media_type, bytes.len() as i64, &digest_string);
            descriptor.set_artifact_type(spec.artifact_type());
            descriptor.set_annotations(spec.annotations());
            descriptors.push(descriptor);
        }

        descriptors.sort_unstable_by(|a, b| a.digest().cmp(b.digest()));
        index.set_manifests(descriptors);
        Ok(index)
    }

    async fn get_tags(
        &self,
        n: Option<i64>,
        last: Option<String>,
    ) -> std::result::Result<(TagList, bool), Error> {
        tags::ensure_loaded(self.objects.as_ref(), &self.repo, &self.tag_cache).await?;
        let all = tags::list(&self.tag_cache).await;
        let (page, has_more) = paginate(all, n, last);
        let list = TagListBuilder::default()
            .name(self.repo.as_str())
            .tags(page)
            .build()
            .map_err(|e| Error::ManifestInvalid(Some(e.to_string())))?;
        Ok((list, has_more))
    }
}
