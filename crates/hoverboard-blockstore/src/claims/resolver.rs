use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use hoverboard_formats::archive::decode_archive;
use hoverboard_formats::{ArchiveId, Block, FormatError, Link, codec};
use reqwest::header::ACCEPT;
use tracing::{debug, warn};
use url::Url;

use super::{ARCHIVE_MEDIA_TYPE, Claim, LocationClaim, RelationClaim, RelationPart};
use crate::error::{BlockstoreError, Result};
use crate::index_map::IndexMap;
use crate::metrics::{Metrics, Tier};
use crate::range_reader::RangeArchiveReader;
use crate::stream::ArchiveBlockStream;
use crate::traits::{Blockstore, ClaimsClient, ObjectStore};
use crate::transport::{HttpTransport, status_error};

/// Resolves blocks from content claims
///
/// Claims are processed in the order the service returns them and the first
/// one that yields a block wins. Index state gathered from relation claims
/// lives only for the duration of one [`resolve`](Self::resolve) call.
pub struct ClaimsResolver {
    client: Arc<dyn ClaimsClient>,
    store: Arc<dyn ObjectStore>,
    http: HttpTransport,
    service_url: Option<Url>,
    metrics: Metrics,
}

impl ClaimsResolver {
    /// Resolver reading claims through `client`; `store` holds the archives named by relation claims
    pub fn new(
        client: Arc<dyn ClaimsClient>,
        store: Arc<dyn ObjectStore>,
        http: HttpTransport,
        metrics: Metrics,
    ) -> Self {
        Self {
            client,
            store,
            http,
            service_url: None,
            metrics,
        }
    }

    /// Read claims from `url` instead of the client's default service
    #[must_use]
    pub fn with_service_url(mut self, url: Option<Url>) -> Self {
        self.service_url = url;
        self
    }

    /// Resolve `link`, failing with `NotFound` when no claim yields it
    pub async fn resolve(&self, link: &Link) -> Result<Block> {
        let claims = self.client.read(link, self.service_url.as_ref()).await?;
        debug!(%link, count = claims.len(), "Read content claims");

        for claim in &claims {
            let found = match claim {
                Claim::Location(claim) => self.resolve_location(link, claim).await?,
                Claim::Relation(claim) => self.resolve_relation(link, claim).await?,
                Claim::Unknown => None,
            };
            if let Some(block) = found {
                self.metrics.record(Tier::Claims, block.bytes.len());
                return Ok(block);
            }
        }

        Err(BlockstoreError::not_found(link))
    }

    async fn resolve_location(&self, link: &Link, claim: &LocationClaim) -> Result<Option<Block>> {
        for url in &claim.location {
            match self.fetch_first_block(url).await {
                Ok(Some(block)) if block.link.multihash() != link.multihash() => {
                    warn!(%link, %url, got = %block.link, "Location served a different block");
                }
                Ok(Some(block)) => {
                    debug!(%link, %url, "Resolved from location claim");
                    return Ok(Some(Block {
                        link: *link,
                        bytes: block.bytes,
                    }));
                }
                Ok(None) => debug!(%link, %url, "Location returned an empty archive"),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(%link, %url, error = %e, "Location fetch failed"),
            }
        }
        Ok(None)
    }

    async fn fetch_first_block(&self, url: &Url) -> Result<Option<Block>> {
        let response = self
            .http
            .inner()
            .get(url.clone())
            .header(ACCEPT, ARCHIVE_MEDIA_TYPE)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, response.headers()));
        }

        let body = response
            .bytes_stream()
            .map_err(BlockstoreError::from)
            .boxed();
        ArchiveBlockStream::new(body).next_block().await
    }

    async fn resolve_relation(&self, link: &Link, claim: &RelationClaim) -> Result<Option<Block>> {
        let mut index = IndexMap::new();
        let mut secondaries: HashMap<ArchiveId, Vec<Block>> = HashMap::new();

        for part in &claim.parts {
            let Some(index_block) = self.find_index(claim, part, &mut secondaries).await? else {
                continue;
            };

            if index_block.link.codec() != codec::MULTIHASH_INDEX_SORTED {
                return Err(FormatError::UnexpectedCodec {
                    expected: codec::MULTIHASH_INDEX_SORTED,
                    actual: index_block.link.codec(),
                }
                .into());
            }

            let origin = ArchiveId::from_multihash(*part.content.multihash());
            let added = index.add_sorted_index(origin, &index_block.bytes)?;
            debug!(%link, part = %part.content, added, "Indexed relation part");

            if index.contains(link) {
                let reader = RangeArchiveReader::new(self.store.as_ref(), &index);
                return match reader.get_block(link).await {
                    Ok(block) => Ok(Some(block)),
                    // The first indexed location is final for this claim.
                    Err(BlockstoreError::NotFound(key)) => {
                        warn!(%link, %key, "Indexed archive missing, trying next claim");
                        Ok(None)
                    }
                    Err(e) => Err(e),
                };
            }
        }
        Ok(None)
    }

    /// Locate the index block of `part`
    ///
    /// Exported blocks are searched first, then each secondary archive in
    /// turn. A secondary is fetched at most once per resolution.
    async fn find_index(
        &self,
        claim: &RelationClaim,
        part: &RelationPart,
        secondaries: &mut HashMap<ArchiveId, Vec<Block>>,
    ) -> Result<Option<Block>> {
        if part.content.codec() != codec::CAR {
            debug!(part = %part.content, "Skipping non-archive part");
            return Ok(None);
        }
        let Some(includes) = &part.includes else {
            debug!(part = %part.content, "Skipping part without index");
            return Ok(None);
        };

        if let Some(block) = claim.exported_block(&includes.content) {
            return Ok(Some(block.clone()));
        }

        for secondary in &includes.parts {
            let id = ArchiveId::from_multihash(*secondary.multihash());
            if !secondaries.contains_key(&id) {
                let blocks = self.fetch_archive(&id).await?;
                secondaries.insert(id, blocks);
            }
            let found = secondaries.get(&id).and_then(|blocks| {
                blocks
                    .iter()
                    .find(|b| b.link.multihash() == includes.content.multihash())
            });
            if let Some(block) = found {
                return Ok(Some(block.clone()));
            }
        }

        warn!(part = %part.content, index = %includes.content, "Index block not found");
        Ok(None)
    }

    async fn fetch_archive(&self, id: &ArchiveId) -> Result<Vec<Block>> {
        let key = id.storage_key();
        match self.store.get_bytes(&key, None).await? {
            Some(bytes) => Ok(decode_archive(bytes)?),
            None => {
                warn!(%key, "Secondary archive missing");
                Ok(Vec::new())
            }
        }
    }
}

#[async_trait]
impl Blockstore for ClaimsResolver {
    /// True when any claim exists; says nothing about retrievability
    async fn has(&self, link: &Link) -> Result<bool> {
        let claims = self.client.read(link, self.service_url.as_ref()).await?;
        Ok(!claims.is_empty())
    }

    async fn get(&self, link: &Link) -> Result<Option<Bytes>> {
        match self.resolve(link).await {
            Ok(block) => Ok(Some(block.bytes)),
            Err(BlockstoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::claims::Inclusion;
    use crate::store::MemoryObjectStore;
    use hoverboard_formats::archive::ArchiveWriter;
    use hoverboard_formats::index::SortedIndexBuilder;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct StaticClaims {
        claims: Vec<Claim>,
        service_urls: Mutex<Vec<Option<Url>>>,
    }

    #[async_trait]
    impl ClaimsClient for StaticClaims {
        async fn read(&self, _link: &Link, service_url: Option<&Url>) -> Result<Vec<Claim>> {
            self.service_urls.lock().push(service_url.cloned());
            Ok(self.claims.clone())
        }
    }

    fn block(data: &[u8]) -> Block {
        Block::new(Link::sha2_256(codec::RAW, data).unwrap(), data.to_vec())
    }

    fn resolver(claims: Vec<Claim>, store: Arc<MemoryObjectStore>) -> (ClaimsResolver, Metrics) {
        let client = Arc::new(StaticClaims {
            claims,
            ..Default::default()
        });
        let metrics = Metrics::new().unwrap();
        let resolver = ClaimsResolver::new(
            client,
            store,
            HttpTransport::new(Duration::from_secs(5)).unwrap(),
            metrics.clone(),
        );
        (resolver, metrics)
    }

    /// Archive of `blocks` stored under its canonical key, with its index
    fn indexed_archive(store: &MemoryObjectStore, blocks: &[Block]) -> (Link, Block) {
        let mut writer = ArchiveWriter::new(&[]);
        let mut builder = SortedIndexBuilder::new();
        for b in blocks {
            let offset = writer.push(&b.link, &b.bytes);
            builder.insert(*b.link.multihash(), offset);
        }
        let data = writer.finish();
        let id = ArchiveId::for_bytes(&data).unwrap();
        store.insert(id.storage_key(), data);

        let index = builder.build();
        let index_link = Link::sha2_256(codec::MULTIHASH_INDEX_SORTED, &index).unwrap();
        (*id.link(), Block::new(index_link, index))
    }

    fn relation(target: &Link, archive: Link, index: &Block, inline: bool) -> Claim {
        Claim::Relation(RelationClaim {
            content: *target,
            children: Vec::new(),
            parts: vec![RelationPart {
                content: archive,
                includes: Some(Inclusion {
                    content: index.link,
                    parts: Vec::new(),
                }),
            }],
            blocks: if inline { vec![index.clone()] } else { Vec::new() },
        })
    }

    #[tokio::test]
    async fn test_no_claims() {
        let (resolver, _) = resolver(Vec::new(), Arc::new(MemoryObjectStore::new()));
        let link = block(b"unclaimed").link;

        assert!(!resolver.has(&link).await.unwrap());
        assert!(resolver.get(&link).await.unwrap().is_none());
        assert!(matches!(
            resolver.resolve(&link).await,
            Err(BlockstoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_service_url_is_forwarded() {
        let client = Arc::new(StaticClaims::default());
        let url = Url::parse("https://claims.example.com").unwrap();
        let resolver = ClaimsResolver::new(
            client.clone(),
            Arc::new(MemoryObjectStore::new()),
            HttpTransport::new(Duration::from_secs(5)).unwrap(),
            Metrics::new().unwrap(),
        )
        .with_service_url(Some(url.clone()));

        resolver.has(&block(b"x").link).await.unwrap();
        assert_eq!(*client.service_urls.lock(), vec![Some(url)]);
    }

    #[tokio::test]
    async fn test_relation_with_exported_index() {
        let store = Arc::new(MemoryObjectStore::new());
        let blocks = vec![block(b"alpha"), block(b"beta"), block(b"gamma")];
        let (archive, index) = indexed_archive(&store, &blocks);
        let target = blocks[1].link;

        let (resolver, metrics) = resolver(vec![relation(&target, archive, &index, true)], store);

        assert!(resolver.has(&target).await.unwrap());
        assert_eq!(resolver.resolve(&target).await.unwrap(), blocks[1]);
        assert_eq!(metrics.snapshot().blocks_claims, 1);
    }

    #[tokio::test]
    async fn test_relation_index_from_secondary_archive() {
        let store = Arc::new(MemoryObjectStore::new());
        let blocks = vec![block(b"alpha"), block(b"beta")];
        let (archive, index) = indexed_archive(&store, &blocks);

        let mut writer = ArchiveWriter::new(&[index.link]);
        writer.push(&index.link, &index.bytes);
        let secondary_data = writer.finish();
        let secondary = ArchiveId::for_bytes(&secondary_data).unwrap();
        store.insert(secondary.storage_key(), secondary_data);

        let mut claim = relation(&blocks[0].link, archive, &index, false);
        if let Claim::Relation(r) = &mut claim {
            r.parts[0].includes.as_mut().unwrap().parts = vec![*secondary.link()];
        }

        let (resolver, _) = resolver(vec![claim], store.clone());
        let bytes = resolver.get(&blocks[0].link).await.unwrap().unwrap();
        assert_eq!(bytes, blocks[0].bytes);
        assert_eq!(store.get_count(&secondary.storage_key()), 1);
    }

    #[tokio::test]
    async fn test_non_archive_part_is_skipped() {
        let store = Arc::new(MemoryObjectStore::new());
        let blocks = vec![block(b"alpha")];
        let (_, index) = indexed_archive(&store, &blocks);
        let not_archive = block(b"not an archive").link;

        let (resolver, _) = resolver(
            vec![relation(&blocks[0].link, not_archive, &index, true)],
            store,
        );
        assert!(resolver.get(&blocks[0].link).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_wrong_index_codec_is_decode_error() {
        let store = Arc::new(MemoryObjectStore::new());
        let blocks = vec![block(b"alpha")];
        let (archive, index) = indexed_archive(&store, &blocks);
        let mislabelled = Block::new(Link::from_multihash(codec::RAW, *index.link.multihash()), index.bytes);

        let (resolver, _) = resolver(
            vec![relation(&blocks[0].link, archive, &mislabelled, true)],
            store,
        );
        let err = resolver.resolve(&blocks[0].link).await.unwrap_err();
        assert!(matches!(
            err,
            BlockstoreError::Decode(FormatError::UnexpectedCodec { .. })
        ));
    }

    #[tokio::test]
    async fn test_location_claim_moves_past_failed_url() {
        let server = MockServer::start().await;
        let target = block(b"located block");
        let mut writer = ArchiveWriter::new(&[target.link]);
        writer.push(&target.link, &target.bytes);
        let body = writer.finish();

        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/archive"))
            .and(header("accept", ARCHIVE_MEDIA_TYPE))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let base = Url::parse(&server.uri()).unwrap();
        let claim = Claim::Location(LocationClaim {
            content: target.link,
            location: vec![base.join("/broken").unwrap(), base.join("/archive").unwrap()],
        });

        let (resolver, metrics) = resolver(vec![Claim::Unknown, claim], Arc::new(MemoryObjectStore::new()));
        assert_eq!(resolver.resolve(&target.link).await.unwrap(), target);
        assert_eq!(metrics.snapshot().block_bytes_claims, target.bytes.len() as u64);
    }

    #[tokio::test]
    async fn test_missing_relation_archive_falls_through_to_next_claim() {
        let store = Arc::new(MemoryObjectStore::new());
        let target = block(b"wanted");

        let elsewhere = MemoryObjectStore::new();
        let (lost, lost_index) = indexed_archive(&elsewhere, &[target.clone()]);
        let (kept, kept_index) = indexed_archive(&store, &[block(b"padding"), target.clone()]);

        let (resolver, _) = resolver(
            vec![
                relation(&target.link, lost, &lost_index, true),
                relation(&target.link, kept, &kept_index, true),
            ],
            store,
        );
        assert_eq!(resolver.get(&target.link).await.unwrap(), Some(target.bytes));
    }

    #[tokio::test]
    async fn test_only_missing_relation_archive_is_absent() {
        let target = block(b"wanted");
        let (lost, lost_index) = indexed_archive(&MemoryObjectStore::new(), &[target.clone()]);

        let (resolver, _) = resolver(
            vec![relation(&target.link, lost, &lost_index, true)],
            Arc::new(MemoryObjectStore::new()),
        );
        assert!(resolver.get(&target.link).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_location_body_for_other_block_is_skipped() {
        let server = MockServer::start().await;
        let target = block(b"located block");
        let impostor = block(b"some other block");

        let mut writer = ArchiveWriter::new(&[impostor.link]);
        writer.push(&impostor.link, &impostor.bytes);
        let wrong = writer.finish();
        let mut writer = ArchiveWriter::new(&[target.link]);
        writer.push(&target.link, &target.bytes);
        let right = writer.finish();

        Mock::given(method("GET"))
            .and(path("/wrong"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(wrong.to_vec()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/right"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(right.to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let base = Url::parse(&server.uri()).unwrap();
        let claim = Claim::Location(LocationClaim {
            content: target.link,
            location: vec![base.join("/wrong").unwrap(), base.join("/right").unwrap()],
        });

        let (resolver, _) = resolver(vec![claim], Arc::new(MemoryObjectStore::new()));
        assert_eq!(resolver.resolve(&target.link).await.unwrap(), target);
    }

    #[tokio::test]
    async fn test_location_with_only_other_block_is_absent() {
        let server = MockServer::start().await;
        let impostor = block(b"some other block");
        let mut writer = ArchiveWriter::new(&[impostor.link]);
        writer.push(&impostor.link, &impostor.bytes);

        Mock::given(method("GET"))
            .and(path("/wrong"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(writer.finish().to_vec()))
            .mount(&server)
            .await;

        let target = block(b"located block");
        let claim = Claim::Location(LocationClaim {
            content: target.link,
            location: vec![Url::parse(&server.uri()).unwrap().join("/wrong").unwrap()],
        });

        let (resolver, _) = resolver(vec![claim], Arc::new(MemoryObjectStore::new()));
        assert!(resolver.get(&target.link).await.unwrap().is_none());
    }
}
