//! Storage key translation
//!
//! Archives were first written under a legacy layout,
//! `raw/{payload}/{shard}/{base32-digest}.archive`, and later under the
//! canonical `{archive}/{archive}.archive` layout. Both layouts name the same
//! objects, so a legacy key can be rewritten without any lookup.

use cid::multibase::Base;
use cid::multihash::Multihash;

use crate::error::{FormatError, Result};
use crate::link::{ARCHIVE_SUFFIX, ArchiveId};

/// First path segment of legacy keys
pub const LEGACY_KEY_MARKER: &str = "raw";

/// Text prefix of every base32 archive identifier
const ARCHIVE_ID_PREFIX: &str = "bag";

/// Translate a storage key to the canonical archive layout
///
/// Returns `Ok(None)` when the key does not name an archive object or uses
/// a layout that cannot be translated. Canonical keys come back unchanged.
pub fn legacy_key_to_archive_key(key: &str) -> Result<Option<String>> {
    if !key.ends_with(ARCHIVE_SUFFIX) {
        return Ok(None);
    }

    let first = key.split('/').next().unwrap_or_default();
    if first == LEGACY_KEY_MARKER {
        let file = key.rsplit('/').next().unwrap_or_default();
        let digest = file.strip_suffix(ARCHIVE_SUFFIX).unwrap_or(file);
        let id = digest_to_archive_id(digest)?;
        return Ok(Some(id.storage_key()));
    }

    if first.starts_with(ARCHIVE_ID_PREFIX) {
        return Ok(Some(key.to_string()));
    }

    Ok(None)
}

/// Decode an unprefixed base32 multihash into an archive identifier
pub fn digest_to_archive_id(base32_digest: &str) -> Result<ArchiveId> {
    let bytes = Base::Base32Lower
        .decode(base32_digest)
        .map_err(|e| FormatError::InvalidBase32 {
            input: base32_digest.to_string(),
            reason: e.to_string(),
        })?;
    let multihash = Multihash::<64>::from_bytes(&bytes)?;
    Ok(ArchiveId::from_multihash(multihash))
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::link::{Link, codec};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    const LEGACY_KEY: &str = "raw/bafybeieiltf3tnfdyvdutyolzhfahphgevnjsso26nulfqxtkptyefq3za/315318734258473269/ciqjxmllx5y73brw6mv3pkvd7sotfk2turkupkq7tsgygrdy2yxibri.archive";
    const CANONICAL_ID: &str = "bagbaieratoywxp3r7wddn4zlw6vkh7e5gkvvhjcvi6vb7henqnchrvroqdcq";

    #[test]
    fn test_legacy_key_translation() {
        let translated = legacy_key_to_archive_key(LEGACY_KEY).unwrap();
        assert_eq!(
            translated,
            Some(format!("{CANONICAL_ID}/{CANONICAL_ID}.archive"))
        );
    }

    #[test]
    fn test_canonical_key_unchanged() {
        assert_eq!(
            legacy_key_to_archive_key("bagfoo/bagfoo.archive").unwrap(),
            Some("bagfoo/bagfoo.archive".to_string())
        );
    }

    #[test]
    fn test_unknown_layout_is_skipped() {
        assert_eq!(legacy_key_to_archive_key("other/x.archive").unwrap(), None);
    }

    #[test]
    fn test_non_archive_key_is_skipped() {
        assert_eq!(legacy_key_to_archive_key("raw/a/b/ciqabc.idx").unwrap(), None);
        assert_eq!(legacy_key_to_archive_key("bagfoo/bagfoo").unwrap(), None);
    }

    #[test]
    fn test_malformed_digest_is_decode_error() {
        let err = legacy_key_to_archive_key("raw/a/b/NOT-BASE32!.archive").unwrap_err();
        assert!(matches!(err, FormatError::InvalidBase32 { .. }));
    }

    #[test]
    fn test_digest_to_archive_id() {
        let id = digest_to_archive_id("ciqjxmllx5y73brw6mv3pkvd7sotfk2turkupkq7tsgygrdy2yxibri")
            .unwrap();
        assert_eq!(id.to_string(), CANONICAL_ID);
        assert_eq!(id.link().codec(), codec::CAR);
        assert_eq!(id.link().multihash().code(), codec::SHA2_256);
    }

    proptest! {
        #[test]
        fn prop_legacy_digest_maps_to_same_multihash(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            let link = Link::sha2_256(codec::RAW, &data).unwrap();
            let digest = Base::Base32Lower.encode(link.multihash().to_bytes());
            let key = format!("raw/payload/0/{digest}.archive");

            let translated = legacy_key_to_archive_key(&key).unwrap().unwrap();
            let id = ArchiveId::from_multihash(*link.multihash());
            prop_assert_eq!(translated, id.storage_key());
        }
    }
}
