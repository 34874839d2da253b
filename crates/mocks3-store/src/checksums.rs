//! Content digests and S3 checksum algorithms.
//!
//! Two families of values are produced here. The ETag family is an MD5 hex
//! digest per payload plus the classic multipart combinator (MD5 of the
//! concatenated raw part digests, suffixed with the part count). The checksum
//! family covers the four `x-amz-checksum-*` algorithms, combined at
//! multipart completion either as a composite (checksum of concatenated part
//! checksums) or as a full-object value (one hasher over the reassembled
//! byte stream). The two combination rules produce different values for the
//! same content; the declared [`ChecksumType`] selects which one applies.
//!
//! All digests stream over files: payloads are file-backed and may exceed
//! memory.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use digest::Digest;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Read buffer size for streaming digests.
const BUF_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// ChecksumAlgorithm
// ---------------------------------------------------------------------------

/// S3-supported checksum algorithms (excluding MD5, which is always computed
/// for the ETag).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChecksumAlgorithm {
    /// CRC-32 (IEEE 802.3).
    #[serde(rename = "CRC32")]
    Crc32,
    /// CRC-32C (Castagnoli).
    #[serde(rename = "CRC32C")]
    Crc32c,
    /// SHA-1.
    #[serde(rename = "SHA1")]
    Sha1,
    /// SHA-256.
    #[serde(rename = "SHA256")]
    Sha256,
}

impl ChecksumAlgorithm {
    /// Return the canonical string representation used in S3 headers.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crc32 => "CRC32",
            Self::Crc32c => "CRC32C",
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a [`ChecksumAlgorithm`] from a string fails.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown checksum algorithm: {0}")]
pub struct ParseChecksumAlgorithmError(String);

impl FromStr for ChecksumAlgorithm {
    type Err = ParseChecksumAlgorithmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CRC32" => Ok(Self::Crc32),
            "CRC32C" => Ok(Self::Crc32c),
            "SHA1" => Ok(Self::Sha1),
            "SHA256" => Ok(Self::Sha256),
            _ => Err(ParseChecksumAlgorithmError(s.to_owned())),
        }
    }
}

// ---------------------------------------------------------------------------
// ChecksumType
// ---------------------------------------------------------------------------

/// How per-part checksums are combined at multipart completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChecksumType {
    /// Checksum of the concatenated decoded part checksums, `-<count>` suffixed.
    #[default]
    #[serde(rename = "COMPOSITE")]
    Composite,
    /// Checksum of the reassembled object bytes.
    #[serde(rename = "FULL_OBJECT")]
    FullObject,
}

impl ChecksumType {
    /// Return the canonical string representation used in S3 headers.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Composite => "COMPOSITE",
            Self::FullObject => "FULL_OBJECT",
        }
    }
}

impl fmt::Display for ChecksumType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a [`ChecksumType`] from a string fails.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown checksum type: {0}")]
pub struct ParseChecksumTypeError(String);

impl FromStr for ChecksumType {
    type Err = ParseChecksumTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "COMPOSITE" => Ok(Self::Composite),
            "FULL_OBJECT" => Ok(Self::FullObject),
            _ => Err(ParseChecksumTypeError(s.to_owned())),
        }
    }
}

// ---------------------------------------------------------------------------
// ETag digests
// ---------------------------------------------------------------------------

/// Compute the hex-encoded MD5 digest of a file's contents.
///
/// This is the unquoted value stored as an object's ETag; quoting is the
/// wire format's concern.
pub fn file_digest(path: &Path) -> StoreResult<String> {
    salted_file_digest(None, path)
}

/// Compute the hex-encoded MD5 digest of a file, optionally salted with a
/// simulated-encryption key identifier.
///
/// The salt bytes are fed to the hasher before the payload, producing a
/// value distinguishable from the plain digest. The payload bytes are never
/// transformed.
pub fn salted_file_digest(salt: Option<&str>, path: &Path) -> StoreResult<String> {
    let mut hasher = <md5::Md5 as Digest>::new();
    if let Some(salt) = salt {
        Digest::update(&mut hasher, salt.as_bytes());
    }
    stream_file(path, |chunk| Digest::update(&mut hasher, chunk))?;
    Ok(hex::encode(Digest::finalize(hasher)))
}

/// Compute the composite ETag for a multipart upload.
///
/// The result is the MD5 of the concatenated binary digests of each part,
/// formatted as `<hex>-<part_count>`. Each entry in `part_digests` is the
/// unquoted hex MD5 of one part, in the order the parts were declared at
/// completion. The value is order-sensitive and is *not* a digest of the
/// assembled bytes.
#[must_use]
pub fn multipart_etag(part_digests: &[impl AsRef<str>]) -> String {
    let mut combined = Vec::with_capacity(part_digests.len() * 16);
    for hex_str in part_digests {
        if let Ok(bytes) = hex::decode(hex_str.as_ref()) {
            combined.extend_from_slice(&bytes);
        }
    }
    let final_md5 = hex::encode(md5::Md5::digest(&combined));
    format!("{final_md5}-{}", part_digests.len())
}

// ---------------------------------------------------------------------------
// S3 checksum algorithms
// ---------------------------------------------------------------------------

/// Compute the base64-encoded checksum of a file for the given algorithm.
pub fn file_checksum(algorithm: ChecksumAlgorithm, path: &Path) -> StoreResult<String> {
    let mut hasher = ChecksumHasher::new(algorithm);
    stream_file(path, |chunk| hasher.update(chunk))?;
    Ok(hasher.finish())
}

/// Combine per-part checksums into a composite checksum.
///
/// The decoded part checksums are concatenated and hashed with the same
/// algorithm; the result is base64-encoded with a `-<part_count>` suffix.
#[must_use]
pub fn composite_checksum(
    algorithm: ChecksumAlgorithm,
    part_checksums: &[impl AsRef<str>],
) -> String {
    let mut combined = Vec::new();
    for b64 in part_checksums {
        if let Ok(bytes) = BASE64_STANDARD.decode(b64.as_ref()) {
            combined.extend_from_slice(&bytes);
        }
    }
    let mut hasher = ChecksumHasher::new(algorithm);
    hasher.update(&combined);
    format!("{}-{}", hasher.finish(), part_checksums.len())
}

/// Compute the full-object checksum across a sequence of part files.
///
/// One hasher is streamed over every part in order, exactly as if the
/// reassembled object had been hashed in one pass. No part-count suffix is
/// attached.
pub fn full_object_checksum(
    algorithm: ChecksumAlgorithm,
    paths: &[impl AsRef<Path>],
) -> StoreResult<String> {
    let mut hasher = ChecksumHasher::new(algorithm);
    for path in paths {
        stream_file(path.as_ref(), |chunk| hasher.update(chunk))?;
    }
    Ok(hasher.finish())
}

// ---------------------------------------------------------------------------
// ChecksumHasher
// ---------------------------------------------------------------------------

/// Incremental hasher dispatching over the supported checksum algorithms.
enum ChecksumHasher {
    Crc32(crc32fast::Hasher),
    Crc32c(u32),
    Sha1(sha1::Sha1),
    Sha256(sha2::Sha256),
}

impl ChecksumHasher {
    fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Crc32 => Self::Crc32(crc32fast::Hasher::new()),
            ChecksumAlgorithm::Crc32c => Self::Crc32c(0),
            ChecksumAlgorithm::Sha1 => Self::Sha1(<sha1::Sha1 as Digest>::new()),
            ChecksumAlgorithm::Sha256 => Self::Sha256(<sha2::Sha256 as Digest>::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Crc32(h) => h.update(data),
            Self::Crc32c(v) => *v = crc32c::crc32c_append(*v, data),
            Self::Sha1(h) => Digest::update(h, data),
            Self::Sha256(h) => Digest::update(h, data),
        }
    }

    fn finish(self) -> String {
        match self {
            Self::Crc32(h) => BASE64_STANDARD.encode(h.finalize().to_be_bytes()),
            Self::Crc32c(v) => BASE64_STANDARD.encode(v.to_be_bytes()),
            Self::Sha1(h) => BASE64_STANDARD.encode(Digest::finalize(h)),
            Self::Sha256(h) => BASE64_STANDARD.encode(Digest::finalize(h)),
        }
    }
}

/// Stream a file through `consume` in fixed-size chunks.
fn stream_file(path: &Path, mut consume: impl FnMut(&[u8])) -> StoreResult<()> {
    let mut file = File::open(path).map_err(|e| StoreError::io(path, e))?;
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = file.read(&mut buf).map_err(|e| StoreError::io(path, e))?;
        if n == 0 {
            break;
        }
        consume(&buf[..n]);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
