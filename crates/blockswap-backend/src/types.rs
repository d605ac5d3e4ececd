//! Records resolved from the metadata store.

use std::fmt;

use blockswap_auth::canonical::build_canonical_uri;

/// Where a block's bytes live inside an aggregate blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    /// Byte offset of the block inside the blob.
    pub offset: u64,
    /// Block length in bytes.
    pub length: u64,
    /// Blob locator, `region/bucket/key`.
    pub locator: String,
}

/// A parsed `region/bucket/key` blob locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobLocator {
    /// Region hosting the bucket.
    pub region: String,
    /// Bucket name.
    pub bucket: String,
    /// Object key, may contain `/`.
    pub key: String,
}

impl BlobLocator {
    /// Parse a locator. All three parts must be non-empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use blockswap_backend::BlobLocator;
    ///
    /// let loc = BlobLocator::parse("us-east-2/cars/raw/abc.car").unwrap();
    /// assert_eq!(loc.bucket, "cars");
    /// assert_eq!(loc.key, "raw/abc.car");
    /// assert!(BlobLocator::parse("bucket-only").is_none());
    /// ```
    #[must_use]
    pub fn parse(locator: &str) -> Option<Self> {
        let mut parts = locator.splitn(3, '/');
        let region = parts.next().filter(|s| !s.is_empty())?;
        let bucket = parts.next().filter(|s| !s.is_empty())?;
        let key = parts.next().filter(|s| !s.is_empty())?;
        Some(Self {
            region: region.to_owned(),
            bucket: bucket.to_owned(),
            key: key.to_owned(),
        })
    }

    /// Object URL: virtual-hosted on AWS, path-style under an endpoint
    /// override.
    #[must_use]
    pub fn url(&self, endpoint: Option<&str>) -> String {
        match endpoint {
            Some(endpoint) => format!(
                "{}{}",
                endpoint.trim_end_matches('/'),
                build_canonical_uri(&format!("/{}/{}", self.bucket, self.key))
            ),
            None => format!(
                "https://{}.s3.{}.amazonaws.com{}",
                self.bucket,
                self.region,
                build_canonical_uri(&format!("/{}", self.key))
            ),
        }
    }
}

impl fmt::Display for BlobLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.region, self.bucket, self.key)
    }
}
