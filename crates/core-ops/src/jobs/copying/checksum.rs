//! Expected MD5 digest of a copied file, checked by the Verify stage.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumExpectation {
    pub source_index: u32,
    pub destination_path: String,
    md5: [u8; 16],
}

impl ChecksumExpectation {
    /// Panics unless `digest` is exactly 16 bytes.
    pub fn new(source_index: u32, destination_path: String, digest: &[u8]) -> Self {
        assert_eq!(digest.len(), 16, "an MD5 digest must be 16 bytes long");
        let mut md5 = [0u8; 16];
        md5.copy_from_slice(digest);
        Self {
            source_index,
            destination_path,
            md5,
        }
    }

    pub fn matches(&self, digest: &[u8]) -> bool {
        digest.len() == 16 && self.md5 == digest
    }
}
