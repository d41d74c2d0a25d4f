use serde::Deserialize;

/// S3 storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// Bucket that holds the reports. The producer requires it; the notifier
    /// uses it to reject events from other buckets.
    #[serde(default)]
    pub bucket: Option<String>,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl S3Config {
    /// Configured bucket, treating an empty value as unset.
    pub fn bucket(&self) -> Option<&str> {
        self.bucket.as_deref().map(str::trim).filter(|b| !b.is_empty())
    }
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: None,
            region: default_region(),
            endpoint_url: None,
            force_path_style: false,
        }
    }
}
