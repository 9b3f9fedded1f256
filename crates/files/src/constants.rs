/// Directory under the store root holding object bytes.
pub const OBJECTS_FOLDER_NAME: &str = "objects";

/// Directory under the store root holding per-object JSON metadata.
pub const METADATA_FOLDER_NAME: &str = "meta";

/// Path prefix of presigned read URLs.
pub const READ_ROUTE_PREFIX: &str = "files";

/// Longest accepted object key.
pub const MAX_KEY_LEN: usize = 512;
