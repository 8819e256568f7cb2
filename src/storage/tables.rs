use redb::TableDefinition;

/// File records: uuid -> FileRecord (msgpack)
pub const FILES: TableDefinition<&str, &[u8]> = TableDefinition::new("files");

/// Short-code index: code -> uuid
pub const FILE_SHORT_CODES: TableDefinition<&str, &str> = TableDefinition::new("file_short_codes");

/// Storage-key index: object key -> uuid
pub const FILE_STORAGE_KEYS: TableDefinition<&str, &str> =
    TableDefinition::new("file_storage_keys");

/// Rate-limit state: client ip -> RateLimitEntry (msgpack)
pub const RATE_LIMITS: TableDefinition<&str, &[u8]> = TableDefinition::new("rate_limits");

/// Runtime settings: key -> value
pub const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");
