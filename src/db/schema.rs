pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);
";

/// Bumped whenever `SCHEMA` changes shape.
pub const SCHEMA_VERSION: i32 = 1;
