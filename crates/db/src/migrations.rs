/// Inline SQL migrations for the drop statistics database.
///
/// Each entry runs once; applied versions are tracked in `_migrations`.
pub const MIGRATIONS: &[&str] = &[
    // Migration 1: raw drop observations
    r#"
CREATE TABLE IF NOT EXISTS item_drops (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    server      TEXT NOT NULL,
    stage_id    TEXT NOT NULL,
    user_id     TEXT NOT NULL,
    timestamp   INTEGER NOT NULL,
    times       INTEGER NOT NULL DEFAULT 1,
    is_reliable BOOLEAN NOT NULL DEFAULT 1,
    is_deleted  BOOLEAN NOT NULL DEFAULT 0
);
"#,
    r#"
CREATE INDEX IF NOT EXISTS idx_item_drops_stage_time ON item_drops(server, stage_id, timestamp);
"#,
    r#"
CREATE INDEX IF NOT EXISTS idx_item_drops_user_time ON item_drops(user_id, timestamp DESC);
"#,
    // Migration 2: per-item quantities of one observation
    r#"
CREATE TABLE IF NOT EXISTS item_drop_items (
    drop_id  INTEGER NOT NULL REFERENCES item_drops(id) ON DELETE CASCADE,
    item_id  TEXT NOT NULL,
    quantity INTEGER NOT NULL,
    PRIMARY KEY (drop_id, item_id)
);
"#,
    // Migration 3: accumulation windows and drop sets
    r#"
CREATE TABLE IF NOT EXISTS drop_infos (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    server        TEXT NOT NULL,
    stage_id      TEXT NOT NULL,
    item_id       TEXT NOT NULL,
    range_start   INTEGER NOT NULL,
    range_end     INTEGER,
    accumulatable BOOLEAN NOT NULL DEFAULT 1,
    comment       TEXT
);
"#,
    r#"
CREATE INDEX IF NOT EXISTS idx_drop_infos_stage ON drop_infos(server, stage_id, range_start);
"#,
    // Migration 4: runtime tunables
    r#"
CREATE TABLE IF NOT EXISTS system_properties (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#,
    // Migration 5: cached matrices
    r#"
CREATE TABLE IF NOT EXISTS drop_matrix_elements (
    kind        TEXT NOT NULL,
    server      TEXT NOT NULL,
    is_past     BOOLEAN NOT NULL,
    stage_id    TEXT NOT NULL,
    item_id     TEXT NOT NULL,
    range_start INTEGER NOT NULL,
    range_end   INTEGER,
    quantity    INTEGER NOT NULL,
    times       INTEGER NOT NULL,
    update_time INTEGER NOT NULL
);
"#,
    r#"
CREATE INDEX IF NOT EXISTS idx_matrix_elements_key ON drop_matrix_elements(kind, server, is_past);
"#,
];
