use rusqlite::Connection;

pub fn migrate(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS watchlist (
            address     TEXT PRIMARY KEY,
            kind        TEXT NOT NULL, -- 'blocked' | 'trusted'
            reason      TEXT,
            added_at    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS fraud_alerts (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            subject_id  TEXT NOT NULL,
            kind        TEXT NOT NULL, -- 'event' | 'transfer'
            risk_score  REAL NOT NULL,
            risk_level  TEXT NOT NULL,
            flags       TEXT, -- JSON
            blocked     INTEGER NOT NULL DEFAULT 0,
            status      TEXT NOT NULL DEFAULT 'active',
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS metadata_docs (
            token_id    INTEGER PRIMARY KEY,
            json        TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_alerts_score ON fraud_alerts(risk_score DESC);
        CREATE INDEX IF NOT EXISTS idx_alerts_created ON fraud_alerts(created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_watchlist_kind ON watchlist(kind);
        ",
    )?;
    Ok(())
}
