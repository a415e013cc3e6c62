//! SQLite content store: documents, pages, text chunks, detected regions.
//!
//! Keyword search runs against an FTS5 virtual table (`text_chunks_fts`)
//! kept in lockstep with `text_chunks` by triggers. The store opens in WAL
//! mode so the HTTP readers and the ingest writer can share one database
//! file; a lock conflict while the schema is being created is fatal.

mod models;

pub use models::{Document, Page, Region, RegionBox, ResolvedRecord, ResultType, TextChunk};

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    file_hash    TEXT NOT NULL UNIQUE,
    filename     TEXT NOT NULL,
    total_pages  INTEGER NOT NULL,
    storage_path TEXT
);

CREATE TABLE IF NOT EXISTS pages (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id  INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    page_num     INTEGER NOT NULL,
    image_path   TEXT,
    ocr_text     TEXT,
    ocr_metadata TEXT
);
CREATE INDEX IF NOT EXISTS pages_document_idx ON pages(document_id);

CREATE TABLE IF NOT EXISTS text_chunks (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    page_id     INTEGER NOT NULL REFERENCES pages(id) ON DELETE CASCADE,
    document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    chunk_index INTEGER NOT NULL,
    text        TEXT NOT NULL,
    vector_id   TEXT,
    UNIQUE(page_id, chunk_index)
);
CREATE INDEX IF NOT EXISTS text_chunks_document_idx ON text_chunks(document_id);
CREATE INDEX IF NOT EXISTS text_chunks_vector_idx ON text_chunks(vector_id);

CREATE TABLE IF NOT EXISTS regions (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    page_id     INTEGER NOT NULL REFERENCES pages(id) ON DELETE CASCADE,
    document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    label       TEXT NOT NULL,
    box_y0      REAL NOT NULL,
    box_x0      REAL NOT NULL,
    box_y1      REAL NOT NULL,
    box_x1      REAL NOT NULL,
    crop_path   TEXT,
    vector_id   TEXT
);
CREATE INDEX IF NOT EXISTS regions_page_idx ON regions(page_id);
CREATE INDEX IF NOT EXISTS regions_vector_idx ON regions(vector_id);

CREATE VIRTUAL TABLE IF NOT EXISTS text_chunks_fts USING fts5(
    text, content='text_chunks', content_rowid='id'
);

CREATE TRIGGER IF NOT EXISTS text_chunks_ai AFTER INSERT ON text_chunks BEGIN
    INSERT INTO text_chunks_fts(rowid, text) VALUES (new.id, new.text);
END;
CREATE TRIGGER IF NOT EXISTS text_chunks_ad AFTER DELETE ON text_chunks BEGIN
    INSERT INTO text_chunks_fts(text_chunks_fts, rowid, text) VALUES ('delete', old.id, old.text);
END;
CREATE TRIGGER IF NOT EXISTS text_chunks_au AFTER UPDATE ON text_chunks BEGIN
    INSERT INTO text_chunks_fts(text_chunks_fts, rowid, text) VALUES ('delete', old.id, old.text);
    INSERT INTO text_chunks_fts(rowid, text) VALUES (new.id, new.text);
END;
";

fn is_locked(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::DatabaseBusy
                || e.code == rusqlite::ErrorCode::DatabaseLocked
    )
}

/// Escape a user-supplied string for an FTS5 `MATCH` expression.
///
/// FTS5 parses the match argument with its own mini-language, so raw user
/// input can raise syntax errors. Tokens containing anything other than
/// alphanumerics are wrapped in double quotes with internal quotes doubled.
fn escape_fts5_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|tok| {
            if tok.chars().all(|c| c.is_alphanumeric()) {
                tok.to_string()
            } else {
                format!("\"{}\"", tok.replace('"', "\"\""))
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// One keyword hit with its joined fields and rank score.
#[derive(Debug, Clone)]
pub struct KeywordHit {
    pub record: ResolvedRecord,
    pub score: f64,
    pub vector_id: Option<String>,
}

/// Vector ids removed along with a document, for vector-store cleanup.
#[derive(Debug, Default)]
pub struct DeletedDocument {
    pub vector_ids: Vec<String>,
}

/// A handle over one SQLite connection to the content database.
///
/// The ingest pipeline holds a writer; the HTTP surface opens a fresh
/// reader per request. WAL mode makes that combination safe.
pub struct ContentStore {
    conn: Connection,
}

impl ContentStore {
    /// Open the content database, applying pragmas and the schema.
    ///
    /// A `SQLITE_BUSY`/`SQLITE_LOCKED` during initialisation surfaces as a
    /// fatal error with an actionable message instead of a bare code.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open content database {}", path.display()))?;
        Self::init(conn)
    }

    /// Open an in-memory content database (tests).
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        let setup = (|| -> rusqlite::Result<()> {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.pragma_update(None, "busy_timeout", 5000)?;
            conn.execute_batch(SCHEMA)
        })();
        if let Err(err) = setup {
            if is_locked(&err) {
                bail!(
                    "Content database is locked (is the API or another indexer running?). \
                     Stop the other process and retry."
                );
            }
            return Err(err).context("Failed to initialise content database schema");
        }
        tracing::debug!("Content database ready");
        Ok(Self { conn })
    }

    // ---- transaction control (the ingest owns one transaction) ----

    pub fn begin(&self) -> Result<()> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    pub fn commit(&self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    pub fn rollback(&self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    // ---- documents ----

    pub fn insert_document(
        &self,
        file_hash: &str,
        filename: &str,
        total_pages: i64,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO documents (file_hash, filename, total_pages) VALUES (?1, ?2, ?3)",
            params![file_hash, filename, total_pages],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn find_document_by_hash(&self, file_hash: &str) -> Result<Option<Document>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, file_hash, filename, total_pages, storage_path
                 FROM documents WHERE file_hash = ?1",
                params![file_hash],
                Document::from_row,
            )
            .optional()?)
    }

    pub fn get_document(&self, id: i64) -> Result<Option<Document>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, file_hash, filename, total_pages, storage_path
                 FROM documents WHERE id = ?1",
                params![id],
                Document::from_row,
            )
            .optional()?)
    }

    pub fn list_documents(&self) -> Result<Vec<Document>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, file_hash, filename, total_pages, storage_path
             FROM documents ORDER BY id DESC",
        )?;
        let rows = stmt.query_map([], Document::from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn set_document_storage_path(&self, id: i64, storage_path: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE documents SET storage_path = ?1 WHERE id = ?2",
            params![storage_path, id],
        )?;
        Ok(())
    }

    /// Delete a document and every dependent row. Deletes are explicit (not
    /// left to FK cascades) so the FTS delete trigger always fires. Returns
    /// the vector ids that must be removed from the vector store.
    pub fn delete_document(&self, id: i64) -> Result<Option<DeletedDocument>> {
        if self.get_document(id)?.is_none() {
            return Ok(None);
        }
        let mut vector_ids = Vec::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT vector_id FROM text_chunks WHERE document_id = ?1 AND vector_id IS NOT NULL
                 UNION ALL
                 SELECT vector_id FROM regions WHERE document_id = ?1 AND vector_id IS NOT NULL",
            )?;
            let rows = stmt.query_map(params![id], |row| row.get::<_, String>(0))?;
            for row in rows {
                vector_ids.push(row?);
            }
        }
        self.conn
            .execute("DELETE FROM text_chunks WHERE document_id = ?1", params![id])?;
        self.conn
            .execute("DELETE FROM regions WHERE document_id = ?1", params![id])?;
        self.conn
            .execute("DELETE FROM pages WHERE document_id = ?1", params![id])?;
        self.conn
            .execute("DELETE FROM documents WHERE id = ?1", params![id])?;
        tracing::info!(document_id = id, vectors = vector_ids.len(), "Deleted document");
        Ok(Some(DeletedDocument { vector_ids }))
    }

    // ---- pages ----

    pub fn insert_page(&self, document_id: i64, page_num: i64) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO pages (document_id, page_num) VALUES (?1, ?2)",
            params![document_id, page_num],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn set_page_image_path(&self, page_id: i64, image_path: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE pages SET image_path = ?1 WHERE id = ?2",
            params![image_path, page_id],
        )?;
        Ok(())
    }

    pub fn set_page_ocr(
        &self,
        page_id: i64,
        ocr_text: &str,
        ocr_metadata: Option<&str>,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE pages SET ocr_text = ?1, ocr_metadata = ?2 WHERE id = ?3",
            params![ocr_text, ocr_metadata, page_id],
        )?;
        Ok(())
    }

    pub fn list_pages(&self, document_id: i64) -> Result<Vec<Page>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, document_id, page_num, image_path, ocr_text, ocr_metadata
             FROM pages WHERE document_id = ?1 ORDER BY page_num ASC",
        )?;
        let rows = stmt.query_map(params![document_id], Page::from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn find_page(&self, document_id: i64, page_num: i64) -> Result<Option<Page>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, document_id, page_num, image_path, ocr_text, ocr_metadata
                 FROM pages WHERE document_id = ?1 AND page_num = ?2",
                params![document_id, page_num],
                Page::from_row,
            )
            .optional()?)
    }

    // ---- text chunks ----

    pub fn insert_chunk(
        &self,
        page_id: i64,
        document_id: i64,
        chunk_index: i64,
        text: &str,
        vector_id: Option<&str>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO text_chunks (page_id, document_id, chunk_index, text, vector_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![page_id, document_id, chunk_index, text, vector_id],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn update_chunk_text(&self, chunk_id: i64, text: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE text_chunks SET text = ?1 WHERE id = ?2",
            params![text, chunk_id],
        )?;
        Ok(())
    }

    pub fn delete_chunk(&self, chunk_id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM text_chunks WHERE id = ?1", params![chunk_id])?;
        Ok(())
    }

    pub fn chunk_count(&self, document_id: i64) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM text_chunks WHERE document_id = ?1",
            params![document_id],
            |row| row.get(0),
        )?)
    }

    pub fn list_chunks(&self, page_id: i64) -> Result<Vec<TextChunk>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, page_id, document_id, chunk_index, text, vector_id
             FROM text_chunks WHERE page_id = ?1 ORDER BY chunk_index ASC",
        )?;
        let rows = stmt.query_map(params![page_id], TextChunk::from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// The FTS row mirroring a chunk, if any. Used to check trigger sync.
    pub fn fts_text(&self, chunk_id: i64) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT text FROM text_chunks_fts WHERE rowid = ?1",
                params![chunk_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    // ---- regions ----

    pub fn insert_region(
        &self,
        page_id: i64,
        document_id: i64,
        label: &str,
        region_box: RegionBox,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO regions (page_id, document_id, label, box_y0, box_x0, box_y1, box_x1)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                page_id,
                document_id,
                label,
                region_box.y0,
                region_box.x0,
                region_box.y1,
                region_box.x1
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn set_region_crop(&self, region_id: i64, crop_path: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE regions SET crop_path = ?1 WHERE id = ?2",
            params![crop_path, region_id],
        )?;
        Ok(())
    }

    /// Set once the region's embedding is registered in the vector store.
    pub fn set_region_vector(&self, region_id: i64, vector_id: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE regions SET vector_id = ?1 WHERE id = ?2",
            params![vector_id, region_id],
        )?;
        Ok(())
    }

    pub fn get_region(&self, document_id: i64, region_id: i64) -> Result<Option<Region>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, page_id, document_id, label, box_y0, box_x0, box_y1, box_x1,
                        crop_path, vector_id
                 FROM regions WHERE document_id = ?1 AND id = ?2",
                params![document_id, region_id],
                Region::from_row,
            )
            .optional()?)
    }

    pub fn list_regions(&self, page_id: i64) -> Result<Vec<Region>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, page_id, document_id, label, box_y0, box_x0, box_y1, box_x1,
                    crop_path, vector_id
             FROM regions WHERE page_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![page_id], Region::from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn region_count(&self, document_id: i64) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM regions WHERE document_id = ?1",
            params![document_id],
            |row| row.get(0),
        )?)
    }

    // ---- keyword search ----

    /// FTS match over chunk text plus a case-insensitive substring match on
    /// region labels. Returns up to `top_k` hits sorted by score descending
    /// (text hits 1.0, region hits 0.9; the FTS list is already rank-ordered).
    pub fn keyword_search(&self, query: &str, top_k: usize) -> Result<Vec<KeywordHit>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<KeywordHit> = Vec::new();

        // FTS syntax errors degrade to "no text hits" instead of failing the
        // request; region-label matching below still runs.
        let fts_result = (|| -> rusqlite::Result<Vec<KeywordHit>> {
            let mut stmt = self.conn.prepare(
                "SELECT tc.id, tc.page_id, tc.document_id, tc.text, p.page_num, d.filename, tc.vector_id
                 FROM text_chunks_fts f
                 JOIN text_chunks tc ON f.rowid = tc.id
                 JOIN pages p ON tc.page_id = p.id
                 JOIN documents d ON tc.document_id = d.id
                 WHERE text_chunks_fts MATCH ?1
                 ORDER BY rank
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(
                params![escape_fts5_query(query), top_k as i64],
                |row| {
                    Ok(KeywordHit {
                        record: ResolvedRecord {
                            document_id: row.get(2)?,
                            document_title: row.get(5)?,
                            page_id: row.get(1)?,
                            page_num: row.get(4)?,
                            result_type: ResultType::Text,
                            chunk_id: Some(row.get(0)?),
                            region_id: None,
                            snippet: truncate_chars(&row.get::<_, String>(3)?, 500),
                        },
                        score: 1.0,
                        vector_id: row.get(6)?,
                    })
                },
            )?;
            rows.collect()
        })();
        match fts_result {
            Ok(text_hits) => hits.extend(text_hits),
            Err(e) => tracing::warn!(query, error = %e, "FTS keyword search failed"),
        }
        tracing::debug!(query, text_hits = hits.len(), "Keyword FTS done");

        if hits.len() < top_k {
            let remaining = (top_k - hits.len()) as i64;
            let mut stmt = self.conn.prepare(
                "SELECT r.id, r.page_id, r.document_id, r.label, p.page_num, d.filename, r.vector_id
                 FROM regions r
                 JOIN pages p ON r.page_id = p.id
                 JOIN documents d ON r.document_id = d.id
                 WHERE r.label LIKE '%' || ?1 || '%' COLLATE NOCASE
                 LIMIT ?2",
            )?;
            let region_rows = stmt.query_map(params![query, remaining], |row| {
                Ok(KeywordHit {
                    record: ResolvedRecord {
                        document_id: row.get(2)?,
                        document_title: row.get(5)?,
                        page_id: row.get(1)?,
                        page_num: row.get(4)?,
                        result_type: ResultType::Image,
                        chunk_id: None,
                        region_id: Some(row.get(0)?),
                        snippet: row.get(3)?,
                    },
                    score: 0.9,
                    vector_id: row.get(6)?,
                })
            })?;
            for row in region_rows {
                hits.push(row?);
            }
        }

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }

    // ---- vector-id resolution ----

    /// Resolve vector ids to their content records, one batched query per
    /// table. Unknown ids are simply absent from the result map.
    pub fn resolve_vector_ids(&self, vector_ids: &[String]) -> Result<HashMap<String, ResolvedRecord>> {
        let mut resolved = HashMap::new();
        if vector_ids.is_empty() {
            return Ok(resolved);
        }
        let placeholders = vec!["?"; vector_ids.len()].join(", ");

        let chunk_sql = format!(
            "SELECT tc.vector_id, tc.id, tc.page_id, tc.document_id, tc.text, p.page_num, d.filename
             FROM text_chunks tc
             JOIN pages p ON tc.page_id = p.id
             JOIN documents d ON tc.document_id = d.id
             WHERE tc.vector_id IN ({placeholders})"
        );
        let mut stmt = self.conn.prepare(&chunk_sql)?;
        let rows = stmt.query_map(params_from_iter(vector_ids.iter()), |row| {
            Ok((
                row.get::<_, String>(0)?,
                ResolvedRecord {
                    document_id: row.get(3)?,
                    document_title: row.get(6)?,
                    page_id: row.get(2)?,
                    page_num: row.get(5)?,
                    result_type: ResultType::Text,
                    chunk_id: Some(row.get(1)?),
                    region_id: None,
                    snippet: truncate_chars(&row.get::<_, String>(4)?, 500),
                },
            ))
        })?;
        for row in rows {
            let (vector_id, record) = row?;
            resolved.insert(vector_id, record);
        }

        let region_sql = format!(
            "SELECT r.vector_id, r.id, r.page_id, r.document_id, r.label, p.page_num, d.filename
             FROM regions r
             JOIN pages p ON r.page_id = p.id
             JOIN documents d ON r.document_id = d.id
             WHERE r.vector_id IN ({placeholders})"
        );
        let mut stmt = self.conn.prepare(&region_sql)?;
        let rows = stmt.query_map(params_from_iter(vector_ids.iter()), |row| {
            Ok((
                row.get::<_, String>(0)?,
                ResolvedRecord {
                    document_id: row.get(3)?,
                    document_title: row.get(6)?,
                    page_id: row.get(2)?,
                    page_num: row.get(5)?,
                    result_type: ResultType::Image,
                    chunk_id: None,
                    region_id: Some(row.get(1)?),
                    snippet: row.get(4)?,
                },
            ))
        })?;
        for row in rows {
            let (vector_id, record) = row?;
            resolved.entry(vector_id).or_insert(record);
        }

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_page() -> (ContentStore, i64, i64) {
        let store = ContentStore::open_in_memory().unwrap();
        let doc_id = store.insert_document("hash-a", "report.pdf", 1).unwrap();
        let page_id = store.insert_page(doc_id, 1).unwrap();
        (store, doc_id, page_id)
    }

    #[test]
    fn fts_row_tracks_chunk_through_insert_update_delete() {
        let (store, doc_id, page_id) = store_with_page();
        let chunk_id = store
            .insert_chunk(page_id, doc_id, 0, "hello world", Some("chunk_1_1_0"))
            .unwrap();
        assert_eq!(store.fts_text(chunk_id).unwrap().as_deref(), Some("hello world"));

        store.update_chunk_text(chunk_id, "goodbye world").unwrap();
        assert_eq!(
            store.fts_text(chunk_id).unwrap().as_deref(),
            Some("goodbye world")
        );
        assert!(store.keyword_search("hello", 5).unwrap().is_empty());

        store.delete_chunk(chunk_id).unwrap();
        assert_eq!(store.fts_text(chunk_id).unwrap(), None);
    }

    #[test]
    fn keyword_search_joins_pages_and_documents() {
        let (store, doc_id, page_id) = store_with_page();
        store
            .insert_chunk(page_id, doc_id, 0, "solar panel efficiency", Some("chunk_1_1_0"))
            .unwrap();

        let hits = store.keyword_search("solar", 5).unwrap();
        assert_eq!(hits.len(), 1);
        let hit = &hits[0];
        assert_eq!(hit.record.document_title, "report.pdf");
        assert_eq!(hit.record.page_num, 1);
        assert_eq!(hit.record.result_type, ResultType::Text);
        assert_eq!(hit.vector_id.as_deref(), Some("chunk_1_1_0"));
        assert_eq!(hit.score, 1.0);
    }

    #[test]
    fn keyword_search_matches_region_labels_case_insensitively() {
        let (store, doc_id, page_id) = store_with_page();
        let region_id = store
            .insert_region(
                page_id,
                doc_id,
                "Revenue Chart",
                RegionBox { y0: 0.0, x0: 0.0, y1: 10.0, x1: 10.0 },
            )
            .unwrap();
        store
            .set_region_crop(region_id, "/tmp/crop.png")
            .unwrap();
        store.set_region_vector(region_id, "region_1_1").unwrap();

        let hits = store.keyword_search("revenue", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.result_type, ResultType::Image);
        assert_eq!(hits[0].record.snippet, "Revenue Chart");
        assert_eq!(hits[0].score, 0.9);
    }

    #[test]
    fn keyword_search_survives_fts_syntax_characters() {
        let (store, doc_id, page_id) = store_with_page();
        store
            .insert_chunk(page_id, doc_id, 0, "a (b) c", None)
            .unwrap();
        // Must not error out on FTS operators in user input.
        let hits = store.keyword_search("\"unbalanced (", 5).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn empty_query_returns_empty() {
        let (store, _, _) = store_with_page();
        assert!(store.keyword_search("   ", 5).unwrap().is_empty());
    }

    #[test]
    fn duplicate_hash_is_visible_before_insert() {
        let store = ContentStore::open_in_memory().unwrap();
        store.insert_document("same", "a.pdf", 2).unwrap();
        let found = store.find_document_by_hash("same").unwrap().unwrap();
        assert_eq!(found.filename, "a.pdf");
        assert!(store.insert_document("same", "b.pdf", 2).is_err());
    }

    #[test]
    fn chunk_index_unique_per_page() {
        let (store, doc_id, page_id) = store_with_page();
        store.insert_chunk(page_id, doc_id, 0, "one", None).unwrap();
        assert!(store.insert_chunk(page_id, doc_id, 0, "two", None).is_err());
    }

    #[test]
    fn resolve_vector_ids_is_batched_and_drops_unknown() {
        let (store, doc_id, page_id) = store_with_page();
        store
            .insert_chunk(page_id, doc_id, 0, "alpha beta", Some("chunk_1_1_0"))
            .unwrap();
        let region_id = store
            .insert_region(
                page_id,
                doc_id,
                "diagram",
                RegionBox { y0: 0.0, x0: 0.0, y1: 5.0, x1: 5.0 },
            )
            .unwrap();
        store
            .set_region_crop(region_id, "/tmp/r.png")
            .unwrap();
        store.set_region_vector(region_id, "region_1_1").unwrap();

        let resolved = store
            .resolve_vector_ids(&[
                "chunk_1_1_0".to_string(),
                "region_1_1".to_string(),
                "region_9_9".to_string(),
            ])
            .unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved["chunk_1_1_0"].result_type, ResultType::Text);
        assert_eq!(resolved["region_1_1"].result_type, ResultType::Image);
        assert!(!resolved.contains_key("region_9_9"));
    }

    #[test]
    fn delete_document_removes_all_dependents_and_reports_vectors() {
        let (store, doc_id, page_id) = store_with_page();
        let chunk_id = store
            .insert_chunk(page_id, doc_id, 0, "text", Some("chunk_1_1_0"))
            .unwrap();
        let region_id = store
            .insert_region(
                page_id,
                doc_id,
                "figure",
                RegionBox { y0: 0.0, x0: 0.0, y1: 1.0, x1: 1.0 },
            )
            .unwrap();
        store
            .set_region_crop(region_id, "/tmp/r.png")
            .unwrap();
        store.set_region_vector(region_id, "region_1_1").unwrap();

        let deleted = store.delete_document(doc_id).unwrap().unwrap();
        let mut ids = deleted.vector_ids;
        ids.sort();
        assert_eq!(ids, vec!["chunk_1_1_0", "region_1_1"]);

        assert!(store.get_document(doc_id).unwrap().is_none());
        assert!(store.list_pages(doc_id).unwrap().is_empty());
        assert_eq!(store.chunk_count(doc_id).unwrap(), 0);
        assert_eq!(store.region_count(doc_id).unwrap(), 0);
        assert_eq!(store.fts_text(chunk_id).unwrap(), None);
    }

    #[test]
    fn delete_unknown_document_is_none() {
        let store = ContentStore::open_in_memory().unwrap();
        assert!(store.delete_document(42).unwrap().is_none());
    }

    #[test]
    fn snippet_truncates_to_500_chars() {
        let (store, doc_id, page_id) = store_with_page();
        let long = "word ".repeat(200);
        store
            .insert_chunk(page_id, doc_id, 0, &long, Some("chunk_1_1_0"))
            .unwrap();
        let hits = store.keyword_search("word", 5).unwrap();
        assert_eq!(hits[0].record.snippet.chars().count(), 500);
    }
}
