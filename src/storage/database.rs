//! SQLite database for a single knowledge base
//!
//! Each base owns one database file holding its document registry, extracted
//! page text, chunk content, and chat history. Embeddings live in the vector
//! index next door, keyed by chunk id.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{Chunk, ChunkSource, Document, FileType, QueryMode};

/// Dedup status of an incoming file against the stored registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    /// Filename not seen before
    New,
    /// Same filename, same content hash
    Unchanged,
    /// Same filename, different content hash; carries the old document id
    Modified(Uuid),
}

/// A chunk read back from the database, with its parent document's identity
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub chunk: Chunk,
    pub filename: String,
}

/// One question/answer turn from the chat history
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChatEntry {
    pub id: i64,
    pub question: String,
    pub answer: String,
    pub mode: QueryMode,
    pub created_at: DateTime<Utc>,
}

/// Aggregate counts for a base
#[derive(Debug, Clone, serde::Serialize)]
pub struct BaseStats {
    pub documents: usize,
    pub chunks: usize,
    pub pages: usize,
}

/// SQLite-backed store for one knowledge base
pub struct BaseDb {
    conn: Arc<Mutex<Connection>>,
}

impl BaseDb {
    /// Create or open the database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| Error::Database(format!("Failed to open database: {}", e)))?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    /// In-memory database for tests
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("Failed to open in-memory database: {}", e)))?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        // WAL for concurrent reads while the ingest worker writes
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA foreign_keys=ON;
            PRAGMA cache_size=10000;
            PRAGMA temp_store=MEMORY;
        "#,
        )
        .map_err(|e| Error::Database(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                filename TEXT NOT NULL UNIQUE,
                file_type TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                total_pages INTEGER,
                total_chunks INTEGER NOT NULL DEFAULT 0,
                indexed_at TEXT NOT NULL,
                metadata TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_documents_content_hash ON documents(content_hash);

            CREATE TABLE IF NOT EXISTS pages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id TEXT NOT NULL,
                page_number INTEGER NOT NULL,
                content TEXT NOT NULL,
                FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE,
                UNIQUE(document_id, page_number)
            );

            CREATE INDEX IF NOT EXISTS idx_pages_document_id ON pages(document_id);

            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                page_number INTEGER,
                char_start INTEGER NOT NULL,
                char_end INTEGER NOT NULL,
                token_count INTEGER NOT NULL,
                FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id);

            CREATE TABLE IF NOT EXISTS chat_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                mode TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_chat_history_created_at ON chat_history(created_at);
        "#,
        )
        .map_err(|e| Error::Database(format!("Failed to run migrations: {}", e)))?;

        Ok(())
    }

    // ==================== Documents ====================

    /// Insert or replace a document record
    pub fn upsert_document(&self, doc: &Document) -> Result<()> {
        let conn = self.conn.lock();
        let metadata = if doc.metadata.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&doc.metadata)?)
        };

        conn.execute(
            r#"
            INSERT INTO documents (
                id, filename, file_type, content_hash, file_size,
                total_pages, total_chunks, indexed_at, metadata
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(filename) DO UPDATE SET
                id = excluded.id,
                file_type = excluded.file_type,
                content_hash = excluded.content_hash,
                file_size = excluded.file_size,
                total_pages = excluded.total_pages,
                total_chunks = excluded.total_chunks,
                indexed_at = excluded.indexed_at,
                metadata = excluded.metadata
            "#,
            params![
                doc.id.to_string(),
                doc.filename,
                doc.file_type.as_str(),
                doc.content_hash,
                doc.file_size as i64,
                doc.total_pages.map(|p| p as i64),
                doc.total_chunks as i64,
                doc.indexed_at.to_rfc3339(),
                metadata,
            ],
        )
        .map_err(|e| Error::Database(format!("Failed to upsert document: {}", e)))?;

        Ok(())
    }

    /// Look up a document by filename
    pub fn get_document_by_filename(&self, base: &str, filename: &str) -> Result<Option<Document>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT * FROM documents WHERE filename = ?1")
            .map_err(|e| Error::Database(format!("Failed to prepare query: {}", e)))?;

        let base = base.to_string();
        let doc = stmt
            .query_row(params![filename], |row| row_to_document(row, &base))
            .optional()
            .map_err(|e| Error::Database(format!("Failed to get document: {}", e)))?;
        Ok(doc)
    }

    /// Look up a document by id
    pub fn get_document(&self, base: &str, id: Uuid) -> Result<Option<Document>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT * FROM documents WHERE id = ?1")
            .map_err(|e| Error::Database(format!("Failed to prepare query: {}", e)))?;

        let base = base.to_string();
        let doc = stmt
            .query_row(params![id.to_string()], |row| row_to_document(row, &base))
            .optional()
            .map_err(|e| Error::Database(format!("Failed to get document: {}", e)))?;
        Ok(doc)
    }

    /// List all documents, most recently indexed first
    pub fn list_documents(&self, base: &str) -> Result<Vec<Document>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT * FROM documents ORDER BY indexed_at DESC")
            .map_err(|e| Error::Database(format!("Failed to prepare query: {}", e)))?;

        let base = base.to_string();
        let docs = stmt
            .query_map([], |row| row_to_document(row, &base))
            .map_err(|e| Error::Database(format!("Failed to list documents: {}", e)))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(docs)
    }

    /// Compare an incoming file against the registry for dedup
    pub fn file_status(&self, filename: &str, content_hash: &str) -> Result<FileStatus> {
        let conn = self.conn.lock();
        let existing: Option<(String, String)> = conn
            .query_row(
                "SELECT id, content_hash FROM documents WHERE filename = ?1",
                params![filename],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| Error::Database(format!("Failed to check file status: {}", e)))?;

        Ok(match existing {
            None => FileStatus::New,
            Some((_, hash)) if hash == content_hash => FileStatus::Unchanged,
            Some((id, _)) => FileStatus::Modified(
                Uuid::parse_str(&id)
                    .map_err(|e| Error::Database(format!("Corrupt document id: {}", e)))?,
            ),
        })
    }

    /// Delete a document and everything cascading from it. Returns true if a
    /// row was removed.
    pub fn delete_document(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock();
        let count = conn
            .execute(
                "DELETE FROM documents WHERE id = ?1",
                params![id.to_string()],
            )
            .map_err(|e| Error::Database(format!("Failed to delete document: {}", e)))?;
        Ok(count > 0)
    }

    // ==================== Pages ====================

    /// Replace all page text for a document
    pub fn replace_pages(&self, document_id: Uuid, pages: &[(u32, String)]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        tx.execute(
            "DELETE FROM pages WHERE document_id = ?1",
            params![document_id.to_string()],
        )
        .map_err(|e| Error::Database(format!("Failed to clear pages: {}", e)))?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO pages (document_id, page_number, content) VALUES (?1, ?2, ?3)",
                )
                .map_err(|e| Error::Database(format!("Failed to prepare statement: {}", e)))?;
            for (page_number, content) in pages {
                stmt.execute(params![
                    document_id.to_string(),
                    *page_number as i64,
                    content
                ])
                .map_err(|e| Error::Database(format!("Failed to insert page: {}", e)))?;
            }
        }

        tx.commit()
            .map_err(|e| Error::Database(format!("Failed to commit transaction: {}", e)))?;
        Ok(())
    }

    /// Fetch the text of one page
    pub fn get_page(&self, document_id: Uuid, page_number: u32) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let content = conn
            .query_row(
                "SELECT content FROM pages WHERE document_id = ?1 AND page_number = ?2",
                params![document_id.to_string(), page_number as i64],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::Database(format!("Failed to get page: {}", e)))?;
        Ok(content)
    }

    // ==================== Chunks ====================

    /// Replace all chunk content for a document
    pub fn replace_chunks(&self, document_id: Uuid, chunks: &[Chunk]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        tx.execute(
            "DELETE FROM chunks WHERE document_id = ?1",
            params![document_id.to_string()],
        )
        .map_err(|e| Error::Database(format!("Failed to clear chunks: {}", e)))?;

        {
            let mut stmt = tx
                .prepare(
                    r#"
                    INSERT INTO chunks (
                        id, document_id, chunk_index, content, page_number,
                        char_start, char_end, token_count
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    "#,
                )
                .map_err(|e| Error::Database(format!("Failed to prepare statement: {}", e)))?;
            for chunk in chunks {
                stmt.execute(params![
                    chunk.id.to_string(),
                    document_id.to_string(),
                    chunk.chunk_index as i64,
                    chunk.content,
                    chunk.source.page_number.map(|p| p as i64),
                    chunk.char_start as i64,
                    chunk.char_end as i64,
                    chunk.token_count as i64,
                ])
                .map_err(|e| Error::Database(format!("Failed to insert chunk: {}", e)))?;
            }
        }

        tx.commit()
            .map_err(|e| Error::Database(format!("Failed to commit transaction: {}", e)))?;
        Ok(())
    }

    /// Fetch chunks by id, preserving the given order
    pub fn get_chunks_by_ids(&self, ids: &[Uuid]) -> Result<Vec<StoredChunk>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                r#"
                SELECT c.id, c.document_id, c.chunk_index, c.content, c.page_number,
                       c.char_start, c.char_end, c.token_count,
                       d.filename, d.file_type, d.total_pages
                FROM chunks c
                JOIN documents d ON d.id = c.document_id
                WHERE c.id = ?1
                "#,
            )
            .map_err(|e| Error::Database(format!("Failed to prepare query: {}", e)))?;

        let mut chunks = Vec::with_capacity(ids.len());
        for id in ids {
            let row = stmt
                .query_row(params![id.to_string()], row_to_stored_chunk)
                .optional()
                .map_err(|e| Error::Database(format!("Failed to get chunk: {}", e)))?;
            if let Some(chunk) = row {
                chunks.push(chunk);
            }
        }
        Ok(chunks)
    }

    // ==================== Chat history ====================

    /// Append a question/answer turn
    pub fn add_chat_entry(&self, question: &str, answer: &str, mode: QueryMode) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO chat_history (question, answer, mode, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![question, answer, mode.as_str(), Utc::now().to_rfc3339()],
        )
        .map_err(|e| Error::Database(format!("Failed to add chat entry: {}", e)))?;
        Ok(())
    }

    /// Most recent turns, newest first
    pub fn recent_history(&self, limit: usize) -> Result<Vec<ChatEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT id, question, answer, mode, created_at FROM chat_history ORDER BY id DESC LIMIT ?1")
            .map_err(|e| Error::Database(format!("Failed to prepare query: {}", e)))?;

        let entries = stmt
            .query_map(params![limit as i64], |row| {
                let mode_str: String = row.get(3)?;
                let created_at_str: String = row.get(4)?;
                Ok(ChatEntry {
                    id: row.get(0)?,
                    question: row.get(1)?,
                    answer: row.get(2)?,
                    mode: QueryMode::from_str_key(&mode_str),
                    created_at: DateTime::parse_from_rfc3339(&created_at_str)
                        .map(|d| d.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                })
            })
            .map_err(|e| Error::Database(format!("Failed to list history: {}", e)))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(entries)
    }

    /// Wipe the chat history. Returns how many turns were removed.
    pub fn clear_history(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count = conn
            .execute("DELETE FROM chat_history", [])
            .map_err(|e| Error::Database(format!("Failed to clear history: {}", e)))?;
        Ok(count)
    }

    // ==================== Stats ====================

    /// Aggregate counts for this base
    pub fn stats(&self) -> Result<BaseStats> {
        let conn = self.conn.lock();
        let documents: i64 = conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
            .unwrap_or(0);
        let chunks: i64 = conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .unwrap_or(0);
        let pages: i64 = conn
            .query_row("SELECT COUNT(*) FROM pages", [], |row| row.get(0))
            .unwrap_or(0);

        Ok(BaseStats {
            documents: documents as usize,
            chunks: chunks as usize,
            pages: pages as usize,
        })
    }
}

fn row_to_document(row: &rusqlite::Row, base: &str) -> rusqlite::Result<Document> {
    let id_str: String = row.get(0)?;
    let filename: String = row.get(1)?;
    let file_type_str: String = row.get(2)?;
    let content_hash: String = row.get(3)?;
    let file_size: i64 = row.get(4)?;
    let total_pages: Option<i64> = row.get(5)?;
    let total_chunks: i64 = row.get(6)?;
    let indexed_at_str: String = row.get(7)?;
    let metadata_json: Option<String> = row.get(8)?;

    Ok(Document {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::new_v4()),
        filename,
        base: base.to_string(),
        file_type: FileType::from_str_key(&file_type_str),
        content_hash,
        file_size: file_size as u64,
        total_pages: total_pages.map(|p| p as u32),
        total_chunks: total_chunks as u32,
        indexed_at: DateTime::parse_from_rfc3339(&indexed_at_str)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        metadata: metadata_json
            .and_then(|j| serde_json::from_str(&j).ok())
            .unwrap_or_default(),
    })
}

fn row_to_stored_chunk(row: &rusqlite::Row) -> rusqlite::Result<StoredChunk> {
    let id_str: String = row.get(0)?;
    let document_id_str: String = row.get(1)?;
    let chunk_index: i64 = row.get(2)?;
    let content: String = row.get(3)?;
    let page_number: Option<i64> = row.get(4)?;
    let char_start: i64 = row.get(5)?;
    let char_end: i64 = row.get(6)?;
    let token_count: i64 = row.get(7)?;
    let filename: String = row.get(8)?;
    let file_type_str: String = row.get(9)?;
    let total_pages: Option<i64> = row.get(10)?;

    let source = ChunkSource {
        filename: filename.clone(),
        file_type: FileType::from_str_key(&file_type_str),
        page_number: page_number.map(|p| p as u32),
        page_count: total_pages.map(|p| p as u32),
    };

    Ok(StoredChunk {
        chunk: Chunk {
            id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::new_v4()),
            document_id: Uuid::parse_str(&document_id_str).unwrap_or_else(|_| Uuid::new_v4()),
            content,
            embedding: Vec::new(),
            source,
            char_start: char_start as usize,
            char_end: char_end as usize,
            chunk_index: chunk_index as u32,
            token_count: token_count as u32,
        },
        filename,
    })
}
