// Request log: one SQLite row per successful heavy request, plus an optional
// on-disk backup of the result image.

use chrono::Local;
use parking_lot::Mutex;
use rusqlite::{params, Connection, Row};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::core::config::key_tail;
use crate::core::errors::{LogStoreError, LogStoreResult};
use crate::core::types::{InlineImage, LogRecord, RequestLogEvent, RequestType};
use crate::utils::image_ops::{decode_base64_image, extension_for_mime};
use crate::utils::Metrics;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS request_logs (
    id TEXT PRIMARY KEY,
    timestamp TEXT NOT NULL,
    client_ip TEXT,
    prompt TEXT,
    model TEXT,
    api_key_suffix TEXT,
    image_filename TEXT,
    request_type TEXT
)";

#[derive(Clone)]
pub struct RequestLogger {
    conn: Arc<Mutex<Connection>>,
    images_dir: PathBuf,
    metrics: Option<Metrics>,
}

impl RequestLogger {
    /// Open (or create) the database and the backup directory
    pub fn open(
        db_path: impl AsRef<Path>,
        images_dir: impl Into<PathBuf>,
        metrics: Option<Metrics>,
    ) -> LogStoreResult<Self> {
        let images_dir = images_dir.into();
        std::fs::create_dir_all(&images_dir).map_err(|source| {
            LogStoreError::DirectoryCreationFailed {
                path: images_dir.display().to_string(),
                source,
            }
        })?;

        let conn = Connection::open(db_path.as_ref())?;
        conn.execute(CREATE_TABLE, [])?;

        info!(
            "Request log ready at {} (backups in {})",
            db_path.as_ref().display(),
            images_dir.display()
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            images_dir,
            metrics,
        })
    }

    /// Record a heavy request. Failures are logged and swallowed.
    pub async fn log(&self, event: RequestLogEvent) -> Option<LogRecord> {
        match self.try_log(event).await {
            Ok(record) => {
                info!(
                    "Request logged: {} | IP: {} | Model: {}",
                    record.id, record.client_ip, record.model
                );
                self.record(true);
                Some(record)
            }
            Err(e) => {
                error!("Failed to log request: {}", e);
                self.record(false);
                None
            }
        }
    }

    async fn try_log(&self, event: RequestLogEvent) -> LogStoreResult<LogRecord> {
        let image_filename = match &event.image {
            Some(image) => match self.save_backup(image).await {
                Ok(filename) => Some(filename),
                Err(e) => {
                    warn!("Failed to save image backup: {}", e);
                    None
                }
            },
            None => None,
        };

        let record = LogRecord {
            id: Uuid::new_v4().to_string(),
            timestamp: Local::now().to_rfc3339(),
            client_ip: event.client_ip,
            prompt: event.prompt,
            model: event.model,
            api_key_suffix: key_suffix(&event.api_key),
            image_filename,
            request_type: event.request_type,
        };

        let conn = Arc::clone(&self.conn);
        let row = record.clone();
        tokio::task::spawn_blocking(move || -> LogStoreResult<()> {
            conn.lock().execute(
                "INSERT INTO request_logs
                 (id, timestamp, client_ip, prompt, model, api_key_suffix, image_filename, request_type)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    row.id,
                    row.timestamp,
                    row.client_ip,
                    row.prompt,
                    row.model,
                    row.api_key_suffix,
                    row.image_filename,
                    row.request_type.as_str(),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(|e| LogStoreError::TaskJoinFailed(e.to_string()))??;

        Ok(record)
    }

    /// Decode the image and write it as `%Y%m%d_%H%M%S_<8 hex>.<ext>`
    async fn save_backup(&self, image: &InlineImage) -> LogStoreResult<String> {
        let bytes = decode_base64_image(&image.data)?;

        let hex = Uuid::new_v4().simple().to_string();
        let filename = format!(
            "{}_{}.{}",
            Local::now().format("%Y%m%d_%H%M%S"),
            &hex[..8],
            extension_for_mime(&image.mime_type)
        );
        let path = self.images_dir.join(&filename);

        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| LogStoreError::BackupFailed {
                path: path.display().to_string(),
                source,
            })?;

        Ok(filename)
    }

    /// Number of logged requests
    pub async fn count(&self) -> LogStoreResult<u64> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || -> LogStoreResult<u64> {
            let count: i64 =
                conn.lock()
                    .query_row("SELECT COUNT(*) FROM request_logs", [], |row| row.get(0))?;
            Ok(count.max(0) as u64)
        })
        .await
        .map_err(|e| LogStoreError::TaskJoinFailed(e.to_string()))?
    }

    /// Most recent rows first
    pub async fn recent(&self, limit: usize) -> LogStoreResult<Vec<LogRecord>> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || -> LogStoreResult<Vec<LogRecord>> {
            let conn = conn.lock();
            let mut stmt = conn.prepare(
                "SELECT id, timestamp, client_ip, prompt, model, api_key_suffix, image_filename, request_type
                 FROM request_logs ORDER BY timestamp DESC, rowid DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map([limit as i64], record_from_row)?;
            let records = rows.collect::<Result<Vec<_>, _>>()?;
            Ok(records)
        })
        .await
        .map_err(|e| LogStoreError::TaskJoinFailed(e.to_string()))?
    }

    fn record(&self, success: bool) {
        if let Some(ref m) = self.metrics {
            m.record_request_logged(success);
        }
    }
}

fn record_from_row(row: &Row) -> rusqlite::Result<LogRecord> {
    let request_type: Option<String> = row.get(7)?;
    Ok(LogRecord {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        client_ip: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        prompt: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        model: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        api_key_suffix: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        image_filename: row.get::<_, Option<String>>(6)?.filter(|f| !f.is_empty()),
        request_type: request_type
            .as_deref()
            .and_then(RequestType::parse)
            .unwrap_or(RequestType::Generation),
    })
}

/// Key tail as stored in the log, `unknown` for keys of four or fewer
pub fn key_suffix(api_key: &str) -> String {
    key_tail(api_key).unwrap_or_else(|| "unknown".to_string())
}
