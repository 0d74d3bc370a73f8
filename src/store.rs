use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{Local, NaiveDate};
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use tracing::debug;

use crate::domain::Xref;
use crate::error::BridgeError;
use crate::fs_util::ensure_parent;

/// Header values written into every store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreInfo {
    pub build_date: String,
    pub source_name: String,
    pub source_version: String,
    pub series: String,
    pub data_type: String,
}

impl StoreInfo {
    pub fn new(series: &str, data_type: &str, source_version: &str) -> Self {
        Self::dated(Local::now().date_naive(), series, data_type, source_version)
    }

    pub fn dated(date: NaiveDate, series: &str, data_type: &str, source_version: &str) -> Self {
        Self {
            build_date: date.format("%Y%m%d").to_string(),
            source_name: "Wikidata".to_string(),
            source_version: source_version.to_string(),
            series: series.to_string(),
            data_type: data_type.to_string(),
        }
    }

    pub fn entries(&self) -> [(&'static str, &str); 5] {
        [
            ("BUILDDATE", self.build_date.as_str()),
            ("DATASOURCENAME", self.source_name.as_str()),
            ("DATASOURCEVERSION", self.source_version.as_str()),
            ("SERIES", self.series.as_str()),
            ("DATATYPE", self.data_type.as_str()),
        ]
    }
}

/// Write capability of an identifier-mapping database.
///
/// Writes between two [`MappingStore::commit`] calls form one unit of work.
pub trait MappingStore {
    fn set_info(&mut self, key: &str, value: &str) -> Result<(), BridgeError>;
    fn add_xref(&mut self, xref: &Xref) -> Result<(), BridgeError>;
    fn add_link(&mut self, left: &Xref, right: &Xref) -> Result<(), BridgeError>;
    fn add_attribute(&mut self, xref: &Xref, name: &str, value: &str) -> Result<(), BridgeError>;
    fn commit(&mut self) -> Result<(), BridgeError>;
    /// Flushes outstanding work and prepares the store for reading.
    fn finalize(&mut self) -> Result<(), BridgeError>;

    fn write_info(&mut self, info: &StoreInfo) -> Result<(), BridgeError> {
        for (key, value) in info.entries() {
            self.set_info(key, value)?;
        }
        Ok(())
    }
}

const SCHEMA: &str = "
    CREATE TABLE info (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
    CREATE TABLE datanode (
        id TEXT NOT NULL,
        code TEXT NOT NULL,
        PRIMARY KEY (id, code)
    ) WITHOUT ROWID;
    CREATE TABLE link (
        id_left TEXT NOT NULL,
        code_left TEXT NOT NULL,
        id_right TEXT NOT NULL,
        code_right TEXT NOT NULL,
        PRIMARY KEY (id_left, code_left, id_right, code_right)
    ) WITHOUT ROWID;
    CREATE TABLE attribute (
        id TEXT NOT NULL,
        code TEXT NOT NULL,
        attrname TEXT NOT NULL,
        attrvalue TEXT NOT NULL,
        PRIMARY KEY (id, code, attrname, attrvalue)
    ) WITHOUT ROWID;
";

const INDEXES: &str = "
    CREATE INDEX IF NOT EXISTS idx_link_right ON link (id_right, code_right);
    CREATE INDEX IF NOT EXISTS idx_datanode_code ON datanode (code);
";

/// SQLite-backed mapping store.
///
/// Creating a store replaces any file already at the path. Work that has not
/// been committed is rolled back when the store is dropped.
pub struct SqliteStore {
    connection: Connection,
    path: Option<Utf8PathBuf>,
}

impl SqliteStore {
    pub fn create(path: &Utf8Path) -> Result<Self, BridgeError> {
        ensure_parent(path)?;
        if path.as_std_path().exists() {
            fs::remove_file(path.as_std_path())
                .map_err(|err| BridgeError::Filesystem(err.to_string()))?;
        }
        let connection = Connection::open(path.as_std_path())
            .map_err(|err| BridgeError::store("open database", err))?;
        Self::initialise(connection, Some(path.to_path_buf()))
    }

    pub fn create_in_memory() -> Result<Self, BridgeError> {
        let connection = Connection::open_in_memory()
            .map_err(|err| BridgeError::store("open database", err))?;
        Self::initialise(connection, None)
    }

    fn initialise(connection: Connection, path: Option<Utf8PathBuf>) -> Result<Self, BridgeError> {
        connection
            .execute_batch(SCHEMA)
            .map_err(|err| BridgeError::store("create tables", err))?;
        Ok(Self { connection, path })
    }

    fn begin_if_needed(&self) -> Result<(), BridgeError> {
        if self.connection.is_autocommit() {
            self.connection
                .execute_batch("BEGIN")
                .map_err(|err| BridgeError::store("begin transaction", err))?;
        }
        Ok(())
    }

    fn execute(
        &self,
        operation: &'static str,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<(), BridgeError> {
        self.begin_if_needed()?;
        let mut statement = self
            .connection
            .prepare_cached(sql)
            .map_err(|err| BridgeError::store(operation, err))?;
        statement
            .execute(params)
            .map_err(|err| BridgeError::store(operation, err))?;
        Ok(())
    }

    /// Reads the counts that quality control compares.
    pub fn summary(&self) -> Result<StoreSummary, BridgeError> {
        summarize(&self.connection)
    }
}

impl MappingStore for SqliteStore {
    fn set_info(&mut self, key: &str, value: &str) -> Result<(), BridgeError> {
        self.execute(
            "set info",
            "INSERT OR REPLACE INTO info (key, value) VALUES (?1, ?2)",
            (key, value),
        )
    }

    fn add_xref(&mut self, xref: &Xref) -> Result<(), BridgeError> {
        self.execute(
            "add identifier",
            "INSERT OR IGNORE INTO datanode (id, code) VALUES (?1, ?2)",
            (xref.id(), xref.source().system_code()),
        )
    }

    fn add_link(&mut self, left: &Xref, right: &Xref) -> Result<(), BridgeError> {
        self.execute(
            "add link",
            "INSERT OR IGNORE INTO link (id_left, code_left, id_right, code_right)
                VALUES (?1, ?2, ?3, ?4)",
            (
                left.id(),
                left.source().system_code(),
                right.id(),
                right.source().system_code(),
            ),
        )
    }

    fn add_attribute(&mut self, xref: &Xref, name: &str, value: &str) -> Result<(), BridgeError> {
        self.execute(
            "add attribute",
            "INSERT OR IGNORE INTO attribute (id, code, attrname, attrvalue)
                VALUES (?1, ?2, ?3, ?4)",
            (xref.id(), xref.source().system_code(), name, value),
        )
    }

    fn commit(&mut self) -> Result<(), BridgeError> {
        if !self.connection.is_autocommit() {
            self.connection
                .execute_batch("COMMIT")
                .map_err(|err| BridgeError::store("commit", err))?;
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), BridgeError> {
        self.commit()?;
        self.connection
            .execute_batch(INDEXES)
            .map_err(|err| BridgeError::store("create indexes", err))?;
        self.connection
            .execute_batch("VACUUM")
            .map_err(|err| BridgeError::store("compact", err))?;
        debug!(path = ?self.path, "store finalized");
        Ok(())
    }
}

/// Counts describing one store, as compared by quality control.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreSummary {
    pub info: BTreeMap<String, String>,
    pub identifiers: BTreeMap<String, u64>,
    pub links: u64,
    pub attributes: BTreeMap<String, u64>,
}

impl StoreSummary {
    pub fn open(path: &Utf8Path) -> Result<Self, BridgeError> {
        if !path.as_std_path().is_file() {
            return Err(BridgeError::QualityControl(format!(
                "store file not found: {path}"
            )));
        }
        if !has_sqlite_header(path)? {
            return Err(BridgeError::QualityControl(format!(
                "{path} is not a wd2bridge store"
            )));
        }
        let connection = Connection::open_with_flags(
            path.as_std_path(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|err| BridgeError::store("open database", err))?;
        summarize(&connection)
    }

    pub fn total_identifiers(&self) -> u64 {
        self.identifiers.values().sum()
    }
}

const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";

fn has_sqlite_header(path: &Utf8Path) -> Result<bool, BridgeError> {
    let mut file = fs::File::open(path.as_std_path())
        .map_err(|err| BridgeError::Filesystem(format!("open {path}: {err}")))?;
    let mut header = [0u8; 16];
    match file.read_exact(&mut header) {
        Ok(()) => Ok(&header == SQLITE_HEADER),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(err) => Err(BridgeError::Filesystem(format!("read {path}: {err}"))),
    }
}

fn summarize(connection: &Connection) -> Result<StoreSummary, BridgeError> {
    let info = query_pairs(connection, "SELECT key, value FROM info")?;
    let identifiers = query_counts(
        connection,
        "SELECT code, COUNT(*) FROM datanode GROUP BY code",
    )?;
    let attributes = query_counts(
        connection,
        "SELECT attrname, COUNT(*) FROM attribute GROUP BY attrname",
    )?;
    let links: i64 = connection
        .query_row("SELECT COUNT(*) FROM link", [], |row| row.get(0))
        .map_err(|err| BridgeError::store("count links", err))?;
    Ok(StoreSummary {
        info,
        identifiers,
        links: links.max(0) as u64,
        attributes,
    })
}

fn query_pairs(connection: &Connection, sql: &str) -> Result<BTreeMap<String, String>, BridgeError> {
    let mut statement = connection
        .prepare(sql)
        .map_err(|err| BridgeError::store("read info", err))?;
    let rows = statement
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
        .map_err(|err| BridgeError::store("read info", err))?;
    rows.collect::<Result<BTreeMap<_, _>, _>>()
        .map_err(|err| BridgeError::store("read info", err))
}

fn query_counts(connection: &Connection, sql: &str) -> Result<BTreeMap<String, u64>, BridgeError> {
    let mut statement = connection
        .prepare(sql)
        .map_err(|err| BridgeError::store("count rows", err))?;
    let rows = statement
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?.max(0) as u64))
        })
        .map_err(|err| BridgeError::store("count rows", err))?;
    rows.collect::<Result<BTreeMap<_, _>, _>>()
        .map_err(|err| BridgeError::store("count rows", err))
}

/// One write recorded by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreEvent {
    Info { key: String, value: String },
    Register(Xref),
    Link(Xref, Xref),
    Attribute { xref: Xref, name: String, value: String },
    Commit,
    Finalize,
}

/// Store that keeps every write in memory, in order. Backs `--dry-run`.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    events: Vec<StoreEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[StoreEvent] {
        &self.events
    }

    pub fn registrations(&self) -> impl Iterator<Item = &Xref> {
        self.events.iter().filter_map(|event| match event {
            StoreEvent::Register(xref) => Some(xref),
            _ => None,
        })
    }

    pub fn links(&self) -> impl Iterator<Item = (&Xref, &Xref)> {
        self.events.iter().filter_map(|event| match event {
            StoreEvent::Link(left, right) => Some((left, right)),
            _ => None,
        })
    }

    pub fn commits(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, StoreEvent::Commit))
            .count()
    }
}

impl MappingStore for MemoryStore {
    fn set_info(&mut self, key: &str, value: &str) -> Result<(), BridgeError> {
        self.events.push(StoreEvent::Info {
            key: key.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    fn add_xref(&mut self, xref: &Xref) -> Result<(), BridgeError> {
        self.events.push(StoreEvent::Register(xref.clone()));
        Ok(())
    }

    fn add_link(&mut self, left: &Xref, right: &Xref) -> Result<(), BridgeError> {
        self.events.push(StoreEvent::Link(left.clone(), right.clone()));
        Ok(())
    }

    fn add_attribute(&mut self, xref: &Xref, name: &str, value: &str) -> Result<(), BridgeError> {
        self.events.push(StoreEvent::Attribute {
            xref: xref.clone(),
            name: name.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    fn commit(&mut self) -> Result<(), BridgeError> {
        self.events.push(StoreEvent::Commit);
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), BridgeError> {
        self.events.push(StoreEvent::Finalize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use crate::domain::DataSource;

    use super::*;

    fn xref(id: &str, source: DataSource) -> Xref {
        Xref::new(id, source).unwrap()
    }

    #[test]
    fn info_header_keys() {
        let date = NaiveDate::from_ymd_opt(2020, 4, 14).unwrap();
        let info = StoreInfo::dated(date, "humancorona", "GeneProduct", "1.0.0");
        let entries = info.entries();
        assert_eq!(entries[0], ("BUILDDATE", "20200414"));
        assert_eq!(entries[1], ("DATASOURCENAME", "Wikidata"));
        assert_eq!(entries[3], ("SERIES", "humancorona"));
        assert_eq!(entries[4], ("DATATYPE", "GeneProduct"));
    }

    #[test]
    fn sqlite_writes_are_idempotent() {
        let mut store = SqliteStore::create_in_memory().unwrap();
        let q1 = xref("Q1", DataSource::WIKIDATA);
        let a1 = xref("A1", DataSource::NCBI_GENE);
        store.add_xref(&q1).unwrap();
        store.add_xref(&q1).unwrap();
        store.add_xref(&a1).unwrap();
        store.add_link(&q1, &q1).unwrap();
        store.add_link(&q1, &a1).unwrap();
        store.add_link(&q1, &a1).unwrap();
        store.add_attribute(&q1, "virus", "SARS-CoV-2").unwrap();
        store.commit().unwrap();

        let summary = store.summary().unwrap();
        assert_eq!(summary.identifiers.get("Wd"), Some(&1));
        assert_eq!(summary.identifiers.get("L"), Some(&1));
        assert_eq!(summary.links, 2);
        assert_eq!(summary.attributes.get("virus"), Some(&1));
    }

    #[test]
    fn uncommitted_work_is_rolled_back_on_drop() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("out.bridge")).unwrap();
        {
            let mut store = SqliteStore::create(&path).unwrap();
            store.add_xref(&xref("Q1", DataSource::WIKIDATA)).unwrap();
            store.commit().unwrap();
            store.add_xref(&xref("Q2", DataSource::WIKIDATA)).unwrap();
        }
        let summary = StoreSummary::open(&path).unwrap();
        assert_eq!(summary.identifiers.get("Wd"), Some(&1));
    }

    #[test]
    fn summary_rejects_files_that_are_not_stores() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("legacy.bridge")).unwrap();
        fs::write(path.as_std_path(), b"PK\x03\x04 not a database").unwrap();
        assert_matches!(
            StoreSummary::open(&path),
            Err(BridgeError::QualityControl(message)) if message.contains("not a wd2bridge store")
        );

        let empty = Utf8PathBuf::from_path_buf(temp.path().join("empty.bridge")).unwrap();
        fs::write(empty.as_std_path(), b"").unwrap();
        assert_matches!(StoreSummary::open(&empty), Err(BridgeError::QualityControl(_)));
    }

    #[test]
    fn create_replaces_existing_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("nested/out.bridge")).unwrap();
        {
            let mut store = SqliteStore::create(&path).unwrap();
            store.add_xref(&xref("Q1", DataSource::WIKIDATA)).unwrap();
            store.finalize().unwrap();
        }
        let mut store = SqliteStore::create(&path).unwrap();
        store.finalize().unwrap();
        drop(store);
        assert_eq!(StoreSummary::open(&path).unwrap().total_identifiers(), 0);
    }

    #[test]
    fn memory_store_records_in_order() {
        let mut store = MemoryStore::new();
        let q1 = xref("Q1", DataSource::WIKIDATA);
        store.add_xref(&q1).unwrap();
        store.add_link(&q1, &q1).unwrap();
        store.commit().unwrap();
        assert_eq!(
            store.events(),
            &[
                StoreEvent::Register(q1.clone()),
                StoreEvent::Link(q1.clone(), q1),
                StoreEvent::Commit,
            ]
        );
        assert_eq!(store.commits(), 1);
    }
}
