//! In-memory upstream systems for scan tests.
//!
//! [`FakeRelational`] stands in for a PostgreSQL/MySQL server and
//! [`FixtureFactory`] hands it (or an S3 connector over a
//! [`MemoryBackend`]) to the orchestrator. Both share state with the test,
//! so the upstream can be changed between scans.

use async_trait::async_trait;
use atlas_connect::{
    Attributes, ConnectionDescriptor, Connector, ConnectorError, ConnectorFactory,
    ConnectorFamily, ConnectorTimeouts, FieldSummary, MemoryBackend, RelationalConnector,
    ResourceKind, S3Connector, S3Settings, SchemaSummary, TableSummary,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

type ConnectorResult<T> = atlas_connect::Result<T>;

// ============================================================================
// Attributes
// ============================================================================

/// Relational connection attributes pointing nowhere in particular.
pub fn relational_attributes() -> Attributes {
    object(json!({
        "host": "db.internal",
        "port": 5432,
        "username": "reader",
        "password": "hunter2",
        "database": "warehouse",
    }))
}

/// S3 attributes with an explicit bucket allow-list (empty means unscoped).
pub fn s3_attributes(buckets: &[&str]) -> Attributes {
    object(json!({
        "endpoint": "minio.internal:9000",
        "access_key": "AKIA",
        "secret_key": "s3cr3t",
        "buckets": buckets,
    }))
}

fn object(value: Value) -> Attributes {
    match value {
        Value::Object(map) => map,
        _ => Attributes::new(),
    }
}

// ============================================================================
// Fake relational upstream
// ============================================================================

#[derive(Debug, Clone)]
struct FakeTable {
    summary: TableSummary,
    fields: Vec<FieldSummary>,
}

#[derive(Debug, Clone)]
struct FakeSchema {
    name: String,
    tables: Vec<FakeTable>,
}

/// How many times each connector call was made.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub list_schemas: usize,
    pub scan_tables: usize,
    pub scan_fields: usize,
    pub close: usize,
}

#[derive(Debug, Default)]
struct Counters {
    list_schemas: AtomicUsize,
    scan_tables: AtomicUsize,
    scan_fields: AtomicUsize,
    close: AtomicUsize,
}

/// Scriptable relational upstream. Clones share state.
#[derive(Debug, Clone)]
pub struct FakeRelational {
    kind: ResourceKind,
    schemas: Arc<RwLock<Vec<FakeSchema>>>,
    failures: Arc<Mutex<HashMap<String, ConnectorError>>>,
    counters: Arc<Counters>,
}

fn field(table: &str, ordinal: i32) -> FieldSummary {
    FieldSummary {
        name: if ordinal == 1 {
            "id".to_string()
        } else {
            format!("{}_col{}", table, ordinal)
        },
        ordinal,
        data_type: if ordinal == 1 { "int8" } else { "text" }.to_string(),
        nullable: ordinal != 1,
        default: None,
        comment: None,
        is_primary_key: ordinal == 1,
        is_unique_key: ordinal == 1,
        charset: None,
        collation: None,
        precision: None,
        scale: None,
    }
}

fn fake_table(name: &str, kind: &str, columns: usize) -> FakeTable {
    FakeTable {
        summary: TableSummary {
            name: name.to_string(),
            kind: kind.to_string(),
            comment: None,
            row_count_estimate: Some(100),
            size_bytes: Some(8192),
        },
        fields: (1..=columns as i32).map(|i| field(name, i)).collect(),
    }
}

impl FakeRelational {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            schemas: Arc::new(RwLock::new(Vec::new())),
            failures: Arc::new(Mutex::new(HashMap::new())),
            counters: Arc::new(Counters::default()),
        }
    }

    // Builder ---------------------------------------------------------------

    /// Add an empty schema; following `table` calls land in it.
    pub fn schema(self, name: &str) -> Self {
        self.add_schema(name);
        self
    }

    pub fn table(self, name: &str, columns: usize) -> Self {
        self.push_to_last(fake_table(name, "BASE TABLE", columns));
        self
    }

    pub fn view(self, name: &str, columns: usize) -> Self {
        self.push_to_last(fake_table(name, "VIEW", columns));
        self
    }

    fn push_to_last(&self, table: FakeTable) {
        let mut schemas = self.schemas.write().unwrap_or_else(|e| e.into_inner());
        if let Some(last) = schemas.last_mut() {
            last.tables.push(table);
        }
    }

    // Upstream changes ------------------------------------------------------

    pub fn add_schema(&self, name: &str) {
        let mut schemas = self.schemas.write().unwrap_or_else(|e| e.into_inner());
        if !schemas.iter().any(|s| s.name == name) {
            schemas.push(FakeSchema {
                name: name.to_string(),
                tables: Vec::new(),
            });
        }
    }

    pub fn add_table(&self, schema: &str, name: &str, columns: usize) {
        let mut schemas = self.schemas.write().unwrap_or_else(|e| e.into_inner());
        if let Some(s) = schemas.iter_mut().find(|s| s.name == schema) {
            s.tables.retain(|t| t.summary.name != name);
            s.tables.push(fake_table(name, "BASE TABLE", columns));
        }
    }

    pub fn drop_table(&self, schema: &str, name: &str) {
        let mut schemas = self.schemas.write().unwrap_or_else(|e| e.into_inner());
        if let Some(s) = schemas.iter_mut().find(|s| s.name == schema) {
            s.tables.retain(|t| t.summary.name != name);
        }
    }

    pub fn drop_schema(&self, name: &str) {
        let mut schemas = self.schemas.write().unwrap_or_else(|e| e.into_inner());
        schemas.retain(|s| s.name != name);
    }

    // Failure injection -----------------------------------------------------

    pub fn fail_list_schemas(&self, err: ConnectorError) {
        self.set_failure("schemas".to_string(), Some(err));
    }

    pub fn fail_tables(&self, schema: &str, err: ConnectorError) {
        self.set_failure(format!("tables:{}", schema), Some(err));
    }

    pub fn fail_fields(&self, schema: &str, table: &str, err: ConnectorError) {
        self.set_failure(format!("fields:{}.{}", schema, table), Some(err));
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn set_failure(&self, key: String, err: Option<ConnectorError>) {
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        match err {
            Some(err) => failures.insert(key, err),
            None => failures.remove(&key),
        };
    }

    fn failure(&self, key: &str) -> ConnectorResult<()> {
        match self.failures.lock().unwrap_or_else(|e| e.into_inner()).get(key) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    // Observation -----------------------------------------------------------

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            list_schemas: self.counters.list_schemas.load(Ordering::SeqCst),
            scan_tables: self.counters.scan_tables.load(Ordering::SeqCst),
            scan_fields: self.counters.scan_fields.load(Ordering::SeqCst),
            close: self.counters.close.load(Ordering::SeqCst),
        }
    }

    fn find_schema(&self, name: &str) -> Option<FakeSchema> {
        self.schemas
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|s| s.name == name)
            .cloned()
    }
}

#[async_trait]
impl RelationalConnector for FakeRelational {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    async fn list_schemas(&self) -> ConnectorResult<Vec<SchemaSummary>> {
        self.counters.list_schemas.fetch_add(1, Ordering::SeqCst);
        self.failure("schemas")?;
        let schemas = self.schemas.read().unwrap_or_else(|e| e.into_inner());
        Ok(schemas
            .iter()
            .map(|s| SchemaSummary {
                name: s.name.clone(),
                table_count: Some(s.tables.len() as i64),
                size_bytes: Some(s.tables.iter().filter_map(|t| t.summary.size_bytes).sum()),
                charset: None,
                collation: None,
            })
            .collect())
    }

    async fn scan_tables(&self, schema: &str) -> ConnectorResult<Vec<TableSummary>> {
        self.counters.scan_tables.fetch_add(1, Ordering::SeqCst);
        self.failure(&format!("tables:{}", schema))?;
        let schema = self
            .find_schema(schema)
            .ok_or_else(|| ConnectorError::enumeration(schema, "schema does not exist"))?;
        Ok(schema.tables.into_iter().map(|t| t.summary).collect())
    }

    async fn scan_fields(&self, schema: &str, table: &str) -> ConnectorResult<Vec<FieldSummary>> {
        self.counters.scan_fields.fetch_add(1, Ordering::SeqCst);
        self.failure(&format!("fields:{}.{}", schema, table))?;
        let target = format!("{}.{}", schema, table);
        self.find_schema(schema)
            .and_then(|s| s.tables.into_iter().find(|t| t.summary.name == table))
            .map(|t| t.fields)
            .ok_or_else(|| ConnectorError::enumeration(target, "table does not exist"))
    }

    async fn close(&self) {
        self.counters.close.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Connector factory over in-memory upstreams.
#[derive(Debug, Clone, Default)]
pub struct FixtureFactory {
    relational: Option<FakeRelational>,
    objects: Option<MemoryBackend>,
    connects: Arc<AtomicUsize>,
}

impl FixtureFactory {
    pub fn relational(fake: FakeRelational) -> Self {
        Self {
            relational: Some(fake),
            ..Self::default()
        }
    }

    pub fn object_storage(backend: MemoryBackend) -> Self {
        Self {
            objects: Some(backend),
            ..Self::default()
        }
    }

    pub fn with_objects(mut self, backend: MemoryBackend) -> Self {
        self.objects = Some(backend);
        self
    }

    /// Successful and failed `connect` calls alike.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectorFactory for FixtureFactory {
    async fn connect(&self, descriptor: &ConnectionDescriptor) -> ConnectorResult<Connector> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match descriptor.kind.family() {
            ConnectorFamily::Relational => {
                let fake = self.relational.clone().ok_or_else(|| {
                    ConnectorError::connection("no relational upstream configured")
                })?;
                Ok(Connector::Relational(Box::new(fake)))
            }
            ConnectorFamily::ObjectStorage => {
                let settings = S3Settings::from_descriptor(descriptor)?;
                let backend = self.objects.clone().ok_or_else(|| {
                    ConnectorError::connection("no object storage upstream configured")
                })?;
                Ok(Connector::ObjectStorage(Box::new(S3Connector::new(
                    backend,
                    settings.buckets,
                    ConnectorTimeouts::default(),
                ))))
            }
        }
    }
}
