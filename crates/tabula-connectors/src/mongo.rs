//! MongoDB connector.
//!
//! Collections are the tables. Being schemaless, column names and types are
//! taken from the first document of a collection. Queries are JSON find
//! requests:
//!
//! ```json
//! {"collection": "finds", "filter": {"site": "Corinth"}, "projection": {"name": 1}, "limit": 50}
//! ```

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::ClientOptions;
use mongodb::{Client, Database};
use serde::Deserialize;
use serde_json::{Map, Value};
use tabula_core::{sanitize_row, RawValue, Row};
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::error::ConnectorError;
use crate::schema::ColumnInfo;
use crate::{settle_connect, Connector};

pub const DEFAULT_PORT: u16 = 27017;

/// Documents returned by a find request without an explicit limit.
pub const DEFAULT_QUERY_LIMIT: i64 = 1000;

struct Session {
    client: Client,
    db: Database,
}

pub struct MongoConnector {
    config: ConnectionConfig,
    session: Option<Session>,
    last_error: Option<ConnectorError>,
}

/// JSON find request accepted by `execute_query`.
#[derive(Debug, Clone, Deserialize)]
pub struct FindRequest {
    pub collection: String,
    #[serde(default)]
    pub filter: Map<String, Value>,
    #[serde(default)]
    pub projection: Option<Map<String, Value>>,
    #[serde(default)]
    pub limit: Option<i64>,
}

impl MongoConnector {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            session: None,
            last_error: None,
        }
    }

    /// `uri` if given, otherwise `mongodb://{host}:{port}`.
    pub fn connection_uri(config: &ConnectionConfig) -> Result<String, ConnectorError> {
        if let Some(uri) = config.get_str("uri")? {
            return Ok(uri);
        }
        Ok(format!(
            "mongodb://{}:{}",
            config.str_or("host", "localhost")?,
            config.u16_or("port", DEFAULT_PORT)?
        ))
    }

    async fn open(&self) -> Result<Session, ConnectorError> {
        let uri = Self::connection_uri(&self.config)?;
        let database = self.config.require_str("database")?;
        let mut options = ClientOptions::parse(&uri)
            .await
            .map_err(ConnectorError::connection)?;
        options.server_selection_timeout = Some(self.config.connect_timeout()?);
        let client = Client::with_options(options).map_err(ConnectorError::connection)?;
        let db = client.database(&database);
        // server selection is lazy; ping so a bad URI fails here
        db.run_command(doc! { "ping": 1 })
            .await
            .map_err(ConnectorError::connection)?;
        Ok(Session { client, db })
    }

    fn db(&self) -> Result<&Database, ConnectorError> {
        self.session
            .as_ref()
            .map(|s| &s.db)
            .ok_or(ConnectorError::NotConnected(self.database_type()))
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        projection: Option<Document>,
        limit: i64,
    ) -> Result<Vec<Row>, ConnectorError> {
        let coll = self.db()?.collection::<Document>(collection);
        let mut action = coll.find(filter).limit(limit);
        if let Some(projection) = projection {
            action = action.projection(projection);
        }
        let docs: Vec<Document> = action.await?.try_collect().await?;
        Ok(docs.into_iter().map(document_to_row).collect())
    }
}

#[async_trait]
impl Connector for MongoConnector {
    fn database_type(&self) -> &'static str {
        "MongoDB"
    }

    async fn connect(&mut self) -> bool {
        let target = self.config.get_str("database").ok().flatten().unwrap_or_default();
        let result = self.open().await;
        settle_connect(
            self.database_type(),
            &target,
            result,
            &mut self.session,
            &mut self.last_error,
        )
    }

    async fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            session.client.shutdown().await;
            debug!("MongoDB client shut down");
        }
    }

    fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    fn last_error(&self) -> Option<&ConnectorError> {
        self.last_error.as_ref()
    }

    async fn get_tables(&self) -> Result<Vec<String>, ConnectorError> {
        Ok(self.db()?.list_collection_names().await?)
    }

    async fn get_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, ConnectorError> {
        let first = self
            .db()?
            .collection::<Document>(table)
            .find_one(doc! {})
            .await?;
        Ok(first
            .map(|doc| {
                doc.iter()
                    .map(|(name, value)| ColumnInfo::new(name.clone(), bson_type_label(value), true))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_sample_data(&self, table: &str, limit: usize) -> Result<Vec<Row>, ConnectorError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.find(table, Document::new(), None, limit).await
    }

    /// Parameters are ignored; the request carries its own filter.
    async fn execute_query(&self, query: &str, _params: &[Value]) -> Result<Vec<Row>, ConnectorError> {
        let request: FindRequest = serde_json::from_str(query)?;
        let filter = json_to_document(request.filter)?;
        let projection = request.projection.map(json_to_document).transpose()?;
        let limit = request.limit.unwrap_or(DEFAULT_QUERY_LIMIT);
        debug!(
            "MongoDB find on '{}' with filter {} (limit {})",
            request.collection, filter, limit
        );
        self.find(&request.collection, filter, projection, limit).await
    }
}

/// Parse relaxed or canonical extended JSON (`{"$oid": ...}`) into a document.
fn json_to_document(map: Map<String, Value>) -> Result<Document, ConnectorError> {
    match Bson::try_from(Value::Object(map)) {
        Ok(Bson::Document(doc)) => Ok(doc),
        Ok(other) => Err(ConnectorError::query(format!(
            "expected a document, got {}",
            other
        ))),
        Err(e) => Err(ConnectorError::query(format!("invalid extended JSON: {}", e))),
    }
}

fn document_to_row(doc: Document) -> Row {
    sanitize_row(doc.into_iter().map(|(key, value)| (key, bson_to_raw(value))))
}

/// Map a BSON value onto the sanitizer's input. ObjectIds become hex strings.
pub fn bson_to_raw(value: Bson) -> RawValue {
    match value {
        Bson::Null | Bson::Undefined => RawValue::Null,
        Bson::Boolean(b) => RawValue::Bool(b),
        Bson::Int32(n) => RawValue::Int(n.into()),
        Bson::Int64(n) => RawValue::Int(n),
        Bson::Double(f) => RawValue::Float(f),
        Bson::String(s) | Bson::Symbol(s) | Bson::JavaScriptCode(s) => RawValue::Text(s),
        Bson::ObjectId(oid) => RawValue::Text(oid.to_hex()),
        Bson::DateTime(dt) => chrono::DateTime::from_timestamp_millis(dt.timestamp_millis())
            .map(|utc| RawValue::DateTimeTz(utc.fixed_offset()))
            .unwrap_or_else(|| RawValue::Unsupported("date".to_string())),
        Bson::Binary(bin) => RawValue::Bytes(bin.bytes),
        Bson::Decimal128(d) => decimal128_to_raw(Bson::Decimal128(d)),
        Bson::Array(items) => RawValue::List(items.into_iter().map(bson_to_raw).collect()),
        Bson::Document(doc) => {
            RawValue::Map(doc.into_iter().map(|(k, v)| (k, bson_to_raw(v))).collect())
        }
        other => RawValue::Json(other.into_relaxed_extjson()),
    }
}

fn decimal128_to_raw(value: Bson) -> RawValue {
    // relaxed extended JSON renders decimals as {"$numberDecimal": "<text>"}
    let text = match value.into_relaxed_extjson() {
        Value::Object(mut map) => map.remove("$numberDecimal"),
        _ => None,
    };
    match text {
        Some(Value::String(s)) => s
            .parse::<rust_decimal::Decimal>()
            .map(RawValue::Decimal)
            .unwrap_or(RawValue::Text(s)),
        _ => RawValue::Unsupported("decimal".to_string()),
    }
}

/// BSON type label for an inferred column.
pub fn bson_type_label(value: &Bson) -> &'static str {
    match value {
        Bson::String(_) => "string",
        Bson::Int32(_) => "int32",
        Bson::Int64(_) => "int64",
        Bson::Double(_) => "double",
        Bson::Boolean(_) => "bool",
        Bson::ObjectId(_) => "objectId",
        Bson::DateTime(_) => "date",
        Bson::Document(_) => "document",
        Bson::Array(_) => "array",
        Bson::Binary(_) => "binData",
        Bson::Decimal128(_) => "decimal",
        Bson::Null | Bson::Undefined => "null",
        Bson::Timestamp(_) => "timestamp",
        Bson::RegularExpression(_) => "regex",
        _ => "object",
    }
}
