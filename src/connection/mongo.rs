//! MongoDB driver adapter
//!
//! Wraps the async `mongodb` client in a private tokio runtime so the restore
//! engine can stay single-threaded and blocking. Write concern is attached to
//! each write as it is issued, so a last-error query reports the outcome of the
//! previous write (including replica acknowledgement) without another round
//! trip. Inserts into `<db>.system.indexes` are sent as `createIndexes`.

use super::{Connection, QueryOptions};
use crate::config::ConnectionConfig;
use crate::error::ConnectionError;
use crate::types::Namespace;
use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use mongodb::error::{Error as DriverError, ErrorKind, WriteFailure};
use mongodb::options::{
    Acknowledgment, ClientOptions, DeleteOptions, FindOptions, InsertOneOptions, ReplaceOptions,
    WriteConcern,
};
use mongodb::{Client, Collection};
use tokio::runtime::Runtime;
use tracing::debug;

/// Server error code for dropping a collection that does not exist
const NAMESPACE_NOT_FOUND: i32 = 26;

#[derive(Debug, Clone)]
struct WriteErrorReport {
    message: String,
    code: Option<i32>,
}

pub struct MongoConnection {
    runtime: Runtime,
    client: Client,
    write_concern: u32,
    last_error: Option<WriteErrorReport>,
}

impl MongoConnection {
    /// Connect to the server named by `config.uri`. `write_concern` replicas
    /// are requested on every write when positive.
    pub fn connect(config: &ConnectionConfig, write_concern: u32) -> Result<Self, ConnectionError> {
        let runtime = Runtime::new().map_err(|e| ConnectionError::Runtime(e.to_string()))?;
        let client = runtime
            .block_on(async {
                let mut options = ClientOptions::parse(&config.uri).await?;
                options.app_name = Some(config.app_name.clone());
                Client::with_options(options)
            })
            .map_err(|e| ConnectionError::Connect {
                uri: config.uri.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            runtime,
            client,
            write_concern,
            last_error: None,
        })
    }

    fn collection(&self, ns: &Namespace) -> Collection<Document> {
        self.client.database(&ns.db).collection(&ns.collection)
    }

    fn write_concern(&self) -> Option<WriteConcern> {
        (self.write_concern > 0).then(|| {
            WriteConcern::builder()
                .w(Acknowledgment::Nodes(self.write_concern))
                .build()
        })
    }

    /// Remember the outcome of a write; only transport-level failures are returned
    fn record_write(&mut self, result: Result<(), DriverError>) -> Result<(), ConnectionError> {
        match result {
            Ok(()) => {
                self.last_error = None;
                Ok(())
            }
            Err(e) => match server_error(&e) {
                Some(report) => {
                    debug!(error = %report.message, "Write rejected by server");
                    self.last_error = Some(report);
                    Ok(())
                }
                None => Err(e.into()),
            },
        }
    }

    fn hello(&mut self) -> Result<Document, ConnectionError> {
        self.run_command("admin", doc! { "isMaster": 1 })
    }

    fn create_index_from_definition(
        &mut self,
        db: &str,
        definition: &Document,
    ) -> Result<(), ConnectionError> {
        let ns = match definition.get_str("ns").map(Namespace::parse) {
            Ok(Ok(ns)) => ns,
            _ => {
                self.last_error = Some(WriteErrorReport {
                    message: "index definition has no usable ns field".to_string(),
                    code: None,
                });
                return Ok(());
            }
        };

        let mut index = definition.clone();
        index.remove("ns");
        let mut command = doc! {
            "createIndexes": ns.collection.clone(),
            "indexes": [Bson::Document(index)],
        };
        if self.write_concern > 0 {
            command.insert("writeConcern", doc! { "w": i64::from(self.write_concern) });
        }

        let database = self.client.database(db);
        let result = self
            .runtime
            .block_on(database.run_command(command, None))
            .map(|_| ());
        self.record_write(result)
    }
}

/// Extract a server-reported error, or `None` for transport failures
fn server_error(err: &DriverError) -> Option<WriteErrorReport> {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => Some(WriteErrorReport {
            message: e.message.clone(),
            code: Some(e.code),
        }),
        ErrorKind::Write(WriteFailure::WriteConcernError(e)) => Some(WriteErrorReport {
            message: e.message.clone(),
            code: Some(e.code),
        }),
        ErrorKind::Command(e) => Some(WriteErrorReport {
            message: e.message.clone(),
            code: Some(e.code),
        }),
        _ => None,
    }
}

/// Modern servers reject `w > 1` on a standalone with a message rather than
/// the legacy `norepl` marker; normalize it.
fn legacy_error_text(report: &WriteErrorReport) -> String {
    if report.message.contains("not replicated") || report.message.contains("no replication") {
        "norepl".to_string()
    } else {
        report.message.clone()
    }
}

impl Connection for MongoConnection {
    fn query(
        &mut self,
        ns: &Namespace,
        filter: Document,
        options: QueryOptions,
    ) -> Result<Vec<Document>, ConnectionError> {
        let mut find = FindOptions::default();
        find.limit = options.limit;
        find.projection = options.projection;
        find.sort = options.sort;

        let collection = self.collection(ns);
        let docs = self.runtime.block_on(async move {
            let cursor = collection.find(filter, find).await?;
            cursor.try_collect::<Vec<Document>>().await
        })?;
        Ok(docs)
    }

    fn insert(&mut self, ns: &Namespace, doc: &Document) -> Result<(), ConnectionError> {
        if ns.is_index_collection() {
            return self.create_index_from_definition(&ns.db, doc);
        }
        let mut options = InsertOneOptions::default();
        options.write_concern = self.write_concern();
        let collection = self.collection(ns);
        let result = self
            .runtime
            .block_on(collection.insert_one(doc.clone(), options))
            .map(|_| ());
        self.record_write(result)
    }

    fn update(
        &mut self,
        ns: &Namespace,
        filter: Document,
        replacement: &Document,
    ) -> Result<(), ConnectionError> {
        let mut options = ReplaceOptions::default();
        options.write_concern = self.write_concern();
        let collection = self.collection(ns);
        let result = self
            .runtime
            .block_on(collection.replace_one(filter, replacement.clone(), options))
            .map(|_| ());
        self.record_write(result)
    }

    fn remove(&mut self, ns: &Namespace, filter: Document) -> Result<(), ConnectionError> {
        let mut options = DeleteOptions::default();
        options.write_concern = self.write_concern();
        let collection = self.collection(ns);
        let result = self
            .runtime
            .block_on(collection.delete_many(filter, options))
            .map(|_| ());
        self.record_write(result)
    }

    fn run_command(&mut self, db: &str, command: Document) -> Result<Document, ConnectionError> {
        let database = self.client.database(db);
        match self.runtime.block_on(database.run_command(command, None)) {
            Ok(reply) => Ok(reply),
            Err(e) => match e.kind.as_ref() {
                ErrorKind::Command(failure) => Ok(doc! {
                    "ok": 0,
                    "errmsg": failure.message.clone(),
                    "code": failure.code,
                    "codeName": failure.code_name.clone(),
                }),
                _ => Err(e.into()),
            },
        }
    }

    fn get_last_error(&mut self, _db: &str, _w: u32) -> Result<Option<String>, ConnectionError> {
        Ok(self.last_error.as_ref().map(legacy_error_text))
    }

    fn get_last_error_detailed(&mut self, _db: &str, _w: u32) -> Result<Document, ConnectionError> {
        Ok(match &self.last_error {
            Some(report) => {
                let mut reply = doc! { "ok": 1, "err": legacy_error_text(report) };
                if let Some(code) = report.code {
                    reply.insert("code", code);
                }
                reply
            }
            None => doc! { "ok": 1, "err": Bson::Null },
        })
    }

    fn is_primary_writable(&mut self) -> Result<bool, ConnectionError> {
        let reply = self.hello()?;
        Ok(reply.get_bool("isWritablePrimary").unwrap_or(false)
            || reply.get_bool("ismaster").unwrap_or(false))
    }

    fn is_sharded_router(&mut self) -> Result<bool, ConnectionError> {
        let reply = self.hello()?;
        Ok(matches!(reply.get_str("msg"), Ok("isdbgrid")))
    }

    fn drop_collection(&mut self, ns: &Namespace) -> Result<(), ConnectionError> {
        let collection = self.collection(ns);
        match self.runtime.block_on(collection.drop(None)) {
            Ok(()) => Ok(()),
            Err(e) => match e.kind.as_ref() {
                ErrorKind::Command(failure) if failure.code == NAMESPACE_NOT_FOUND => Ok(()),
                _ => Err(e.into()),
            },
        }
    }

    fn find_collection(&mut self, ns: &Namespace) -> Result<Option<Document>, ConnectionError> {
        let reply = self.run_command(
            &ns.db,
            doc! { "listCollections": 1, "filter": { "name": ns.collection.clone() } },
        )?;
        if !super::command_succeeded(&reply) {
            return Err(ConnectionError::Driver(super::error_message(&reply)));
        }
        let first = reply
            .get_document("cursor")
            .ok()
            .and_then(|cursor| cursor.get_array("firstBatch").ok())
            .and_then(|batch| batch.first())
            .and_then(Bson::as_document);
        Ok(first.map(|info| info.get_document("options").cloned().unwrap_or_default()))
    }
}
