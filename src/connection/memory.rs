//! In-process backend
//!
//! Keeps collections, their creation options, and the replication log in
//! memory, and journals every call in order. The integration suite drives
//! whole restores through it.

use super::{Connection, QueryOptions};
use crate::error::ConnectionError;
use crate::filter::{truthy, Predicate};
use crate::types::{database_of, Namespace, SERVER_OPLOG_NAMESPACE};
use bson::{doc, Bson, Document};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// One call made against a [`MemoryConnection`]
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Query { ns: String },
    Insert { ns: String, doc: Document },
    Update { ns: String, filter: Document, doc: Document },
    Remove { ns: String, filter: Document },
    Drop { ns: String },
    Command { db: String, command: Document },
    LastError { db: String, w: u32 },
}

#[derive(Debug)]
pub struct MemoryConnection {
    collections: BTreeMap<Namespace, Vec<Document>>,
    options: BTreeMap<Namespace, Document>,
    journal: Vec<Operation>,
    writable: bool,
    sharded: bool,
    version: String,
    last_error: Option<String>,
    failing_writes: Option<String>,
    failing_commands: HashMap<String, String>,
    last_error_replies: VecDeque<Document>,
}

impl Default for MemoryConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConnection {
    /// A writable standalone server with no data
    pub fn new() -> Self {
        Self {
            collections: BTreeMap::new(),
            options: BTreeMap::new(),
            journal: Vec::new(),
            writable: true,
            sharded: false,
            version: "7.0.0".to_string(),
            last_error: None,
            failing_writes: None,
            failing_commands: HashMap::new(),
            last_error_replies: VecDeque::new(),
        }
    }

    /// Seed a collection with documents (created with empty options)
    pub fn with_collection(mut self, ns: &str, docs: Vec<Document>) -> Self {
        let ns = parse(ns);
        self.options.entry(ns.clone()).or_default();
        self.collections.entry(ns).or_default().extend(docs);
        self
    }

    /// Seed a collection with recorded creation options
    pub fn with_collection_options(mut self, ns: &str, options: Document) -> Self {
        let ns = parse(ns);
        self.collections.entry(ns.clone()).or_default();
        self.options.insert(ns, options);
        self
    }

    /// Seed the server's own replication log, oldest entry first
    pub fn with_server_oplog(self, entries: Vec<Document>) -> Self {
        self.with_collection(SERVER_OPLOG_NAMESPACE, entries)
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn set_writable(&mut self, writable: bool) {
        self.writable = writable;
    }

    pub fn set_sharded(&mut self, sharded: bool) {
        self.sharded = sharded;
    }

    /// Every later write records `message` as its last error
    pub fn fail_writes(&mut self, message: &str) {
        self.failing_writes = Some(message.to_string());
    }

    /// Reject the named command with `message`
    pub fn fail_command(&mut self, command: &str, message: &str) {
        self.failing_commands
            .insert(command.to_string(), message.to_string());
    }

    /// Queue a reply for the next detailed last-error query
    pub fn push_last_error_reply(&mut self, reply: Document) {
        self.last_error_replies.push_back(reply);
    }

    pub fn documents(&self, ns: &str) -> &[Document] {
        self.collections
            .get(&parse(ns))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn collection_exists(&self, ns: &str) -> bool {
        self.options.contains_key(&parse(ns))
    }

    pub fn collection_options(&self, ns: &str) -> Option<&Document> {
        self.options.get(&parse(ns))
    }

    pub fn journal(&self) -> &[Operation] {
        &self.journal
    }

    fn store(&mut self, ns: &Namespace, doc: Document) {
        self.options.entry(ns.clone()).or_default();
        self.collections.entry(ns.clone()).or_default().push(doc);
    }

    fn write_outcome(&mut self) -> bool {
        self.last_error = self.failing_writes.clone();
        self.last_error.is_none()
    }

    fn replace_first(&mut self, ns: &Namespace, filter: &Document, replacement: &Document) {
        let predicate = match Predicate::parse(filter) {
            Ok(p) => p,
            Err(e) => {
                self.last_error = Some(e.to_string());
                return;
            }
        };
        if let Some(existing) = self
            .collections
            .get_mut(ns)
            .and_then(|docs| docs.iter_mut().find(|d| predicate.matches(d)))
        {
            *existing = replacement.clone();
        }
    }

    fn remove_matching(&mut self, ns: &Namespace, filter: &Document) {
        let predicate = match Predicate::parse(filter) {
            Ok(p) => p,
            Err(e) => {
                self.last_error = Some(e.to_string());
                return;
            }
        };
        if let Some(docs) = self.collections.get_mut(ns) {
            docs.retain(|d| !predicate.matches(d));
        }
    }

    fn apply_op(&mut self, entry: &Document) -> Result<(), String> {
        let op = entry.get_str("op").map_err(|_| "missing op".to_string())?;
        let ns = entry.get_str("ns").map_err(|_| "missing ns".to_string())?;
        let object = entry
            .get_document("o")
            .map_err(|_| "missing o".to_string())?
            .clone();
        match op {
            "n" => Ok(()),
            "i" => {
                self.store(&parse_checked(ns)?, object);
                Ok(())
            }
            "u" => {
                let selector = entry
                    .get_document("o2")
                    .map_err(|_| "missing o2".to_string())?
                    .clone();
                self.replace_first(&parse_checked(ns)?, &selector, &object);
                Ok(())
            }
            "d" => {
                self.remove_matching(&parse_checked(ns)?, &object);
                Ok(())
            }
            "c" => {
                let reply = self.execute_command(database_of(ns), object);
                if super::command_succeeded(&reply) {
                    Ok(())
                } else {
                    Err(super::error_message(&reply))
                }
            }
            other => Err(format!("unknown op type {}", other)),
        }
    }

    fn execute_command(&mut self, db: &str, command: Document) -> Document {
        let name = match command.keys().next() {
            Some(name) => name.clone(),
            None => return doc! { "ok": 0, "errmsg": "empty command" },
        };
        if let Some(message) = self.failing_commands.get(&name) {
            return doc! { "ok": 0, "errmsg": message.clone() };
        }

        match name.as_str() {
            "create" => {
                let collection = match command.get_str("create") {
                    Ok(c) => c.to_string(),
                    Err(_) => return doc! { "ok": 0, "errmsg": "create expects a name" },
                };
                let ns = Namespace::new(db, collection);
                if self.options.contains_key(&ns) {
                    return doc! { "ok": 0, "errmsg": "collection already exists" };
                }
                let mut options = command.clone();
                options.remove("create");
                self.options.insert(ns.clone(), options);
                self.collections.entry(ns).or_default();
                doc! { "ok": 1 }
            }
            "drop" => {
                if let Ok(collection) = command.get_str("drop") {
                    let ns = Namespace::new(db, collection);
                    self.options.remove(&ns);
                    self.collections.remove(&ns);
                }
                doc! { "ok": 1 }
            }
            "applyOps" => {
                let ops = match command.get_array("applyOps") {
                    Ok(ops) => ops.clone(),
                    Err(_) => return doc! { "ok": 0, "errmsg": "applyOps expects an array" },
                };
                let mut applied = 0;
                for op in &ops {
                    let result = match op {
                        Bson::Document(entry) => self.apply_op(entry),
                        _ => Err("applyOps entries must be documents".to_string()),
                    };
                    if let Err(message) = result {
                        return doc! { "ok": 0, "errmsg": message, "applied": applied };
                    }
                    applied += 1;
                }
                doc! { "ok": 1, "applied": applied }
            }
            "buildinfo" | "buildInfo" => doc! { "ok": 1, "version": self.version.clone() },
            "isMaster" | "ismaster" | "hello" => {
                let mut reply = doc! { "ok": 1, "ismaster": self.writable };
                if self.sharded {
                    reply.insert("msg", "isdbgrid");
                }
                reply
            }
            other => doc! { "ok": 0, "errmsg": format!("no such command: '{}'", other) },
        }
    }
}

fn parse(ns: &str) -> Namespace {
    parse_checked(ns).unwrap_or_else(|_| Namespace::new(ns, ""))
}

fn parse_checked(ns: &str) -> Result<Namespace, String> {
    Namespace::parse(ns).map_err(|e| e.to_string())
}

fn project(doc: &Document, projection: &Document) -> Document {
    let mut projected = Document::new();
    if let Some(id) = doc.get("_id") {
        if projection.get("_id").map_or(true, truthy) {
            projected.insert("_id", id.clone());
        }
    }
    for (field, include) in projection {
        if field != "_id" && truthy(include) {
            if let Some(value) = doc.get(field) {
                projected.insert(field.clone(), value.clone());
            }
        }
    }
    projected
}

impl Connection for MemoryConnection {
    fn query(
        &mut self,
        ns: &Namespace,
        filter: Document,
        options: QueryOptions,
    ) -> Result<Vec<Document>, ConnectionError> {
        self.journal.push(Operation::Query { ns: ns.to_string() });
        let predicate =
            Predicate::parse(&filter).map_err(|e| ConnectionError::Driver(e.to_string()))?;

        let mut docs: Vec<Document> = self
            .collections
            .get(ns)
            .map(|docs| docs.iter().filter(|d| predicate.matches(d)).cloned().collect())
            .unwrap_or_default();

        let reverse = options
            .sort
            .as_ref()
            .and_then(|s| s.get("$natural"))
            .is_some_and(|v| matches!(v, Bson::Int32(-1) | Bson::Int64(-1)));
        if reverse {
            docs.reverse();
        }
        if let Some(limit) = options.limit.filter(|l| *l > 0) {
            docs.truncate(limit as usize);
        }
        if let Some(projection) = &options.projection {
            docs = docs.iter().map(|d| project(d, projection)).collect();
        }
        Ok(docs)
    }

    fn insert(&mut self, ns: &Namespace, doc: &Document) -> Result<(), ConnectionError> {
        self.journal.push(Operation::Insert {
            ns: ns.to_string(),
            doc: doc.clone(),
        });
        if self.write_outcome() {
            self.store(ns, doc.clone());
        }
        Ok(())
    }

    fn update(
        &mut self,
        ns: &Namespace,
        filter: Document,
        replacement: &Document,
    ) -> Result<(), ConnectionError> {
        self.journal.push(Operation::Update {
            ns: ns.to_string(),
            filter: filter.clone(),
            doc: replacement.clone(),
        });
        if self.write_outcome() {
            self.replace_first(ns, &filter, replacement);
        }
        Ok(())
    }

    fn remove(&mut self, ns: &Namespace, filter: Document) -> Result<(), ConnectionError> {
        self.journal.push(Operation::Remove {
            ns: ns.to_string(),
            filter: filter.clone(),
        });
        if self.write_outcome() {
            self.remove_matching(ns, &filter);
        }
        Ok(())
    }

    fn run_command(&mut self, db: &str, command: Document) -> Result<Document, ConnectionError> {
        self.journal.push(Operation::Command {
            db: db.to_string(),
            command: command.clone(),
        });
        Ok(self.execute_command(db, command))
    }

    fn get_last_error(&mut self, db: &str, w: u32) -> Result<Option<String>, ConnectionError> {
        self.journal.push(Operation::LastError {
            db: db.to_string(),
            w,
        });
        Ok(self.last_error.clone())
    }

    fn get_last_error_detailed(&mut self, db: &str, w: u32) -> Result<Document, ConnectionError> {
        self.journal.push(Operation::LastError {
            db: db.to_string(),
            w,
        });
        if let Some(reply) = self.last_error_replies.pop_front() {
            return Ok(reply);
        }
        Ok(match &self.last_error {
            Some(message) => doc! { "ok": 1, "err": message.clone() },
            None => doc! { "ok": 1, "err": Bson::Null },
        })
    }

    fn is_primary_writable(&mut self) -> Result<bool, ConnectionError> {
        Ok(self.writable)
    }

    fn is_sharded_router(&mut self) -> Result<bool, ConnectionError> {
        Ok(self.sharded)
    }

    fn drop_collection(&mut self, ns: &Namespace) -> Result<(), ConnectionError> {
        self.journal.push(Operation::Drop { ns: ns.to_string() });
        self.options.remove(ns);
        self.collections.remove(ns);
        Ok(())
    }

    fn find_collection(&mut self, ns: &Namespace) -> Result<Option<Document>, ConnectionError> {
        Ok(self.options.get(ns).cloned())
    }
}
