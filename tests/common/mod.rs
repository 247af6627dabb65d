//! Common test infrastructure: an in-memory backend that records every
//! driver call and can be told to fail at any step.
#![allow(missing_docs, dead_code)]
use closeable_rows::{
    DriverError, DriverResult, Row, StatementSettings, Value,
    driver::{BindTarget, Connection, ConnectionSource, RowCursor, Statement},
    params::{ParameterDisposer, StatementCreator, StatementSetter},
};
use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicU64, AtomicUsize, Ordering},
};

/// A step at which the spy backend fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fail {
    Acquire,
    Prepare,
    CreatePlain,
    Settings,
    Bind,
    Execute,
    /// The advance call with this zero-based index fails.
    Advance(usize),
    CursorClose,
    StmtClose,
    Release,
}

/// A driver call observed by the spy backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Acquire(u64),
    Prepare(String),
    CreatePlain,
    Settings(StatementSettings),
    Bind(usize, Value),
    Execute(Option<String>),
    CursorClose,
    DisposeSetter,
    DisposeCreator,
    StmtClose,
    Release(u64),
}

pub type Log = Arc<Mutex<Vec<Event>>>;

fn injected(step: &str) -> DriverError {
    DriverError::other(format!("injected {step} failure"))
}

/// A connection source serving a fixed table.
#[derive(Debug)]
pub struct SpySource {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    fails: Vec<Fail>,
    log: Log,
    open: AtomicUsize,
    next_id: AtomicU64,
}

impl SpySource {
    pub fn new(columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
            fails: Vec::new(),
            log: Log::default(),
            open: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
        }
    }

    /// A single integer column `n` holding `0..count`.
    pub fn numbers(count: usize) -> Self {
        Self::new(&["n"], (0..count as i64).map(|n| vec![Value::Integer(n)]).collect())
    }

    /// A single text column `val`.
    pub fn texts(values: &[&str]) -> Self {
        Self::new(&["val"], values.iter().map(|v| vec![Value::from(*v)]).collect())
    }

    pub fn failing(mut self, fail: Fail) -> Self {
        self.fails.push(fail);
        self
    }

    pub fn log(&self) -> Log {
        Arc::clone(&self.log)
    }

    pub fn events(&self) -> Vec<Event> {
        self.log.lock().clone()
    }

    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    fn fails(&self, fail: Fail) -> bool {
        self.fails.contains(&fail)
    }
}

impl ConnectionSource for SpySource {
    type Connection = SpyConnection;

    fn acquire(&self) -> DriverResult<SpyConnection> {
        if self.fails(Fail::Acquire) {
            return Err(injected("acquire"));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.open.fetch_add(1, Ordering::SeqCst);
        self.log.lock().push(Event::Acquire(id));
        Ok(SpyConnection {
            id,
            columns: self.columns.clone(),
            rows: self.rows.clone(),
            fails: self.fails.clone(),
            log: self.log(),
        })
    }

    fn release(&self, conn: SpyConnection) -> DriverResult<()> {
        self.open.fetch_sub(1, Ordering::SeqCst);
        self.log.lock().push(Event::Release(conn.id));
        if self.fails(Fail::Release) {
            return Err(injected("release"));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct SpyConnection {
    id: u64,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    fails: Vec<Fail>,
    log: Log,
}

impl SpyConnection {
    fn statement(&self, sql: Option<String>) -> SpyStatement {
        let params = sql.as_deref().map_or(0, |sql| sql.matches('?').count());
        SpyStatement {
            sql,
            params,
            columns: self.columns.clone(),
            rows: self.rows.clone(),
            fails: self.fails.clone(),
            log: Arc::clone(&self.log),
        }
    }
}

impl Connection for SpyConnection {
    type Statement = SpyStatement;

    fn create_statement(&mut self) -> DriverResult<SpyStatement> {
        if self.fails.contains(&Fail::CreatePlain) {
            return Err(injected("create statement"));
        }
        self.log.lock().push(Event::CreatePlain);
        Ok(self.statement(None))
    }

    fn prepare_statement(&mut self, sql: &str) -> DriverResult<SpyStatement> {
        if self.fails.contains(&Fail::Prepare) {
            return Err(injected("prepare"));
        }
        self.log.lock().push(Event::Prepare(sql.to_owned()));
        Ok(self.statement(Some(sql.to_owned())))
    }
}

#[derive(Debug)]
pub struct SpyStatement {
    sql: Option<String>,
    params: usize,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    fails: Vec<Fail>,
    log: Log,
}

impl SpyStatement {
    fn cursor(&self) -> SpyCursor {
        SpyCursor {
            columns: self.columns.clone(),
            rows: self.rows.clone(),
            current: None,
            stepped: 0,
            advances: 0,
            fails: self.fails.clone(),
            log: Arc::clone(&self.log),
        }
    }
}

impl BindTarget for SpyStatement {
    fn parameter_count(&self) -> usize {
        self.params
    }

    fn bind(&mut self, index: usize, value: &Value) -> DriverResult<()> {
        if self.fails.contains(&Fail::Bind) {
            return Err(injected("bind"));
        }
        if index == 0 || index > self.params {
            return Err(DriverError::ParameterOutOfRange(index));
        }
        self.log.lock().push(Event::Bind(index, value.clone()));
        Ok(())
    }
}

impl Statement for SpyStatement {
    type Cursor = SpyCursor;

    fn apply_settings(&mut self, settings: &StatementSettings) -> DriverResult<()> {
        if self.fails.contains(&Fail::Settings) {
            return Err(injected("settings"));
        }
        self.log.lock().push(Event::Settings(*settings));
        Ok(())
    }

    fn execute_query(&mut self) -> DriverResult<SpyCursor> {
        if self.fails.contains(&Fail::Execute) {
            return Err(injected("execute"));
        }
        self.log.lock().push(Event::Execute(self.sql.clone()));
        Ok(self.cursor())
    }

    fn execute_query_sql(&mut self, sql: &str) -> DriverResult<SpyCursor> {
        self.sql = Some(sql.to_owned());
        self.execute_query()
    }

    fn close(&mut self) -> DriverResult<()> {
        self.log.lock().push(Event::StmtClose);
        if self.fails.contains(&Fail::StmtClose) {
            return Err(injected("statement close"));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct SpyCursor {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    current: Option<usize>,
    stepped: usize,
    advances: usize,
    fails: Vec<Fail>,
    log: Log,
}

impl Row for SpyCursor {
    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_name(&self, index: usize) -> DriverResult<String> {
        self.columns
            .get(index)
            .cloned()
            .ok_or(DriverError::ColumnOutOfRange { index, count: self.columns.len() })
    }

    fn value(&self, index: usize) -> DriverResult<Value> {
        let row = self.current.ok_or(DriverError::NoCurrentRow)?;
        self.rows[row]
            .get(index)
            .cloned()
            .ok_or(DriverError::ColumnOutOfRange { index, count: self.columns.len() })
    }
}

impl RowCursor for SpyCursor {
    fn advance(&mut self) -> DriverResult<bool> {
        let call = self.advances;
        self.advances += 1;
        if self.fails.contains(&Fail::Advance(call)) {
            return Err(injected("advance"));
        }
        let next = self.current.map_or(self.stepped, |row| row + 1);
        if next < self.rows.len() {
            self.current = Some(next);
            self.stepped = next + 1;
            Ok(true)
        } else {
            self.current = None;
            Ok(false)
        }
    }

    fn close(&mut self) -> DriverResult<()> {
        self.log.lock().push(Event::CursorClose);
        if self.fails.contains(&Fail::CursorClose) {
            return Err(injected("cursor close"));
        }
        Ok(())
    }
}

/// A statement creator that records when its parameters are disposed of.
#[derive(Debug)]
pub struct SpyCreator {
    pub sql: String,
    pub log: Log,
}

impl StatementCreator<SpyConnection> for SpyCreator {
    fn create_statement(&mut self, conn: &mut SpyConnection) -> DriverResult<SpyStatement> {
        conn.prepare_statement(&self.sql)
    }

    fn sql(&self) -> Option<&str> {
        Some(&self.sql)
    }

    fn parameter_disposer(&mut self) -> Option<&mut dyn ParameterDisposer> {
        Some(self)
    }
}

impl ParameterDisposer for SpyCreator {
    fn cleanup_parameters(&mut self) {
        self.log.lock().push(Event::DisposeCreator);
    }
}

/// A statement setter that records when its parameters are disposed of.
#[derive(Debug)]
pub struct SpySetter {
    pub args: Vec<Value>,
    pub log: Log,
}

impl StatementSetter for SpySetter {
    fn set_values(&mut self, stmt: &mut dyn BindTarget) -> DriverResult<()> {
        for (i, arg) in self.args.iter().enumerate() {
            stmt.bind(i + 1, arg)?;
        }
        Ok(())
    }

    fn parameter_disposer(&mut self) -> Option<&mut dyn ParameterDisposer> {
        Some(self)
    }
}

impl ParameterDisposer for SpySetter {
    fn cleanup_parameters(&mut self) {
        self.log.lock().push(Event::DisposeSetter);
    }
}
