//! Owned SQLite handles.
//!
//! Both handles close at most once: closing swaps the pointer for null, so
//! an explicit close followed by a drop is harmless. Anything reading the
//! pointer afterwards sees [`DriverError::Released`].

use crate::{DriverError, DriverResult};
use libsqlite3_sys as ffi;
use std::{
    ffi::{CStr, CString, c_int},
    ptr,
    sync::atomic::{AtomicPtr, Ordering},
};

/// Converts a SQLite result code into a driver result, reading the message
/// from `db` when it is available.
pub(crate) fn check(db: *mut ffi::sqlite3, rc: c_int) -> DriverResult<()> {
    if rc == ffi::SQLITE_OK { Ok(()) } else { Err(error_from(db, rc)) }
}

pub(crate) fn error_from(db: *mut ffi::sqlite3, rc: c_int) -> DriverError {
    // SAFETY: sqlite3_errmsg and sqlite3_errstr return pointers to static or
    // connection-owned NUL-terminated strings that stay valid until the next
    // call on the connection. They are copied out immediately.
    let (code, message) = unsafe {
        if db.is_null() {
            (rc, cstr_lossy(ffi::sqlite3_errstr(rc)))
        } else {
            (ffi::sqlite3_extended_errcode(db), cstr_lossy(ffi::sqlite3_errmsg(db)))
        }
    };
    DriverError::Sqlite { code, message }
}

/// Copies a possibly-null C string.
///
/// # Safety
///
/// `p` must be null or point to a NUL-terminated string.
pub(crate) unsafe fn cstr_lossy(p: *const std::ffi::c_char) -> String {
    if p.is_null() {
        return String::new();
    }
    // SAFETY: checked for null above, NUL termination is the caller's
    // obligation.
    unsafe { CStr::from_ptr(p) }.to_string_lossy().into_owned()
}

pub(crate) fn to_cstring(sql: &str) -> DriverResult<CString> {
    CString::new(sql).map_err(|_| DriverError::NulInSql)
}

/// An open `sqlite3` connection handle.
#[derive(Debug)]
pub(crate) struct RawDb(AtomicPtr<ffi::sqlite3>);

// SAFETY: the bundled library is compiled in serialized threading mode, so
// a connection handle may be used from any thread.
unsafe impl Send for RawDb {}
// SAFETY: see above.
unsafe impl Sync for RawDb {}

impl RawDb {
    pub(crate) fn open(path: &CString, flags: c_int) -> DriverResult<Self> {
        let mut db = ptr::null_mut();
        // SAFETY: path is NUL-terminated, db is a valid out pointer, a null
        // VFS name selects the default VFS.
        let rc = unsafe { ffi::sqlite3_open_v2(path.as_ptr(), &mut db, flags, ptr::null()) };
        if rc != ffi::SQLITE_OK {
            let err = error_from(db, rc);
            // SAFETY: sqlite3_open_v2 may hand out a handle even on failure.
            // It must be closed, and closing null is a no-op.
            unsafe { ffi::sqlite3_close_v2(db) };
            return Err(err);
        }
        Ok(Self(AtomicPtr::new(db)))
    }

    pub(crate) fn ptr(&self) -> DriverResult<*mut ffi::sqlite3> {
        let db = self.0.load(Ordering::Acquire);
        if db.is_null() { Err(DriverError::Released("connection")) } else { Ok(db) }
    }

    pub(crate) fn busy_timeout(&self, ms: c_int) -> DriverResult<()> {
        let db = self.ptr()?;
        // SAFETY: db is open.
        check(db, unsafe { ffi::sqlite3_busy_timeout(db, ms) })
    }

    /// Runs every statement in `sql`, discarding any rows.
    pub(crate) fn exec(&self, sql: &str) -> DriverResult<()> {
        let db = self.ptr()?;
        let sql = to_cstring(sql)?;
        // SAFETY: db is open, sql is NUL-terminated, no callback is
        // installed and the error message is read from the connection.
        let rc = unsafe {
            ffi::sqlite3_exec(db, sql.as_ptr(), None, ptr::null_mut(), ptr::null_mut())
        };
        check(db, rc)
    }

    /// Closes the connection. Later calls do nothing.
    pub(crate) fn close(&self) -> DriverResult<()> {
        let db = self.0.swap(ptr::null_mut(), Ordering::AcqRel);
        if db.is_null() {
            return Ok(());
        }
        // SAFETY: db was open and is now unreachable through this handle.
        // close_v2 defers the close while statements are unfinalized.
        check(ptr::null_mut(), unsafe { ffi::sqlite3_close_v2(db) })
    }
}

impl Drop for RawDb {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// A prepared `sqlite3_stmt` handle.
#[derive(Debug)]
pub(crate) struct RawStmt {
    stmt: AtomicPtr<ffi::sqlite3_stmt>,
    db: *mut ffi::sqlite3,
}

// SAFETY: see RawDb. The statement is only driven by its owning resource
// set, one call at a time.
unsafe impl Send for RawStmt {}
// SAFETY: see above.
unsafe impl Sync for RawStmt {}

impl RawStmt {
    pub(crate) fn prepare(db: &RawDb, sql: &str) -> DriverResult<Self> {
        let db = db.ptr()?;
        let sql = to_cstring(sql)?;
        let mut stmt = ptr::null_mut();
        // SAFETY: db is open, sql is NUL-terminated, stmt is a valid out
        // pointer. Text after the first statement is ignored.
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(db, sql.as_ptr(), -1, &mut stmt, ptr::null_mut())
        };
        check(db, rc)?;
        if stmt.is_null() {
            return Err(DriverError::other("SQL text contains no statement"));
        }
        Ok(Self { stmt: AtomicPtr::new(stmt), db })
    }

    pub(crate) fn ptr(&self) -> DriverResult<*mut ffi::sqlite3_stmt> {
        let stmt = self.stmt.load(Ordering::Acquire);
        if stmt.is_null() { Err(DriverError::Released("statement")) } else { Ok(stmt) }
    }

    pub(crate) fn error(&self, rc: c_int) -> DriverError {
        error_from(self.db, rc)
    }

    pub(crate) fn check(&self, rc: c_int) -> DriverResult<()> {
        check(self.db, rc)
    }

    /// Resets the statement so it no longer holds read locks.
    pub(crate) fn reset(&self) -> DriverResult<()> {
        let stmt = self.ptr()?;
        // SAFETY: stmt is live. The return value repeats the last step
        // error, which was already reported.
        unsafe { ffi::sqlite3_reset(stmt) };
        Ok(())
    }

    /// Finalizes the statement. Later calls do nothing.
    pub(crate) fn finalize(&self) -> DriverResult<()> {
        let stmt = self.stmt.swap(ptr::null_mut(), Ordering::AcqRel);
        if stmt.is_null() {
            return Ok(());
        }
        // SAFETY: stmt was live and is now unreachable through this handle.
        // Like reset, finalize repeats the last step error, so its result
        // is ignored.
        unsafe { ffi::sqlite3_finalize(stmt) };
        Ok(())
    }
}

impl Drop for RawStmt {
    fn drop(&mut self) {
        let _ = self.finalize();
    }
}
