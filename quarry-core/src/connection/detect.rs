//! Classification of driver failures.
//!
//! Drivers report lost connections and concurrency conflicts as ordinary
//! errors; the only portable signal is the message text. The fingerprints
//! below are matched as substrings against the root error, grouped by the
//! backend family that produces them.

use crate::{Error, Value};

/// Messages that mean the server connection is gone
const LOST_CONNECTION: &[(&str, &[&str])] = &[
    (
        "mysql",
        &[
            "server has gone away",
            "Lost connection",
            "Error while sending",
            "Error writing data to the connection",
            "Packets out of order. Expected",
            "running with the --read-only option so it cannot execute this statement",
            "The last transaction was aborted due to Seamless Scaling. Please retry.",
            "[2002] Connection refused",
            "[2002] No such file or directory",
        ],
    ),
    (
        "postgres",
        &[
            "no connection to the server",
            "server closed the connection unexpectedly",
            "SSL connection has been closed unexpectedly",
            "decryption failed or bad record mac",
            "child connection forced to terminate due to client_idle_limit",
            "query_wait_timeout",
            "could not connect to server: Connection refused",
            "could not translate host name",
            "SSL SYSCALL error: EOF detected",
            "connection is no longer usable",
        ],
    ),
    (
        "sqlserver",
        &[
            "is dead or not enabled",
            "Physical connection is not usable",
            "TCP Provider: Error code 0x68",
            "TCP Provider: Error code 0x274C",
            "Adaptive Server connection failed",
            "Communication link failure",
            "Login timeout expired",
            "The connection is broken and recovery is not possible",
            "Server is in script upgrade mode",
        ],
    ),
    (
        "network",
        &[
            "reset by peer",
            "Broken pipe",
            "Connection timed out",
            "Operation timed out",
            "Handshake timed out",
            "Temporary failure in name resolution",
            "getaddrinfo failed",
            "Resource deadlock avoided",
        ],
    ),
];

/// Messages that mean the statement lost a race with another transaction
const CONCURRENCY: &[(&str, &[&str])] = &[
    (
        "mysql",
        &[
            "Deadlock found when trying to get lock",
            "Lock wait timeout exceeded; try restarting transaction",
            "WSREP detected deadlock/conflict and aborted the transaction",
        ],
    ),
    ("postgres", &["deadlock detected", "could not serialize access"]),
    (
        "sqlite",
        &[
            "The database file is locked",
            "database is locked",
            "database table is locked",
            "A table in the database is locked",
        ],
    ),
    ("sqlserver", &["has been chosen as the deadlock victim"]),
];

/// SQLSTATE reported for serialization failures
const SERIALIZATION_FAILURE: &str = "40001";

fn matches_any(message: &str, table: &[(&str, &[&str])]) -> bool {
    table
        .iter()
        .flat_map(|(_, fingerprints)| fingerprints.iter())
        .any(|fingerprint| message.contains(fingerprint))
}

pub fn caused_by_lost_connection(error: &Error) -> bool {
    match error.root() {
        Error::Database(
            sqlx::Error::Io(_) | sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed,
        ) => true,
        root => matches_any(&root.to_string(), LOST_CONNECTION),
    }
}

pub fn caused_by_concurrency_error(error: &Error) -> bool {
    if error.is_deadlock() {
        return true;
    }
    match error.root() {
        Error::Database(sqlx::Error::Database(database))
            if database.code().as_deref() == Some(SERIALIZATION_FAILURE) =>
        {
            true
        }
        root => matches_any(&root.to_string(), CONCURRENCY),
    }
}

/// Attach the failed statement to a driver error, picking its class
pub fn classify(error: Error, sql: &str, bindings: &[Value]) -> Error {
    let sql = sql.to_string();
    let bindings = bindings.to_vec();

    if caused_by_lost_connection(&error) {
        return Error::ConnectionLost {
            sql,
            bindings,
            source: Box::new(error),
        };
    }
    if caused_by_concurrency_error(&error) {
        return Error::Deadlock {
            sql,
            bindings,
            source: Box::new(error),
        };
    }
    Error::QueryExecution {
        sql,
        bindings,
        source: Box::new(error),
    }
}
