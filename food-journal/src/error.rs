use thiserror::Error;

pub type Result<T, E = JournalError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum JournalError {
    /// Another writer holds the database lock. The call may be retried.
    #[error("database is busy, try again")]
    Busy,
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for JournalError {
    fn from(err: sqlx::Error) -> Self {
        if is_busy(&err) {
            JournalError::Busy
        } else {
            JournalError::Database(err)
        }
    }
}

// SQLITE_BUSY (5) and SQLITE_LOCKED (6); the low byte of an extended result
// code is the primary code.
fn is_busy(err: &sqlx::Error) -> bool {
    primary_code(err).is_some_and(|code| code == 5 || code == 6)
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    // SQLITE_CONSTRAINT_UNIQUE (2067) and SQLITE_CONSTRAINT_PRIMARYKEY (1555)
    err.as_database_error()
        .and_then(|db| db.code())
        .and_then(|code| code.parse::<u32>().ok())
        .is_some_and(|code| code == 2067 || code == 1555)
}

fn primary_code(err: &sqlx::Error) -> Option<u32> {
    let code = err.as_database_error()?.code()?.parse::<u32>().ok()?;
    Some(code & 0xff)
}
