use crate::application::repos::RepoError;
use crate::domain::nutrition::Macros;

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::PoolClosed => RepoError::NotInitialized,
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        sqlx::Error::Database(db) if db.message().contains("UNIQUE constraint failed") => {
            RepoError::conflict(db.message())
        }
        sqlx::Error::Database(db)
            if db.message().contains("FOREIGN KEY constraint failed")
                || db.message().contains("CHECK constraint failed") =>
        {
            RepoError::invalid_input(db.message())
        }
        sqlx::Error::Database(db) if db.message().contains("database is locked") => {
            RepoError::Timeout
        }
        other => RepoError::from_persistence(other),
    }
}

/// Stored counts are `INTEGER`; refuse values that do not fit the domain type.
pub(super) fn to_u32(value: i64, column: &str) -> Result<u32, RepoError> {
    u32::try_from(value)
        .map_err(|_| RepoError::from_persistence(format!("{column} out of range: {value}")))
}

pub(super) fn macros(calories: f64, carbs: f64, fat: f64, protein: f64) -> Macros {
    Macros::new(calories, carbs, fat, protein)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_pool_reads_as_not_initialized() {
        let err = map_sqlx_error(sqlx::Error::PoolClosed);
        assert_eq!(err.to_string(), "Database not initialized");
    }

    #[test]
    fn pool_timeout_maps_to_timeout() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            RepoError::Timeout
        ));
    }

    #[test]
    fn negative_counts_are_rejected() {
        assert!(to_u32(-1, "duration_weeks").is_err());
        assert_eq!(to_u32(4, "duration_weeks").unwrap(), 4);
    }
}
