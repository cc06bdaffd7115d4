use sqlx::mysql::MySqlDatabaseError;

use crate::application::repos::RepoError;

/// MySQL server error numbers the catalog maps onto repository errors.
mod codes {
    pub const DUPLICATE_ENTRY: u16 = 1062;
    pub const NO_REFERENCED_ROW: u16 = 1452;
    pub const LOCK_WAIT_TIMEOUT: u16 = 1205;
    pub const QUERY_TIMEOUT: u16 = 3024;
}

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        sqlx::Error::Database(db) => {
            let number = db
                .try_downcast_ref::<MySqlDatabaseError>()
                .map(MySqlDatabaseError::number);
            match number {
                Some(codes::DUPLICATE_ENTRY | codes::NO_REFERENCED_ROW) => {
                    RepoError::invalid(db.message())
                }
                Some(codes::LOCK_WAIT_TIMEOUT | codes::QUERY_TIMEOUT) => RepoError::Timeout,
                _ => RepoError::from_persistence(db.message()),
            }
        }
        other => RepoError::from_persistence(other),
    }
}

pub(super) fn convert_count(value: i64) -> Result<u64, RepoError> {
    value
        .try_into()
        .map_err(|_| RepoError::from_persistence("count exceeds supported range"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeouts_map_to_timeout() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            RepoError::Timeout
        ));
    }

    #[test]
    fn negative_counts_are_rejected() {
        assert_eq!(convert_count(3).expect("count"), 3);
        assert!(convert_count(-1).is_err());
    }
}
