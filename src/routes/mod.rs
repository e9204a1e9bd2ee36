pub mod auth;
pub mod devices;
pub mod farms;
pub mod health;
pub mod plantings;
pub mod readings;
pub mod recommendations;
pub mod reference;

use crate::services::recommend::Recommender;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::PgPool,
    pub recommender: Recommender,
}

/// Clamp pagination parameters to `[1, max]` and `>= 0`.
pub(crate) fn page(limit: Option<i64>, offset: Option<i64>, default: i64, max: i64) -> (i64, i64) {
    (
        limit.unwrap_or(default).clamp(1, max),
        offset.unwrap_or(0).max(0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_defaults_and_bounds() {
        assert_eq!(page(None, None, 100, 1000), (100, 0));
        assert_eq!(page(Some(5000), Some(-3), 100, 1000), (1000, 0));
        assert_eq!(page(Some(0), Some(20), 100, 1000), (1, 20));
    }
}
