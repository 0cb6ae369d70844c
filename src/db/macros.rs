//! Dispatch over `DbRepository` variants.

/// Run the same expression against whichever backend a `DbRepository` holds.
///
/// ```ignore
/// impl_db_dispatch!(self, repo => repo.list_tables(schema).await)
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($repo:expr, $r:ident => $body:expr) => {
        match $repo {
            $crate::db::repository::DbRepository::MySql($r) => $body,
            $crate::db::repository::DbRepository::Postgres($r) => $body,
        }
    };
}
