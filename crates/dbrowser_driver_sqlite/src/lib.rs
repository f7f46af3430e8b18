mod driver;

pub use driver::{SqliteDialect, SqliteRepository, open_session, open_session_with_user_config};
