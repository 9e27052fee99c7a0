pub mod maildir;
pub mod nativedb;
pub mod sqlite;
