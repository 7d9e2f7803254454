pub mod repo;
pub mod sqlite;
pub mod uploads;
