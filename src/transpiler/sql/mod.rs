pub mod mysql;
pub mod sqlserver;
