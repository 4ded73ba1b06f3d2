pub mod image_cache;
pub mod tmdb;
pub mod tmdb_cache;
