pub mod api;
pub mod emby;
pub mod tmdb;
