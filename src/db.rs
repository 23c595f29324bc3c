pub mod almanac_repository;
pub mod error;
pub mod models;
pub mod rainfall_repository;
pub mod snow_cache_repository;
pub mod snow_depth_repository;
pub mod weather_repository;

pub use almanac_repository::AlmanacRepository;
pub use error::DbError;
pub use models::*;
pub use rainfall_repository::RainfallRepository;
pub use snow_cache_repository::SnowCacheRepository;
pub use snow_depth_repository::SnowDepthRepository;
pub use weather_repository::WeatherRepository;
