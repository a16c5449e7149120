//! Interfaces between the application code and database.

use super::*;

use bigdecimal::BigDecimal;
pub use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use std::env;

pub mod conversions;

mod achievements;
mod class_rooms;
mod grades;
mod homework;
mod notifications;
mod profiles;
mod schedule;
mod store;
mod subjects;
mod users;

pub use achievements::*;
pub use class_rooms::*;
pub use grades::*;
pub use homework::*;
pub use notifications::*;
pub use profiles::*;
pub use schedule::*;
pub use store::PgScheduleStore;
pub use subjects::*;
pub use users::*;

pub type PgPool = Pool<ConnectionManager<PgConnection>>;
pub type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

const POOL_MAX_SIZE: u32 = 16;

pub fn get_database_url() -> Result<String, String> {
    config::load_dotenv();
    env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())
}

/// Open a single connection. Used by the jobs binary.
pub fn get_database_connection() -> Result<PgConnection, String> {
    let database_url = get_database_url()?;
    PgConnection::establish(&database_url).map_err(|err| err.to_string())
}

/// Build the connection pool shared by the API.
pub fn get_database_pool() -> Result<PgPool, String> {
    let database_url = get_database_url()?;
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder()
        .max_size(POOL_MAX_SIZE)
        .build(manager)
        .map_err(|err| err.to_string())
}

pub fn get_pooled_database_connection(pool: &PgPool) -> Result<PgPooledConnection, String> {
    pool.get().map_err(|err| err.to_string())
}
