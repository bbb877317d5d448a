use crate::db::{DbPool, OrmConn};
use crate::imagehost::ImageHostClient;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub images: ImageHostClient,
}
