pub mod handlers;
pub mod routes;
pub mod schema;
pub mod ws;

pub use routes::build_router;
pub use schema::AppState;
