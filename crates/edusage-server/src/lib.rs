//! EduSage server — curriculum chat and ingestion status over HTTP.

pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::AppState;
