mod dto;
mod routes;
mod state;
mod ws;

pub use routes::router;
pub use state::AppState;
