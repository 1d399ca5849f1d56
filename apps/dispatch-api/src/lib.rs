pub mod auth;
pub mod bus;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod routes;

use std::sync::Arc;

use bus::GroupBus;
use config::Config;
use db::trips::TripRepository;
use db::users::UserRepository;
use gateway::dispatch::TripDispatcher;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub users: Arc<dyn UserRepository>,
    pub trips: Arc<dyn TripRepository>,
    pub bus: Arc<dyn GroupBus>,
    pub dispatcher: TripDispatcher,
}
