mod auth;
mod middleware;
mod ratelimit;
mod routes;
mod server;
mod state;

pub use server::GatewayServer;
