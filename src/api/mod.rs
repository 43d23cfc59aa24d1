//! API Module
//!
//! HTTP handlers and routing for the cache service REST API. The remote
//! backend is the client side of this API.
//!
//! # Endpoints
//! - `PUT /set` - Store a key-value pair
//! - `GET /get/:key` - Retrieve a value by key
//! - `DELETE /del/:key` - Delete a key
//! - `POST /invalidate` - Delete keys by pattern or event
//! - `DELETE /clear` - Remove every entry
//! - `GET /stats` - Get cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
