// Spatial backend client (Tile38 over RESP)
pub mod backend;

// Configuration
pub mod config;

// Outbound delivery to live connections
pub mod fanout;

// Coordinates and bounds
pub mod geo;

// Entity identities: redaction and connection bindings
pub mod identity;

// Static place geofences
pub mod places;

// Client request handling
pub mod relay;

// Backend notification routing
pub mod router;

// Per-connection sessions and the wire protocol
pub mod session;

// Viewport queries and fences
pub mod viewport;

// WebSocket API
pub mod api;
