// Credential records and the in-memory token store
pub mod credentials;

// Token lifecycle: freshness checks, single-flight refresh, sweep
pub mod lifecycle;

// Provider refresh capabilities and the registry
pub mod providers;

// Configuration (TOML + environment)
pub mod config;

// HTTP API
pub mod api;

// Development test-token seeding
pub mod seed;
