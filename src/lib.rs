// HTTP API
pub mod api;

// Configuration loading
pub mod config;

// Repository error taxonomy
pub mod error;

// Lamp domain entity
pub mod lamp;

// Cursor pagination over repository listings
pub mod pagination;

// Lamp storage: trait plus in-memory and SQLite stores
pub mod repository;
