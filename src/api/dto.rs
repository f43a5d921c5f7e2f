//! Data Transfer Objects
//!
//! Response types for the JSON endpoints. Query results are not DTOs: their
//! bodies come straight from the result serializer.

use serde::Serialize;

// ============================================
// ENDPOINT DTOs
// ============================================

/// One configured endpoint
#[derive(Debug, Serialize)]
pub struct EndpointSummary {
    /// Endpoint name, served at /data/<name>
    pub name: String,
    /// Backend driver
    pub driver: String,
    /// Table or file the endpoint reads
    pub table: String,
}

/// Endpoint listing
#[derive(Debug, Serialize)]
pub struct EndpointList {
    pub endpoints: Vec<EndpointSummary>,
    pub total: usize,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall status
    pub status: String,
    /// Number of configured endpoints
    pub endpoints: usize,
    /// Open backend connections
    pub connections: usize,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Application version
    pub version: String,
}
