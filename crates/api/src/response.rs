//! Shared response envelope types for API handlers.
//!
//! Admin and account endpoints use a `{ "data": ... }` envelope. Scan
//! responses and webhook acknowledgements have their own fixed shapes.

use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
