//! Authorized key export from the custody service
//!
//! [`Exporter`] ties the pieces together. The submodules stay usable on
//! their own for callers that need a custom flow, e.g. to sign a request in
//! one place and send it from another.

mod client;
mod error;
mod pipeline;
mod request;

pub use client::{ApiRequest, ClientError, CustodyClient, ExportResponse, SignedExportRequest};
pub use error::ExportError;
pub use pipeline::{decrypt_export_response, Exporter, PreparedExport};
pub use request::{
    export_url, ExportRequestBody, ExportRequestDescriptor, RequestError, APP_ID_HEADER,
    ENCRYPTION_TYPE_HPKE, REQUEST_EXPIRY_HEADER, SIGNATURE_HEADER, SIGNATURE_VERSION,
};
