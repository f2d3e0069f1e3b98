//! Demonstration service exposed to the remote side.

use duplex_rpc::{MethodError, MethodResult, MethodTable, Service};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Default, Deserialize)]
pub struct PingRequest {}

#[derive(Debug, Default, Serialize)]
pub struct PingResponse {}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MultiplyRequest {
    #[serde(rename = "A", alias = "a")]
    pub a: i64,
    #[serde(rename = "B", alias = "b")]
    pub b: i64,
}

#[derive(Debug, Default, Serialize)]
pub struct MultiplyResponse {
    #[serde(rename = "Result")]
    pub result: i64,
}

/// Arithmetic test service. Registered under the default namespace.
#[derive(Debug, Default)]
pub struct Service1;

impl Service1 {
    fn ping(&self, _: &mut PingRequest, _: &mut PingResponse) -> MethodResult {
        info!("Ping");
        Ok(())
    }

    fn multiply(&self, req: &mut MultiplyRequest, res: &mut MultiplyResponse) -> MethodResult {
        res.result = req
            .a
            .checked_mul(req.b)
            .ok_or_else(|| MethodError::new("multiply overflow"))?;
        info!("[Service1.Multiply] {} x {} = {}", req.a, req.b, res.result);
        Ok(())
    }

    /// Always fails; lets the remote side exercise its error path.
    fn response_error(&self, _: &mut MultiplyRequest, _: &mut MultiplyResponse) -> MethodResult {
        Err(MethodError::new("response error"))
    }
}

impl Service for Service1 {
    fn register_methods(table: &mut MethodTable<Self>) {
        table
            .method("Ping", Self::ping)
            .method("Multiply", Self::multiply)
            .method("ResponseError", Self::response_error);
    }
}
