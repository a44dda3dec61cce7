pub mod logging;
pub mod trace_context;

pub use logging::init_tracing;
pub use trace_context::{
    REQUEST_ID_HEADER, TRACEPARENT_HEADER, TRACESTATE_HEADER, current_request_id,
    extract_request_id, inject_trace_context, inject_trace_headers, scope_request_id, traced,
};
