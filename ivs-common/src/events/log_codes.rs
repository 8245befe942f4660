//! Log codes emitted by the pipelines
//!
//! Codes are `<phase>.<what>`; clients map them to display text.

pub const VISION_UPLOAD_RECEIVED: &str = "vision.upload_received";
pub const VISION_IMAGE_ENCODED: &str = "vision.image_encoded";
pub const VISION_REQUEST_SENT: &str = "vision.request_sent";
pub const VISION_REASONING: &str = "vision.reasoning";
pub const VISION_USAGE: &str = "vision.usage";
pub const VISION_RESPONSE_PARSED: &str = "vision.response_parsed";

pub const RAG_QUERY_BUILD: &str = "rag.query_build";
pub const RAG_RETRIEVE_START: &str = "rag.retrieve_start";
pub const RAG_RETRIEVE_DONE: &str = "rag.retrieve_done";
pub const RAG_CONTEXT_BUILD: &str = "rag.context_build";
pub const RAG_REQUEST_SENT: &str = "rag.request_sent";
pub const RAG_REASONING: &str = "rag.reasoning";
pub const RAG_USAGE: &str = "rag.usage";
pub const RAG_RESPONSE_PARSED: &str = "rag.response_parsed";
